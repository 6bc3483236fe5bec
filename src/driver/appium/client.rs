//! Appium (W3C WebDriver) HTTP client
//!
//! Talks to an Appium 2 server over its JSON wire API. Only the commands the
//! harness needs are implemented; everything else goes through
//! `mobile:` extension commands via `execute/sync`.

use crate::driver::appium::capabilities::Capabilities;
use crate::driver::traits::{AutomationSession, ElementId, Locator, SessionFactory};
use crate::error::HarnessError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Method, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;

/// W3C element reference key
pub const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// Pre-W3C (JSONWP) element reference key
const LEGACY_ELEMENT_KEY: &str = "ELEMENT";

/// Error reported by the server in a W3C error body
#[derive(Debug, Error)]
#[error("{error} (HTTP {status}): {message}")]
pub struct WebDriverError {
    pub status: u16,
    pub error: String,
    pub message: String,
}

impl WebDriverError {
    pub fn is_no_such_element(&self) -> bool {
        self.error == "no such element"
    }
}

#[derive(Debug, Deserialize)]
struct ErrorValue {
    #[serde(default)]
    error: String,
    #[serde(default)]
    message: String,
}

/// Server status response
#[derive(Debug, Deserialize)]
pub struct ServerStatus {
    pub value: ServerStatusValue,
}

#[derive(Debug, Deserialize)]
pub struct ServerStatusValue {
    #[serde(default)]
    pub ready: Option<bool>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Parse and normalize an endpoint URL (no trailing slash)
pub fn parse_endpoint(endpoint: &str) -> Result<String> {
    let url = Url::parse(endpoint).map_err(|_| HarnessError::InvalidEndpoint {
        url: endpoint.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(HarnessError::InvalidEndpoint {
            url: endpoint.to_string(),
        }
        .into());
    }
    Ok(url.as_str().trim_end_matches('/').to_string())
}

fn build_http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .context("Failed to create HTTP client")
}

/// Check `GET /status` on an Appium server
pub async fn is_server_ready(client: &reqwest::Client, base_url: &str) -> bool {
    let url = format!("{}/status", base_url);
    match client.get(&url).send().await {
        Ok(resp) if resp.status().is_success() => match resp.json::<ServerStatus>().await {
            Ok(status) => status.value.ready.unwrap_or(true),
            Err(_) => false,
        },
        _ => false,
    }
}

/// One live Appium session
pub struct AppiumSession {
    /// Server base URL (e.g. "http://127.0.0.1:4723")
    base_url: String,
    client: reqwest::Client,
    session_id: String,
}

impl AppiumSession {
    /// Open a new session with the given capabilities
    pub async fn connect(
        endpoint: &str,
        capabilities: &Capabilities,
        command_timeout: Duration,
    ) -> Result<Self> {
        let base_url = parse_endpoint(endpoint)?;
        let client = build_http_client(command_timeout)?;

        let url = format!("{}/session", base_url);
        log::debug!("POST {} ({} on {})", url, capabilities.app_package, capabilities.device_name);

        let resp = client
            .post(&url)
            .json(&capabilities.to_w3c())
            .send()
            .await
            .with_context(|| format!("Failed to reach Appium server at {}", base_url))?;

        let body = read_value(resp).await.context("Failed to create session")?;

        let session_id = body
            .get("sessionId")
            .and_then(Value::as_str)
            .map(str::to_string)
            .context("No session ID in new-session response")?;

        log::info!("Appium session {} created", session_id);

        Ok(Self {
            base_url,
            client,
            session_id,
        })
    }

    fn session_url(&self, path: &str) -> String {
        format!("{}/session/{}{}", self.base_url, self.session_id, path)
    }

    async fn command(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value> {
        let url = self.session_url(path);
        let mut request = self.client.request(method.clone(), &url);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let resp = request
            .send()
            .await
            .with_context(|| format!("{} {} failed", method, path))?;

        read_value(resp).await
    }

    async fn get(&self, path: &str) -> Result<Value> {
        self.command(Method::GET, path, None).await
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value> {
        self.command(Method::POST, path, Some(body)).await
    }
}

/// Read a W3C response and return its `value`, or the server error
async fn read_value(resp: reqwest::Response) -> Result<Value> {
    let status = resp.status();
    let text = resp.text().await.context("Failed to read response body")?;
    let mut body: Value = if text.trim().is_empty() {
        Value::Null
    } else {
        serde_json::from_str(&text)
            .with_context(|| format!("Invalid JSON in response (HTTP {})", status.as_u16()))?
    };

    let value = body.get_mut("value").map(Value::take).unwrap_or(Value::Null);

    if status.is_success() {
        return Ok(value);
    }

    let detail: ErrorValue = serde_json::from_value(value).unwrap_or(ErrorValue {
        error: "unknown error".to_string(),
        message: text,
    });

    Err(WebDriverError {
        status: status.as_u16(),
        error: detail.error,
        message: detail.message,
    }
    .into())
}

fn element_from_value(value: &Value) -> Result<ElementId> {
    value
        .get(ELEMENT_KEY)
        .or_else(|| value.get(LEGACY_ELEMENT_KEY))
        .and_then(Value::as_str)
        .map(|id| ElementId(id.to_string()))
        .with_context(|| format!("Element reference missing in {}", value))
}

fn expect_bool(value: Value, what: &str) -> Result<bool> {
    value
        .as_bool()
        .with_context(|| format!("{} returned non-boolean: {}", what, value))
}

#[async_trait]
impl AutomationSession for AppiumSession {
    fn session_id(&self) -> &str {
        &self.session_id
    }

    async fn find_element(&self, locator: &Locator) -> Result<Option<ElementId>> {
        let body = json!({ "using": locator.strategy.using(), "value": locator.value });
        match self.post("/element", body).await {
            Ok(value) => element_from_value(&value).map(Some),
            Err(e) => match e.downcast_ref::<WebDriverError>() {
                Some(wd) if wd.is_no_such_element() => Ok(None),
                _ => Err(e.context(format!("Failed to find element {}", locator))),
            },
        }
    }

    async fn is_displayed(&self, element: &ElementId) -> Result<bool> {
        let value = self.get(&format!("/element/{}/displayed", element)).await?;
        expect_bool(value, "displayed")
    }

    async fn is_enabled(&self, element: &ElementId) -> Result<bool> {
        let value = self.get(&format!("/element/{}/enabled", element)).await?;
        expect_bool(value, "enabled")
    }

    async fn click(&self, element: &ElementId) -> Result<()> {
        self.post(&format!("/element/{}/click", element), json!({}))
            .await?;
        Ok(())
    }

    async fn clear(&self, element: &ElementId) -> Result<()> {
        self.post(&format!("/element/{}/clear", element), json!({}))
            .await?;
        Ok(())
    }

    async fn send_keys(&self, element: &ElementId, text: &str) -> Result<()> {
        let chars: Vec<String> = text.chars().map(|c| c.to_string()).collect();
        self.post(
            &format!("/element/{}/value", element),
            json!({ "text": text, "value": chars }),
        )
        .await?;
        Ok(())
    }

    async fn text(&self, element: &ElementId) -> Result<String> {
        let value = self.get(&format!("/element/{}/text", element)).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn attribute(&self, element: &ElementId, name: &str) -> Result<Option<String>> {
        let value = self
            .get(&format!("/element/{}/attribute/{}", element, name))
            .await?;
        Ok(match value {
            Value::Null => None,
            Value::String(s) => Some(s),
            other => Some(other.to_string()),
        })
    }

    async fn press_keycode(&self, keycode: u32) -> Result<()> {
        self.post("/appium/device/press_keycode", json!({ "keycode": keycode }))
            .await?;
        Ok(())
    }

    async fn hide_keyboard(&self) -> Result<()> {
        self.post("/appium/device/hide_keyboard", json!({})).await?;
        Ok(())
    }

    async fn execute_mobile(&self, command: &str, args: Value) -> Result<Value> {
        let body = json!({ "script": format!("mobile: {}", command), "args": [args] });
        self.post("/execute/sync", body)
            .await
            .with_context(|| format!("mobile: {} failed", command))
    }

    async fn screenshot_base64(&self) -> Result<String> {
        let value = self.get("/screenshot").await?;
        value
            .as_str()
            .map(str::to_string)
            .context("Screenshot response was not a string")
    }

    async fn page_source(&self) -> Result<String> {
        let value = self.get("/source").await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn quit(&self) -> Result<()> {
        self.command(Method::DELETE, "", None)
            .await
            .context("Failed to delete session")?;
        log::debug!("Appium session {} deleted", self.session_id);
        Ok(())
    }
}

/// Opens [`AppiumSession`]s
pub struct AppiumSessionFactory {
    command_timeout: Duration,
}

impl AppiumSessionFactory {
    pub fn new(command_timeout: Duration) -> Self {
        Self { command_timeout }
    }
}

#[async_trait]
impl SessionFactory for AppiumSessionFactory {
    async fn open(
        &self,
        endpoint: &str,
        capabilities: &Capabilities,
    ) -> Result<Box<dyn AutomationSession>> {
        let session = AppiumSession::connect(endpoint, capabilities, self.command_timeout).await?;
        Ok(Box::new(session))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::traits::AppState;
    use crate::utils::config::test_settings;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn connected(server: &MockServer) -> AppiumSession {
        Mock::given(method("POST"))
            .and(path("/session"))
            .and(body_partial_json(json!({
                "capabilities": { "alwaysMatch": { "appium:noReset": true } }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": { "sessionId": "abc123", "capabilities": {} }
            })))
            .mount(server)
            .await;

        let caps = Capabilities::from_settings(&test_settings());
        AppiumSession::connect(&server.uri(), &caps, Duration::from_secs(5))
            .await
            .unwrap()
    }

    #[test]
    fn test_parse_endpoint() {
        assert_eq!(
            parse_endpoint("http://127.0.0.1:4723/").unwrap(),
            "http://127.0.0.1:4723"
        );
        assert_eq!(
            parse_endpoint("http://grid:4444/wd/hub").unwrap(),
            "http://grid:4444/wd/hub"
        );
        for bad in ["not a url", "ftp://host:21", ""] {
            let err = parse_endpoint(bad).unwrap_err();
            assert!(matches!(
                err.downcast_ref::<HarnessError>(),
                Some(HarnessError::InvalidEndpoint { .. })
            ));
        }
    }

    #[tokio::test]
    async fn test_connect_reads_session_id() {
        let server = MockServer::start().await;
        let session = connected(&server).await;
        assert_eq!(session.session_id(), "abc123");
    }

    #[tokio::test]
    async fn test_find_element_present_and_absent() {
        let server = MockServer::start().await;
        let session = connected(&server).await;

        Mock::given(method("POST"))
            .and(path("/session/abc123/element"))
            .and(body_partial_json(json!({ "using": "id", "value": "com.example.app:id/ok" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": { "element-6066-11e4-a52e-4f735466cecf": "el-1" }
            })))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/session/abc123/element"))
            .and(body_partial_json(json!({ "using": "xpath" })))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "value": { "error": "no such element", "message": "not found", "stacktrace": "" }
            })))
            .mount(&server)
            .await;

        let found = session
            .find_element(&Locator::id("com.example.app:id/ok"))
            .await
            .unwrap();
        assert_eq!(found, Some(ElementId("el-1".into())));

        let missing = session
            .find_element(&Locator::xpath("//nothing"))
            .await
            .unwrap();
        assert_eq!(missing, None);
    }

    #[tokio::test]
    async fn test_server_error_propagates() {
        let server = MockServer::start().await;
        let session = connected(&server).await;

        Mock::given(method("POST"))
            .and(path("/session/abc123/element/el-1/click"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "value": { "error": "stale element reference", "message": "gone" }
            })))
            .mount(&server)
            .await;

        let err = session.click(&ElementId("el-1".into())).await.unwrap_err();
        let wd = err.downcast_ref::<WebDriverError>().unwrap();
        assert_eq!(wd.status, 400);
        assert_eq!(wd.error, "stale element reference");
    }

    #[tokio::test]
    async fn test_mobile_commands() {
        let server = MockServer::start().await;
        let session = connected(&server).await;

        Mock::given(method("POST"))
            .and(path("/session/abc123/execute/sync"))
            .and(body_partial_json(json!({ "script": "mobile: queryAppState" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": 4 })))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/session/abc123/execute/sync"))
            .and(body_partial_json(json!({ "script": "mobile: getCurrentActivity" })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "value": ".LoginActivity" })),
            )
            .mount(&server)
            .await;

        let state = session.query_app_state("com.example.app").await.unwrap();
        assert_eq!(state, AppState::RunningInForeground);
        assert_eq!(session.current_activity().await.unwrap(), ".LoginActivity");
    }

    #[tokio::test]
    async fn test_quit_deletes_session() {
        let server = MockServer::start().await;
        let session = connected(&server).await;

        Mock::given(method("DELETE"))
            .and(path("/session/abc123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": null })))
            .expect(1)
            .mount(&server)
            .await;

        session.quit().await.unwrap();
    }

    #[tokio::test]
    async fn test_server_ready() {
        let server = MockServer::start().await;
        let client = build_http_client(Duration::from_secs(2)).unwrap();
        assert!(!is_server_ready(&client, &server.uri()).await);

        Mock::given(method("GET"))
            .and(path("/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": { "ready": true, "message": "The server is ready to accept new connections" }
            })))
            .mount(&server)
            .await;
        assert!(is_server_ready(&client, &server.uri()).await);
    }
}
