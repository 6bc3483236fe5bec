//! Scripted in-memory session, factory and server launcher for tests.

use crate::driver::appium::capabilities::Capabilities;
use crate::driver::appium::server::{ServerConfig, ServerHandle, ServerLauncher};
use crate::driver::traits::{AutomationSession, ElementId, Locator, SessionFactory, KEYCODE_DEL};
use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

/// A scripted on-screen element
#[derive(Debug, Clone)]
pub struct FakeElement {
    pub displayed: bool,
    pub enabled: bool,
    pub text: String,
    pub hint_showing: bool,
    /// `send_keys` changes the text
    pub accepts_keys: bool,
    /// `mobile: type` changes the text of the focused element
    pub accepts_type: bool,
    /// `input text` over shell changes the text of the focused element
    pub accepts_shell: bool,
    /// Disappears when clicked (a dismissable dialog button)
    pub dismiss_on_click: bool,
}

impl Default for FakeElement {
    fn default() -> Self {
        Self {
            displayed: true,
            enabled: true,
            text: String::new(),
            hint_showing: true,
            accepts_keys: true,
            accepts_type: true,
            accepts_shell: true,
            dismiss_on_click: false,
        }
    }
}

impl FakeElement {
    /// Dialog button that goes away once clicked
    pub fn dialog() -> Self {
        Self {
            dismiss_on_click: true,
            ..Self::default()
        }
    }

    /// Text field that ignores the given input paths
    pub fn field(accepts_keys: bool, accepts_type: bool, accepts_shell: bool) -> Self {
        Self {
            accepts_keys,
            accepts_type,
            accepts_shell,
            ..Self::default()
        }
    }
}

#[derive(Debug, Default)]
pub struct FakeState {
    /// Elements keyed by locator display string
    pub elements: HashMap<String, FakeElement>,
    /// Locators whose lookup errors
    pub failing_locators: HashSet<String>,
    /// `None` makes queryAppState fail
    pub app_state: Option<i64>,
    pub installed: bool,
    pub activity: String,
    pub activity_after_start: Option<String>,
    pub activity_after_activate: Option<String>,
    /// Mobile command names that fail
    pub failing_commands: HashSet<String>,
    /// Locators whose element errors on click
    pub failing_clicks: HashSet<String>,
    pub focused: Option<String>,
    pub quit_fails: bool,
    pub screenshot_fails: bool,
    pub open_fails: bool,
    pub opened: usize,
    pub launched: usize,
    pub stopped: usize,
    pub last_endpoint: Option<String>,
    pub last_capabilities: Option<Capabilities>,
    pub calls: Vec<String>,
}

/// Shared handle to the scripted device
#[derive(Clone)]
pub struct Fake {
    state: Arc<Mutex<FakeState>>,
}

impl Fake {
    /// App installed, in the foreground on `.MainActivity`
    pub fn new() -> Self {
        let state = FakeState {
            app_state: Some(4),
            installed: true,
            activity: ".MainActivity".to_string(),
            ..Default::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn with(&self, f: impl FnOnce(&mut FakeState)) -> &Self {
        f(&mut self.state());
        self
    }

    pub fn add_element(&self, locator: &Locator, element: FakeElement) -> &Self {
        self.state().elements.insert(locator.to_string(), element);
        self
    }

    pub fn remove_element(&self, locator: &Locator) {
        self.state().elements.remove(&locator.to_string());
    }

    pub fn element(&self, locator: &Locator) -> Option<FakeElement> {
        self.state().elements.get(&locator.to_string()).cloned()
    }

    pub fn session(&self) -> FakeSession {
        FakeSession {
            id: format!("fake-{}", self.state().opened),
            state: self.state.clone(),
        }
    }

    pub fn factory(&self) -> Arc<dyn SessionFactory> {
        Arc::new(FakeFactory {
            state: self.state.clone(),
        })
    }

    pub fn launcher(&self) -> Arc<dyn ServerLauncher> {
        Arc::new(FakeLauncher {
            state: self.state.clone(),
        })
    }

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    /// Calls that change app or session state
    pub fn state_changes(&self) -> Vec<String> {
        const CHANGING: &[&str] = &[
            "mobile:startActivity",
            "mobile:activateApp",
            "mobile:terminateApp",
            "quit",
            "open",
            "click:",
        ];
        self.state()
            .calls
            .iter()
            .filter(|c| CHANGING.iter().any(|p| c.starts_with(p)))
            .cloned()
            .collect()
    }
}

pub struct FakeSession {
    id: String,
    state: Arc<Mutex<FakeState>>,
}

impl FakeSession {
    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn element_mut<'a>(state: &'a mut FakeState, element: &ElementId) -> Result<&'a mut FakeElement> {
    match state.elements.get_mut(&element.0) {
        Some(el) => Ok(el),
        None => bail!("stale element reference: {}", element),
    }
}

#[async_trait]
impl AutomationSession for FakeSession {
    fn session_id(&self) -> &str {
        &self.id
    }

    async fn find_element(&self, locator: &Locator) -> Result<Option<ElementId>> {
        let key = locator.to_string();
        let mut state = self.lock();
        state.calls.push(format!("find:{}", key));
        if state.failing_locators.contains(&key) {
            bail!("invalid selector: {}", key);
        }
        Ok(state.elements.contains_key(&key).then(|| ElementId(key)))
    }

    async fn is_displayed(&self, element: &ElementId) -> Result<bool> {
        let mut state = self.lock();
        Ok(element_mut(&mut state, element)?.displayed)
    }

    async fn is_enabled(&self, element: &ElementId) -> Result<bool> {
        let mut state = self.lock();
        Ok(element_mut(&mut state, element)?.enabled)
    }

    async fn click(&self, element: &ElementId) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(format!("click:{}", element));
        if state.failing_clicks.contains(&element.0) {
            bail!("stale element reference: {}", element);
        }
        if element_mut(&mut state, element)?.dismiss_on_click {
            state.elements.remove(&element.0);
        } else {
            state.focused = Some(element.0.clone());
        }
        Ok(())
    }

    async fn clear(&self, element: &ElementId) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(format!("clear:{}", element));
        let el = element_mut(&mut state, element)?;
        if el.accepts_keys {
            el.text.clear();
            el.hint_showing = true;
        }
        Ok(())
    }

    async fn send_keys(&self, element: &ElementId, text: &str) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(format!("send_keys:{}", element));
        let el = element_mut(&mut state, element)?;
        if el.accepts_keys {
            el.text.push_str(text);
            el.hint_showing = el.text.is_empty();
        }
        Ok(())
    }

    async fn text(&self, element: &ElementId) -> Result<String> {
        let mut state = self.lock();
        Ok(element_mut(&mut state, element)?.text.clone())
    }

    async fn attribute(&self, element: &ElementId, name: &str) -> Result<Option<String>> {
        let mut state = self.lock();
        let el = element_mut(&mut state, element)?;
        Ok(match name {
            "text" => Some(el.text.clone()),
            "showingHintText" => Some(el.hint_showing.to_string()),
            "enabled" => Some(el.enabled.to_string()),
            _ => None,
        })
    }

    async fn press_keycode(&self, keycode: u32) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(format!("keycode:{}", keycode));
        if keycode == KEYCODE_DEL {
            if let Some(focused) = state.focused.clone() {
                if let Some(el) = state.elements.get_mut(&focused) {
                    el.text.pop();
                    el.hint_showing = el.text.is_empty();
                }
            }
        }
        Ok(())
    }

    async fn hide_keyboard(&self) -> Result<()> {
        self.lock().calls.push("hide_keyboard".to_string());
        Ok(())
    }

    async fn execute_mobile(&self, command: &str, args: Value) -> Result<Value> {
        let mut state = self.lock();
        state.calls.push(format!("mobile:{}", command));
        if state.failing_commands.contains(command) {
            bail!("mobile: {} failed", command);
        }

        match command {
            "queryAppState" => match state.app_state {
                Some(code) => Ok(json!(code)),
                None => bail!("queryAppState unavailable"),
            },
            "isAppInstalled" => Ok(json!(state.installed)),
            "activateApp" => {
                state.app_state = Some(4);
                if let Some(activity) = state.activity_after_activate.clone() {
                    state.activity = activity;
                }
                Ok(Value::Null)
            }
            "terminateApp" => {
                let was_running = matches!(state.app_state, Some(2..=4));
                state.app_state = Some(1);
                Ok(json!(was_running))
            }
            "startActivity" => {
                state.app_state = Some(4);
                state.activity = match state.activity_after_start.clone() {
                    Some(activity) => activity,
                    None => args["appActivity"].as_str().unwrap_or_default().to_string(),
                };
                Ok(Value::Null)
            }
            "getCurrentActivity" => Ok(json!(state.activity)),
            "type" => {
                let text = args["text"].as_str().unwrap_or_default().to_string();
                if let Some(focused) = state.focused.clone() {
                    if let Some(el) = state.elements.get_mut(&focused) {
                        if el.accepts_type {
                            el.text = text;
                            el.hint_showing = el.text.is_empty();
                        }
                    }
                }
                Ok(Value::Null)
            }
            "shell" => {
                let parts: Vec<String> = args["args"]
                    .as_array()
                    .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
                    .unwrap_or_default();
                state.calls.push(format!("shell:{}", parts.join(" ")));
                if parts.first().map(String::as_str) == Some("text") {
                    let text = parts.get(1).cloned().unwrap_or_default().replace("%s", " ");
                    if let Some(focused) = state.focused.clone() {
                        if let Some(el) = state.elements.get_mut(&focused) {
                            if el.accepts_shell {
                                el.text = text;
                                el.hint_showing = el.text.is_empty();
                            }
                        }
                    }
                }
                Ok(json!(""))
            }
            other => bail!("unknown mobile command: {}", other),
        }
    }

    async fn screenshot_base64(&self) -> Result<String> {
        let state = self.lock();
        if state.screenshot_fails {
            bail!("screenshot unavailable");
        }
        // "fakepng" in base64
        Ok("ZmFrZXBuZw==".to_string())
    }

    async fn page_source(&self) -> Result<String> {
        let state = self.lock();
        let mut xml = String::from("<hierarchy>");
        for (key, el) in &state.elements {
            if let Some(id) = key.strip_prefix("id=") {
                xml.push_str(&format!(
                    "<android.view.View resource-id=\"{}\" displayed=\"{}\" bounds=\"[0,0][10,10]\"/>",
                    id, el.displayed
                ));
            }
        }
        xml.push_str("</hierarchy>");
        Ok(xml)
    }

    async fn quit(&self) -> Result<()> {
        let mut state = self.lock();
        state.calls.push("quit".to_string());
        if state.quit_fails {
            bail!("session already gone");
        }
        Ok(())
    }
}

pub struct FakeFactory {
    state: Arc<Mutex<FakeState>>,
}

#[async_trait]
impl SessionFactory for FakeFactory {
    async fn open(
        &self,
        endpoint: &str,
        capabilities: &Capabilities,
    ) -> Result<Box<dyn AutomationSession>> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.calls.push("open".to_string());
        if state.open_fails {
            bail!("could not start a new session");
        }
        state.opened += 1;
        state.app_state = Some(4);
        state.last_endpoint = Some(endpoint.to_string());
        state.last_capabilities = Some(capabilities.clone());
        Ok(Box::new(FakeSession {
            id: format!("fake-{}", state.opened),
            state: self.state.clone(),
        }))
    }
}

pub struct FakeLauncher {
    state: Arc<Mutex<FakeState>>,
}

#[async_trait]
impl ServerLauncher for FakeLauncher {
    async fn launch(&self, config: &ServerConfig) -> Result<Box<dyn ServerHandle>> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.launched += 1;
        state.calls.push("launch".to_string());
        Ok(Box::new(FakeServer {
            url: config.url(),
            state: self.state.clone(),
            running: true,
        }))
    }
}

pub struct FakeServer {
    url: String,
    state: Arc<Mutex<FakeState>>,
    running: bool,
}

#[async_trait]
impl ServerHandle for FakeServer {
    fn url(&self) -> &str {
        &self.url
    }

    async fn stop(&mut self) -> Result<()> {
        if self.running {
            self.running = false;
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state.stopped += 1;
            state.calls.push("stop".to_string());
        }
        Ok(())
    }
}
