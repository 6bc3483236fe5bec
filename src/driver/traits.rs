use crate::driver::appium::capabilities::Capabilities;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::fmt;

/// Android key code for DEL (backspace)
pub const KEYCODE_DEL: u32 = 67;

/// Strategy used to locate an element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Android resource id (`package:id/name`)
    Id,
    /// `new UiSelector()...` query
    UiAutomator,
    XPath,
    /// content-desc on Android
    AccessibilityId,
    ClassName,
}

impl Strategy {
    /// W3C `using` value sent with find-element requests
    pub fn using(&self) -> &'static str {
        match self {
            Strategy::Id => "id",
            Strategy::UiAutomator => "-android uiautomator",
            Strategy::XPath => "xpath",
            Strategy::AccessibilityId => "accessibility id",
            Strategy::ClassName => "class name",
        }
    }
}

/// Strategy + value identifying how to find a UI element
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator {
    pub strategy: Strategy,
    pub value: String,
}

impl Locator {
    pub fn new(strategy: Strategy, value: impl Into<String>) -> Self {
        Self {
            strategy,
            value: value.into(),
        }
    }

    pub fn id(value: impl Into<String>) -> Self {
        Self::new(Strategy::Id, value)
    }

    pub fn ui_automator(value: impl Into<String>) -> Self {
        Self::new(Strategy::UiAutomator, value)
    }

    pub fn xpath(value: impl Into<String>) -> Self {
        Self::new(Strategy::XPath, value)
    }

    pub fn accessibility_id(value: impl Into<String>) -> Self {
        Self::new(Strategy::AccessibilityId, value)
    }

    pub fn class_name(value: impl Into<String>) -> Self {
        Self::new(Strategy::ClassName, value)
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.strategy.using(), self.value)
    }
}

/// Ordered locators for one logical target; earlier entries are preferred
#[derive(Debug, Clone)]
pub struct LocatorSet {
    pub name: String,
    pub locators: Vec<Locator>,
}

impl LocatorSet {
    pub fn new(name: impl Into<String>, locators: Vec<Locator>) -> Self {
        Self {
            name: name.into(),
            locators,
        }
    }

    pub fn single(locator: Locator) -> Self {
        Self {
            name: locator.to_string(),
            locators: vec![locator],
        }
    }

    /// Standard triple for a resource id: by id, by UiSelector, by XPath on
    /// `widget_class`.
    pub fn for_resource_id(resource_id: &str, widget_class: &str) -> Self {
        Self {
            name: resource_id.to_string(),
            locators: vec![
                Locator::id(resource_id),
                Locator::ui_automator(format!(
                    "new UiSelector().resourceId(\"{}\")",
                    resource_id
                )),
                Locator::xpath(format!(
                    "//{}[@resource-id=\"{}\"]",
                    widget_class, resource_id
                )),
            ],
        }
    }

    /// Triple for a text field
    pub fn edit_text(resource_id: &str) -> Self {
        Self::for_resource_id(resource_id, "android.widget.EditText")
    }

    pub fn len(&self) -> usize {
        self.locators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locators.is_empty()
    }
}

/// Opaque remote element reference
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementId(pub String);

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Application state as reported by `mobile: queryAppState`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    NotInstalled,
    NotRunning,
    /// Includes the suspended state
    RunningInBackground,
    RunningInForeground,
}

impl AppState {
    pub fn from_code(code: i64) -> Result<Self> {
        match code {
            0 => Ok(AppState::NotInstalled),
            1 => Ok(AppState::NotRunning),
            2 | 3 => Ok(AppState::RunningInBackground),
            4 => Ok(AppState::RunningInForeground),
            other => anyhow::bail!("Unknown app state code: {}", other),
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(
            self,
            AppState::RunningInBackground | AppState::RunningInForeground
        )
    }
}

impl fmt::Display for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AppState::NotInstalled => "NOT_INSTALLED",
            AppState::NotRunning => "NOT_RUNNING",
            AppState::RunningInBackground => "RUNNING_IN_BACKGROUND",
            AppState::RunningInForeground => "RUNNING_IN_FOREGROUND",
        };
        f.write_str(name)
    }
}

/// One live connection to an automation server controlling a device/app.
///
/// Implementations only need the primitive element and `execute_mobile`
/// commands; the app-level helpers are provided on top of `execute_mobile`.
#[async_trait]
pub trait AutomationSession: Send + Sync {
    /// Remote session id
    fn session_id(&self) -> &str;

    /// Find the first element matching `locator`.
    ///
    /// Returns `Ok(None)` when the server reports no such element.
    async fn find_element(&self, locator: &Locator) -> Result<Option<ElementId>>;

    async fn is_displayed(&self, element: &ElementId) -> Result<bool>;

    async fn is_enabled(&self, element: &ElementId) -> Result<bool>;

    async fn click(&self, element: &ElementId) -> Result<()>;

    async fn clear(&self, element: &ElementId) -> Result<()>;

    async fn send_keys(&self, element: &ElementId, text: &str) -> Result<()>;

    async fn text(&self, element: &ElementId) -> Result<String>;

    /// Read an element attribute, `None` if unset
    async fn attribute(&self, element: &ElementId, name: &str) -> Result<Option<String>>;

    async fn press_keycode(&self, keycode: u32) -> Result<()>;

    async fn hide_keyboard(&self) -> Result<()>;

    /// Run an Appium `mobile:` extension command
    async fn execute_mobile(&self, command: &str, args: Value) -> Result<Value>;

    /// Base64-encoded PNG of the current screen
    async fn screenshot_base64(&self) -> Result<String>;

    /// Raw page source XML
    async fn page_source(&self) -> Result<String>;

    /// Close the remote session
    async fn quit(&self) -> Result<()>;

    async fn query_app_state(&self, package: &str) -> Result<AppState> {
        let value = self
            .execute_mobile("queryAppState", json!({ "appId": package }))
            .await?;
        let code = value
            .as_i64()
            .with_context(|| format!("queryAppState returned non-integer: {}", value))?;
        AppState::from_code(code)
    }

    async fn is_app_installed(&self, package: &str) -> Result<bool> {
        let value = self
            .execute_mobile("isAppInstalled", json!({ "appId": package }))
            .await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn activate_app(&self, package: &str) -> Result<()> {
        self.execute_mobile("activateApp", json!({ "appId": package }))
            .await?;
        Ok(())
    }

    /// Returns whether the app was running before termination
    async fn terminate_app(&self, package: &str) -> Result<bool> {
        let value = self
            .execute_mobile("terminateApp", json!({ "appId": package }))
            .await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn start_activity(&self, package: &str, activity: &str) -> Result<()> {
        self.execute_mobile(
            "startActivity",
            json!({ "appPackage": package, "appActivity": activity }),
        )
        .await?;
        Ok(())
    }

    async fn current_activity(&self) -> Result<String> {
        let value = self.execute_mobile("getCurrentActivity", json!({})).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    /// Type into the focused element through the input method
    async fn type_text(&self, text: &str) -> Result<()> {
        self.execute_mobile("type", json!({ "text": text })).await?;
        Ok(())
    }

    /// Run an adb shell command on the device (server needs `--allow-insecure adb_shell`)
    async fn shell(&self, command: &str, args: &[&str]) -> Result<String> {
        let value = self
            .execute_mobile("shell", json!({ "command": command, "args": args }))
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }
}

/// Opens automation sessions against an endpoint
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open(
        &self,
        endpoint: &str,
        capabilities: &Capabilities,
    ) -> Result<Box<dyn AutomationSession>>;
}
