use crate::utils::config::Settings;
use serde::{Deserialize, Serialize};

/// Desired capabilities for a UiAutomator2 session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    #[serde(rename = "platformName")]
    pub platform_name: String,
    #[serde(rename = "appium:deviceName")]
    pub device_name: String,
    #[serde(rename = "appium:automationName")]
    pub automation_name: String,
    #[serde(rename = "appium:appPackage")]
    pub app_package: String,
    #[serde(rename = "appium:appActivity")]
    pub app_activity: String,
    /// Keep app data between sessions
    #[serde(rename = "appium:noReset")]
    pub no_reset: bool,
    #[serde(rename = "appium:forceAppLaunch")]
    pub force_app_launch: bool,
}

impl Capabilities {
    pub const AUTOMATION_NAME: &'static str = "UiAutomator2";

    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            platform_name: settings.platform_name.clone(),
            device_name: settings.device_name.clone(),
            automation_name: Self::AUTOMATION_NAME.to_string(),
            app_package: settings.app_package.clone(),
            app_activity: settings.app_activity.clone(),
            no_reset: true,
            force_app_launch: true,
        }
    }

    /// W3C new-session request body
    pub fn to_w3c(&self) -> serde_json::Value {
        serde_json::json!({
            "capabilities": {
                "alwaysMatch": self,
                "firstMatch": [{}]
            }
        })
    }
}
