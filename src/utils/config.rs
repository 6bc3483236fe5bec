use crate::error::HarnessError;
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable pointing at an explicit configuration file
pub const CONFIG_PATH_ENV: &str = "HARNESS_CONFIG";

/// File names probed by [`ConfigProvider::discover`], in order
pub const CONFIG_FILE_NAMES: &[&str] = &["Config.properties", "config.properties", "config.yaml"];

/// Directories probed by [`ConfigProvider::discover`], relative to the working directory
const CONFIG_SEARCH_DIRS: &[&str] = &[".", "src/main/resources", "resources"];

/// Timing configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Default timeout for element waiting (ms)
    pub default_timeout_ms: u64,

    /// Pause after launching or reactivating the app before reading its activity (ms)
    pub launch_settle_ms: u64,

    /// Pause between terminate and activate during a hard reset (ms)
    pub terminate_settle_ms: u64,

    /// Pause after a hard reset before verifying the activity (ms)
    pub relaunch_settle_ms: u64,

    /// Pause after tapping a field or dialog button (ms)
    pub tap_settle_ms: u64,

    /// Pause between clearing and typing (ms)
    pub input_settle_ms: u64,
}

impl Config {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    pub fn launch_settle(&self) -> Duration {
        Duration::from_millis(self.launch_settle_ms)
    }

    pub fn terminate_settle(&self) -> Duration {
        Duration::from_millis(self.terminate_settle_ms)
    }

    pub fn relaunch_settle(&self) -> Duration {
        Duration::from_millis(self.relaunch_settle_ms)
    }

    pub fn tap_settle(&self) -> Duration {
        Duration::from_millis(self.tap_settle_ms)
    }

    pub fn input_settle(&self) -> Duration {
        Duration::from_millis(self.input_settle_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_timeout_ms: 5000,
            launch_settle_ms: 500,
            terminate_settle_ms: 500,
            relaunch_settle_ms: 1000,
            tap_settle_ms: 500,
            input_settle_ms: 300,
        }
    }
}

/// Where environment lookups come from
#[derive(Debug, Clone)]
enum EnvSource {
    Process,
    Fixed(HashMap<String, String>),
}

/// Key-value settings provider with override precedence:
/// process override > environment variable > file default.
#[derive(Debug, Clone)]
pub struct ConfigProvider {
    overrides: HashMap<String, String>,
    file: HashMap<String, String>,
    env: EnvSource,
    source: Option<PathBuf>,
}

impl ConfigProvider {
    /// Load defaults from a `.properties` or YAML file.
    ///
    /// Fails with [`HarnessError::ConfigFileMissing`] if the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(HarnessError::ConfigFileMissing {
                checked: vec![path.to_path_buf()],
            }
            .into());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let is_yaml = path
            .extension()
            .map_or(false, |ext| ext == "yaml" || ext == "yml");
        let file = if is_yaml {
            parse_yaml(&content)
                .with_context(|| format!("Failed to parse YAML config {}", path.display()))?
        } else {
            parse_properties(&content)
        };

        log::debug!(
            "Loaded {} setting(s) from {}",
            file.len(),
            path.display()
        );

        Ok(Self {
            overrides: HashMap::new(),
            file,
            env: EnvSource::Process,
            source: Some(path.to_path_buf()),
        })
    }

    /// Locate the configuration file and load it.
    ///
    /// `HARNESS_CONFIG` wins if set; otherwise the well-known file names are
    /// probed in the working directory and resource folders.
    pub fn discover() -> Result<Self> {
        if let Ok(explicit) = std::env::var(CONFIG_PATH_ENV) {
            if !explicit.is_empty() {
                return Self::load(Path::new(&explicit));
            }
        }

        let mut checked = Vec::new();
        for dir in CONFIG_SEARCH_DIRS {
            for name in CONFIG_FILE_NAMES {
                let candidate = Path::new(dir).join(name);
                if candidate.is_file() {
                    return Self::load(&candidate);
                }
                checked.push(candidate);
            }
        }

        Err(HarnessError::ConfigFileMissing { checked }.into())
    }

    /// Build a provider from in-memory defaults (no backing file)
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            overrides: HashMap::new(),
            file: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            env: EnvSource::Process,
            source: None,
        }
    }

    /// Replace process environment lookups with a fixed map
    pub fn with_env<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env = EnvSource::Fixed(vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect());
        self
    }

    /// Add a process-level override (highest precedence)
    pub fn with_override(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_override(key, value);
        self
    }

    pub fn set_override(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.overrides.insert(key.into(), value.into());
    }

    /// Parse `key=value` strings (CLI `-D` flags) into overrides
    pub fn apply_override_args(&mut self, args: &[String]) -> Result<()> {
        for arg in args {
            let (key, value) = arg
                .split_once('=')
                .with_context(|| format!("Override '{}' must look like key=value", arg))?;
            self.set_override(key.trim(), value.trim());
        }
        Ok(())
    }

    /// File the defaults were loaded from, if any
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Resolve a setting through override > environment > file.
    pub fn get(&self, key: &str) -> Option<String> {
        if let Some(value) = self.overrides.get(key) {
            if !value.is_empty() && *value != format!("${{{}}}", key) {
                log::debug!("Using override for {}: {}", key, value);
                return Some(value.clone());
            }
        }

        let env_key = env_key_for(key);
        if let Some(value) = self.env_var(&env_key) {
            if !value.is_empty() {
                log::debug!("Using environment variable {} for {}", env_key, key);
                return Some(value);
            }
        }

        self.file.get(key).cloned()
    }

    /// Resolve a setting or fail with [`HarnessError::MissingSetting`]
    pub fn require(&self, key: &str) -> Result<String> {
        self.get(key)
            .ok_or_else(|| HarnessError::MissingSetting(key.to_string()).into())
    }

    pub fn get_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    pub fn get_bool(&self, key: &str, default: bool) -> Result<bool> {
        match self.get(key) {
            None => Ok(default),
            Some(raw) => match raw.trim().to_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Ok(true),
                "false" | "0" | "no" | "off" => Ok(false),
                _ => Err(HarnessError::InvalidSetting {
                    key: key.to_string(),
                    value: raw,
                }
                .into()),
            },
        }
    }

    pub fn get_u64(&self, key: &str, default: u64) -> Result<u64> {
        match self.get(key) {
            None => Ok(default),
            Some(raw) => raw.trim().parse().map_err(|_| {
                HarnessError::InvalidSetting {
                    key: key.to_string(),
                    value: raw.clone(),
                }
                .into()
            }),
        }
    }

    fn env_var(&self, key: &str) -> Option<String> {
        match &self.env {
            EnvSource::Process => std::env::var(key).ok(),
            EnvSource::Fixed(vars) => vars.get(key).cloned(),
        }
    }
}

/// Environment variable name for a setting key: upper-cased, separators replaced.
pub fn env_key_for(key: &str) -> String {
    key.to_uppercase().replace(['.', '-'], "_")
}

/// Parse Java-style properties content
pub fn parse_properties(content: &str) -> HashMap<String, String> {
    let mut values = HashMap::new();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
            continue;
        }

        let split_at = line.find(|c| c == '=' || c == ':');
        let (key, value) = match split_at {
            Some(idx) => (&line[..idx], &line[idx + 1..]),
            None => (line, ""),
        };

        let key = key.trim();
        if !key.is_empty() {
            values.insert(key.to_string(), value.trim().to_string());
        }
    }

    values
}

/// Parse a flat YAML mapping, stringifying scalar values
fn parse_yaml(content: &str) -> Result<HashMap<String, String>> {
    let raw: HashMap<String, serde_yaml::Value> = serde_yaml::from_str(content)?;
    let mut values = HashMap::new();

    for (key, value) in raw {
        let text = match value {
            serde_yaml::Value::String(s) => s,
            serde_yaml::Value::Bool(b) => b.to_string(),
            serde_yaml::Value::Number(n) => n.to_string(),
            serde_yaml::Value::Null => continue,
            serde_yaml::Value::Sequence(items) => items
                .iter()
                .filter_map(|item| match item {
                    serde_yaml::Value::String(s) => Some(s.clone()),
                    serde_yaml::Value::Number(n) => Some(n.to_string()),
                    serde_yaml::Value::Bool(b) => Some(b.to_string()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join(","),
            other => anyhow::bail!("Unsupported value for '{}': {:?}", key, other),
        };
        values.insert(key, text);
    }

    Ok(values)
}

/// Typed settings resolved once from a [`ConfigProvider`]
#[derive(Debug, Clone)]
pub struct Settings {
    pub platform_name: String,
    pub device_name: String,
    pub app_package: String,
    pub app_activity: String,

    /// Connect to `appium_server_url` instead of spawning a local server
    pub use_external_appium: bool,
    pub appium_server_url: String,

    /// Where screenshots are written
    pub screenshot_dir: PathBuf,

    /// Activity-name substrings that identify a clean restart target
    pub safe_activity_markers: Vec<String>,

    /// Surface failures swallowed by best-effort cleanup as warnings
    pub report_suppressed_failures: bool,

    /// HTTP timeout for a single remote command
    pub command_timeout: Duration,

    pub timing: Config,
}

impl Settings {
    pub const PLATFORM_NAME: &'static str = "platformName";
    pub const DEVICE_NAME: &'static str = "deviceName";
    pub const APP_PACKAGE: &'static str = "appPackage";
    pub const APP_ACTIVITY: &'static str = "appActivity";
    pub const USE_EXTERNAL_APPIUM: &'static str = "use.external.appium";
    pub const APPIUM_SERVER_URL: &'static str = "appium.server.url";
    pub const SCREENSHOT_DIR: &'static str = "screenshot.dir";
    pub const SAFE_ACTIVITY_MARKERS: &'static str = "safe.activity.markers";
    pub const REPORT_SUPPRESSED_FAILURES: &'static str = "report.suppressed.failures";
    pub const COMMAND_TIMEOUT_SECS: &'static str = "command.timeout.secs";
    pub const ELEMENT_TIMEOUT_MS: &'static str = "element.timeout.ms";

    pub const DEFAULT_SERVER_URL: &'static str = "http://127.0.0.1:4723";
    pub const DEFAULT_SAFE_MARKERS: &'static str = "LoginActivity,DeskStartupActivity";

    pub fn from_provider(provider: &ConfigProvider) -> Result<Self> {
        let mut timing = Config::default();
        timing.default_timeout_ms =
            provider.get_u64(Self::ELEMENT_TIMEOUT_MS, timing.default_timeout_ms)?;

        let safe_activity_markers = provider
            .get_or(Self::SAFE_ACTIVITY_MARKERS, Self::DEFAULT_SAFE_MARKERS)
            .split(',')
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .collect();

        Ok(Self {
            platform_name: provider.get_or(Self::PLATFORM_NAME, "Android"),
            device_name: provider.require(Self::DEVICE_NAME)?,
            app_package: provider.require(Self::APP_PACKAGE)?,
            app_activity: provider.require(Self::APP_ACTIVITY)?,
            use_external_appium: provider.get_bool(Self::USE_EXTERNAL_APPIUM, false)?,
            appium_server_url: provider.get_or(Self::APPIUM_SERVER_URL, Self::DEFAULT_SERVER_URL),
            screenshot_dir: PathBuf::from(provider.get_or(Self::SCREENSHOT_DIR, "target/screenshots")),
            safe_activity_markers,
            report_suppressed_failures: provider
                .get_bool(Self::REPORT_SUPPRESSED_FAILURES, false)?,
            command_timeout: Duration::from_secs(provider.get_u64(Self::COMMAND_TIMEOUT_SECS, 30)?),
            timing,
        })
    }

    /// True if the activity name contains one of the safe markers
    pub fn is_safe_activity(&self, activity: &str) -> bool {
        self.safe_activity_markers
            .iter()
            .any(|marker| activity.contains(marker.as_str()))
    }

    /// Printable key/value view (used by the `config` CLI command)
    pub fn describe(&self) -> Vec<(&'static str, String)> {
        vec![
            (Self::PLATFORM_NAME, self.platform_name.clone()),
            (Self::DEVICE_NAME, self.device_name.clone()),
            (Self::APP_PACKAGE, self.app_package.clone()),
            (Self::APP_ACTIVITY, self.app_activity.clone()),
            (Self::USE_EXTERNAL_APPIUM, self.use_external_appium.to_string()),
            (Self::APPIUM_SERVER_URL, self.appium_server_url.clone()),
            (Self::SCREENSHOT_DIR, self.screenshot_dir.display().to_string()),
            (Self::SAFE_ACTIVITY_MARKERS, self.safe_activity_markers.join(",")),
            (
                Self::REPORT_SUPPRESSED_FAILURES,
                self.report_suppressed_failures.to_string(),
            ),
            (
                Self::COMMAND_TIMEOUT_SECS,
                self.command_timeout.as_secs().to_string(),
            ),
            (
                Self::ELEMENT_TIMEOUT_MS,
                self.timing.default_timeout_ms.to_string(),
            ),
        ]
    }
}

#[cfg(test)]
pub(crate) fn test_settings() -> Settings {
    Settings {
        platform_name: "Android".to_string(),
        device_name: "emulator-5554".to_string(),
        app_package: "com.example.app".to_string(),
        app_activity: "com.example.app.DeskStartupActivity".to_string(),
        use_external_appium: false,
        appium_server_url: Settings::DEFAULT_SERVER_URL.to_string(),
        screenshot_dir: std::env::temp_dir()
            .join(format!("harness_shots_{}", uuid::Uuid::new_v4())),
        safe_activity_markers: vec!["LoginActivity".into(), "DeskStartupActivity".into()],
        report_suppressed_failures: false,
        command_timeout: Duration::from_secs(30),
        timing: Config::default(),
    }
}
