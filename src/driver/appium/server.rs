//! Local Appium server process management
//!
//! Spawns the `appium` binary, waits for `GET /status` to report ready and
//! kills the process when the suite ends.

use crate::driver::appium::client::is_server_ready;
use crate::driver::common::{wait_until, PollConfig};
use crate::error::HarnessError;
use crate::utils::binary_resolver;
use anyhow::{Context, Result};
use async_trait::async_trait;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Child;
use tokio::sync::Mutex;

/// How a local server is started
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Let a new session replace a stale one left by a crashed run
    pub session_override: bool,
    pub startup_timeout: Duration,
    pub extra_args: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 4723,
            session_override: true,
            startup_timeout: Duration::from_secs(60),
            // `mobile: shell` text entry needs this
            extra_args: vec!["--allow-insecure".to_string(), "adb_shell".to_string()],
        }
    }
}

impl ServerConfig {
    pub fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            "--address".to_string(),
            self.host.clone(),
            "--port".to_string(),
            self.port.to_string(),
        ];
        if self.session_override {
            args.push("--session-override".to_string());
        }
        args.extend(self.extra_args.iter().cloned());
        args
    }
}

/// A running server
#[async_trait]
pub trait ServerHandle: Send + Sync {
    /// Base URL clients should connect to
    fn url(&self) -> &str;

    /// Stop the server. Calling it twice is a no-op.
    async fn stop(&mut self) -> Result<()>;
}

/// Starts servers and waits until they accept sessions
#[async_trait]
pub trait ServerLauncher: Send + Sync {
    async fn launch(&self, config: &ServerConfig) -> Result<Box<dyn ServerHandle>>;
}

/// Launches the `appium` binary found by [`binary_resolver::find_appium`]
#[derive(Debug, Default)]
pub struct AppiumServerLauncher;

#[async_trait]
impl ServerLauncher for AppiumServerLauncher {
    async fn launch(&self, config: &ServerConfig) -> Result<Box<dyn ServerHandle>> {
        let mut cmd = binary_resolver::appium_command()
            .map_err(|e| HarnessError::ServerLaunch(format!("{:#}", e)))?;
        cmd.args(config.args())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| HarnessError::ServerLaunch(e.to_string()))?;

        let url = config.url();
        log::debug!("Spawned appium (pid {:?}) for {}", child.id(), url);

        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner()
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ")
            .template("  {spinner} {msg}")
        {
            spinner.set_style(style);
        }
        spinner.set_message(format!("Starting Appium server at {}...", url));
        spinner.enable_steady_tick(Duration::from_millis(100));

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()
            .context("Failed to create HTTP client")?;
        let client_ref = &client;
        let url_ref = url.as_str();

        let ready = wait_until(
            move || is_server_ready(client_ref, url_ref),
            PollConfig {
                timeout_ms: config.startup_timeout.as_millis() as u64,
                initial_interval_ms: 250,
                max_interval_ms: 1000,
                use_exponential_backoff: true,
            },
        )
        .await;

        spinner.finish_and_clear();

        if !ready {
            if let Err(e) = child.kill().await {
                log::warn!("Failed to kill unresponsive appium process: {}", e);
            }
            return Err(HarnessError::ServerStartTimeout {
                url,
                timeout: config.startup_timeout,
            }
            .into());
        }

        println!("  {} Appium server ready at {}", "🖥️".green(), url.cyan());

        Ok(Box::new(AppiumServerHandle {
            url,
            child: Mutex::new(Some(child)),
        }))
    }
}

/// Handle to a spawned `appium` process
pub struct AppiumServerHandle {
    url: String,
    // Only touched through `&mut self`; the mutex makes the handle `Sync`
    child: Mutex<Option<Child>>,
}

#[async_trait]
impl ServerHandle for AppiumServerHandle {
    fn url(&self) -> &str {
        &self.url
    }

    async fn stop(&mut self) -> Result<()> {
        let Some(mut child) = self.child.get_mut().take() else {
            return Ok(());
        };

        if let Ok(Some(status)) = child.try_wait() {
            log::warn!("Appium server had already exited ({})", status);
            return Ok(());
        }

        child
            .kill()
            .await
            .context("Failed to stop Appium server")?;
        log::info!("Appium server at {} stopped", self.url);
        Ok(())
    }
}
