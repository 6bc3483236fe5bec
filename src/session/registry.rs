use crate::driver::appium::client::parse_endpoint;
use crate::driver::appium::server::{ServerConfig, ServerHandle, ServerLauncher};
use crate::driver::traits::AutomationSession;
use crate::error::HarnessError;
use crate::utils::config::Settings;
use anyhow::Result;
use std::sync::Arc;

/// Lifecycle phase of the active driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverPhase {
    NoDriver,
    DriverCreating,
    DriverReady,
    DriverRecovering,
}

/// Where sessions are opened
#[derive(Debug, Clone)]
pub enum Endpoint {
    /// A server managed outside the harness
    External(String),
    /// A server spawned and owned by the registry
    Local(ServerConfig),
}

impl Endpoint {
    pub fn from_settings(settings: &Settings) -> Self {
        if settings.use_external_appium {
            Endpoint::External(settings.appium_server_url.clone())
        } else {
            Endpoint::Local(ServerConfig::default())
        }
    }

    pub fn is_external(&self) -> bool {
        matches!(self, Endpoint::External(_))
    }
}

/// Owns the single active driver session and the local server process.
///
/// One registry per harness context; nothing here is global.
pub struct SessionRegistry {
    endpoint: Endpoint,
    launcher: Arc<dyn ServerLauncher>,
    server: Option<Box<dyn ServerHandle>>,
    driver: Option<Box<dyn AutomationSession>>,
    phase: DriverPhase,
}

impl SessionRegistry {
    pub fn new(endpoint: Endpoint, launcher: Arc<dyn ServerLauncher>) -> Self {
        Self {
            endpoint,
            launcher,
            server: None,
            driver: None,
            phase: DriverPhase::NoDriver,
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Start the local server unless an external one is used or one is running
    pub async fn start_server(&mut self) -> Result<()> {
        let config = match &self.endpoint {
            Endpoint::External(url) => {
                log::info!("Using external Appium server at {}", url);
                return Ok(());
            }
            Endpoint::Local(config) => config,
        };

        if self.server.is_some() {
            log::debug!("Appium server already running");
            return Ok(());
        }

        log::info!("Starting Appium server at {}", config.url());
        let handle = self.launcher.launch(config).await?;
        self.server = Some(handle);
        Ok(())
    }

    /// Stop the local server; no-op if external or not started
    pub async fn stop_server(&mut self) -> Result<()> {
        if self.endpoint.is_external() {
            log::debug!("External Appium server is not managed here");
            return Ok(());
        }

        if let Some(mut server) = self.server.take() {
            log::info!("Stopping Appium server at {}", server.url());
            server.stop().await?;
        }
        Ok(())
    }

    pub fn is_server_running(&self) -> bool {
        self.server.is_some()
    }

    pub fn is_driver_initialized(&self) -> bool {
        self.driver.is_some()
    }

    /// The active driver; never creates one
    pub fn driver(&self) -> Result<&dyn AutomationSession> {
        self.driver
            .as_deref()
            .ok_or_else(|| HarnessError::Uninitialized.into())
    }

    /// URL sessions should be opened against
    pub fn session_endpoint(&self) -> Result<String> {
        match &self.endpoint {
            Endpoint::External(url) => parse_endpoint(url),
            Endpoint::Local(config) => match &self.server {
                Some(server) => parse_endpoint(server.url()),
                None => parse_endpoint(&config.url()),
            },
        }
    }

    pub fn phase(&self) -> DriverPhase {
        self.phase
    }

    pub(crate) fn set_phase(&mut self, phase: DriverPhase) {
        log::trace!("Driver phase {:?} -> {:?}", self.phase, phase);
        self.phase = phase;
    }

    pub(crate) fn install_driver(&mut self, driver: Box<dyn AutomationSession>) {
        self.driver = Some(driver);
        self.set_phase(DriverPhase::DriverReady);
    }

    pub(crate) fn take_driver(&mut self) -> Option<Box<dyn AutomationSession>> {
        let driver = self.driver.take();
        self.set_phase(DriverPhase::NoDriver);
        driver
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::fake::Fake;

    #[tokio::test]
    async fn test_start_server_is_idempotent() {
        let fake = Fake::new();
        let mut registry = SessionRegistry::new(Endpoint::Local(ServerConfig::default()), fake.launcher());

        registry.start_server().await.unwrap();
        registry.start_server().await.unwrap();
        assert_eq!(fake.state().launched, 1);
        assert!(registry.is_server_running());
        assert_eq!(registry.session_endpoint().unwrap(), "http://127.0.0.1:4723");

        registry.stop_server().await.unwrap();
        registry.stop_server().await.unwrap();
        assert_eq!(fake.state().stopped, 1);
        assert!(!registry.is_server_running());
    }

    #[tokio::test]
    async fn test_external_endpoint_never_launches() {
        let fake = Fake::new();
        let mut registry = SessionRegistry::new(
            Endpoint::External("http://grid.local:4444/wd/hub/".to_string()),
            fake.launcher(),
        );

        registry.start_server().await.unwrap();
        registry.stop_server().await.unwrap();
        assert_eq!(fake.state().launched, 0);
        assert_eq!(fake.state().stopped, 0);
        assert_eq!(
            registry.session_endpoint().unwrap(),
            "http://grid.local:4444/wd/hub"
        );
    }

    #[test]
    fn test_malformed_external_endpoint() {
        let fake = Fake::new();
        let registry = SessionRegistry::new(Endpoint::External("::nope".to_string()), fake.launcher());
        let err = registry.session_endpoint().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<HarnessError>(),
            Some(HarnessError::InvalidEndpoint { .. })
        ));
    }

    #[test]
    fn test_driver_uninitialized() {
        let fake = Fake::new();
        let mut registry = SessionRegistry::new(Endpoint::Local(ServerConfig::default()), fake.launcher());
        assert!(!registry.is_driver_initialized());
        assert!(HarnessError::is_uninitialized(&registry.driver().err().unwrap()));

        registry.install_driver(Box::new(fake.session()));
        assert!(registry.is_driver_initialized());
        assert_eq!(registry.phase(), DriverPhase::DriverReady);

        assert!(registry.take_driver().is_some());
        assert_eq!(registry.phase(), DriverPhase::NoDriver);
        assert!(registry.driver().is_err());
    }
}
