//! Driver lifecycle: create or reuse a session, quit it, and restart the app
//! through the tiers of a [`RecoveryPlan`].

use crate::driver::appium::capabilities::Capabilities;
use crate::driver::common::settle;
use crate::driver::traits::{AppState, AutomationSession, SessionFactory};
use crate::error::HarnessError;
use crate::report::sink::{Level, ReportSink};
use crate::session::recovery::{RecoveryPlan, RecoveryTier, TierFailure, TierOutcome};
use crate::session::registry::{DriverPhase, SessionRegistry};
use crate::session::screenshot::{self, Screenshot};
use crate::utils::config::Settings;
use anyhow::Result;
use std::sync::Arc;

/// What `create_driver` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverOutcome {
    /// Opened the first session
    Created,
    /// Kept the existing session, app still running
    Reused,
    /// Kept the session and brought the app back
    Reactivated,
    /// Reactivation failed; quit and opened a new session
    Recreated,
}

/// What `restart_app` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartOutcome {
    /// Already on a safe entry screen
    Skipped,
    Recovered { tier: RecoveryTier, attempts: usize },
}

pub struct DriverManager {
    settings: Settings,
    factory: Arc<dyn SessionFactory>,
    reporter: Arc<dyn ReportSink>,
    plan: RecoveryPlan,
}

impl DriverManager {
    pub fn new(
        settings: Settings,
        factory: Arc<dyn SessionFactory>,
        reporter: Arc<dyn ReportSink>,
    ) -> Self {
        Self {
            settings,
            factory,
            reporter,
            plan: RecoveryPlan::default(),
        }
    }

    pub fn with_plan(mut self, plan: RecoveryPlan) -> Self {
        self.plan = plan;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Make sure a driver exists and the app is running.
    pub async fn create_driver(&self, registry: &mut SessionRegistry) -> Result<DriverOutcome> {
        if !registry.is_driver_initialized() {
            self.open_fresh(registry).await?;
            return Ok(DriverOutcome::Created);
        }

        let driver = registry.driver()?;
        if self.is_app_running(driver).await {
            self.reporter.log(Level::App, "Reusing existing driver, app is running");
            return Ok(DriverOutcome::Reused);
        }

        self.reporter
            .warn("Driver exists but app is not running, reactivating");
        let activated = driver.activate_app(&self.settings.app_package).await;
        match activated {
            Ok(()) => {
                settle(self.settings.timing.launch_settle(), "app reactivation").await;
                self.log_current_activity(driver).await;
                Ok(DriverOutcome::Reactivated)
            }
            Err(e) => {
                self.reporter.warn(&format!(
                    "Failed to reactivate app, creating new driver: {:#}",
                    e
                ));
                self.quit_driver(registry).await;
                self.open_fresh(registry).await?;
                Ok(DriverOutcome::Recreated)
            }
        }
    }

    /// Open a new session. Never recurses back into `create_driver`.
    async fn open_fresh(&self, registry: &mut SessionRegistry) -> Result<()> {
        registry.set_phase(DriverPhase::DriverCreating);
        self.reporter.log(Level::App, "Creating new driver session...");

        let opened: Result<Box<dyn AutomationSession>> = async {
            registry.start_server().await?;
            let endpoint = registry.session_endpoint()?;
            let capabilities = Capabilities::from_settings(&self.settings);
            self.factory.open(&endpoint, &capabilities).await
        }
        .await;

        match opened {
            Ok(session) => {
                registry.install_driver(session);
                self.reporter.pass("Driver initialized");
                settle(self.settings.timing.launch_settle(), "app launch").await;
                if let Ok(driver) = registry.driver() {
                    self.log_current_activity(driver).await;
                }
                Ok(())
            }
            Err(e) => {
                drop(registry.take_driver());
                self.reporter.error_with_cause("Failed to initialize driver", &e);
                Err(HarnessError::Initialization {
                    message: format!("{:#}", e),
                    source: e,
                }
                .into())
            }
        }
    }

    /// Close the session if any; close errors are logged, never propagated
    pub async fn quit_driver(&self, registry: &mut SessionRegistry) {
        let Some(driver) = registry.take_driver() else {
            return;
        };

        self.reporter.log(Level::App, "Quitting driver...");
        match driver.quit().await {
            Ok(()) => self.reporter.log(Level::App, "Driver quit"),
            Err(e) => self
                .reporter
                .warn(&format!("Error while quitting driver: {:#}", e)),
        }
    }

    /// Installed and in the foreground or background. Query errors count as not running.
    async fn is_app_running(&self, driver: &dyn AutomationSession) -> bool {
        let package = &self.settings.app_package;
        let installed = match driver.is_app_installed(package).await {
            Ok(installed) => installed,
            Err(e) => {
                self.reporter
                    .warn(&format!("Could not check whether {} is installed: {:#}", package, e));
                return false;
            }
        };
        if !installed {
            return false;
        }

        match driver.query_app_state(package).await {
            Ok(state) => {
                self.reporter.debug(&format!("App state: {}", state));
                state.is_running()
            }
            Err(e) => {
                self.reporter
                    .warn(&format!("Could not query app state: {:#}", e));
                false
            }
        }
    }

    async fn log_current_activity(&self, driver: &dyn AutomationSession) {
        match driver.current_activity().await {
            Ok(activity) => self
                .reporter
                .log(Level::App, &format!("Current activity: {}", activity)),
            Err(e) => self
                .reporter
                .debug(&format!("Could not read current activity: {:#}", e)),
        }
    }

    /// True if the app is in the foreground on a safe-marker activity
    async fn is_on_safe_screen(&self, driver: &dyn AutomationSession) -> bool {
        let foreground = matches!(
            driver.query_app_state(&self.settings.app_package).await,
            Ok(AppState::RunningInForeground)
        );
        if !foreground {
            return false;
        }
        match driver.current_activity().await {
            Ok(activity) => self.settings.is_safe_activity(&activity),
            Err(_) => false,
        }
    }

    /// Return the app to its entry screen, escalating through the recovery plan.
    ///
    /// Fails fast with `Uninitialized` when there is no driver. Only exhaustion
    /// of the whole plan is an error.
    pub async fn restart_app(&self, registry: &mut SessionRegistry) -> Result<RestartOutcome> {
        let driver = registry.driver()?;

        if self.is_on_safe_screen(driver).await {
            self.reporter
                .log(Level::App, "App already on a safe entry screen, skipping restart");
            return Ok(RestartOutcome::Skipped);
        }

        registry.set_phase(DriverPhase::DriverRecovering);

        let mut tier = match self.plan.first() {
            Some(tier) => tier,
            None => anyhow::bail!("Recovery plan is empty"),
        };
        let mut last_failure = String::new();

        for attempt in 1..=self.plan.len() {
            self.reporter.log(
                Level::App,
                &format!("Restart attempt {}/{}: {}", attempt, self.plan.len(), tier),
            );

            match self.run_tier(registry, tier).await {
                TierOutcome::Completed => {
                    self.reporter.pass(&format!("App restarted via {}", tier));
                    self.finish_recovery(registry);
                    return Ok(RestartOutcome::Recovered {
                        tier,
                        attempts: attempt,
                    });
                }
                TierOutcome::Degraded(reason) => {
                    self.reporter
                        .warn(&format!("{} finished but {}", tier, reason));
                    self.finish_recovery(registry);
                    return Ok(RestartOutcome::Recovered {
                        tier,
                        attempts: attempt,
                    });
                }
                TierOutcome::Failed(failure) => {
                    last_failure = failure.describe();
                    self.reporter
                        .warn(&format!("{} failed: {}", tier, last_failure));
                    match self.plan.next_tier(tier, &failure) {
                        Some(next) => tier = next,
                        None => break,
                    }
                }
            }
        }

        self.finish_recovery(registry);
        self.reporter.error("Complete restart failure");
        Err(HarnessError::RecoveryExhausted {
            attempts: self.plan.len(),
            message: last_failure,
        }
        .into())
    }

    fn finish_recovery(&self, registry: &mut SessionRegistry) {
        let phase = if registry.is_driver_initialized() {
            DriverPhase::DriverReady
        } else {
            DriverPhase::NoDriver
        };
        registry.set_phase(phase);
    }

    async fn run_tier(&self, registry: &mut SessionRegistry, tier: RecoveryTier) -> TierOutcome {
        if tier == RecoveryTier::FullRecreation {
            self.quit_driver(registry).await;
            return match self.open_fresh(registry).await {
                Ok(()) => TierOutcome::Completed,
                Err(e) => TierOutcome::Failed(TierFailure::Error(e)),
            };
        }

        let driver = match registry.driver() {
            Ok(driver) => driver,
            Err(e) => return TierOutcome::Failed(TierFailure::from_error(e)),
        };

        let result = match tier {
            RecoveryTier::GentleReset => self.gentle_reset(driver).await,
            RecoveryTier::HardReset => self.hard_reset(driver).await,
            RecoveryTier::BasicReactivation => self.basic_reactivation(driver).await,
            RecoveryTier::FullRecreation => unreachable!("handled above"),
        };

        result.unwrap_or_else(|e| TierOutcome::Failed(TierFailure::from_error(e)))
    }

    async fn gentle_reset(&self, driver: &dyn AutomationSession) -> Result<TierOutcome> {
        driver
            .start_activity(&self.settings.app_package, &self.settings.app_activity)
            .await?;
        settle(self.settings.timing.launch_settle(), "activity start").await;

        let activity = driver.current_activity().await?;
        if self.settings.is_safe_activity(&activity) {
            Ok(TierOutcome::Completed)
        } else {
            Ok(TierOutcome::Failed(TierFailure::Verification(format!(
                "expected a safe entry activity, found {}",
                activity
            ))))
        }
    }

    async fn hard_reset(&self, driver: &dyn AutomationSession) -> Result<TierOutcome> {
        let package = &self.settings.app_package;
        driver.terminate_app(package).await?;
        settle(self.settings.timing.terminate_settle(), "app termination").await;
        driver.activate_app(package).await?;
        settle(self.settings.timing.relaunch_settle(), "app relaunch").await;

        let activity = driver.current_activity().await?;
        if self.settings.is_safe_activity(&activity) {
            Ok(TierOutcome::Completed)
        } else {
            Ok(TierOutcome::Degraded(format!(
                "landed on {} instead of a safe entry activity",
                activity
            )))
        }
    }

    async fn basic_reactivation(&self, driver: &dyn AutomationSession) -> Result<TierOutcome> {
        driver.activate_app(&self.settings.app_package).await?;
        settle(self.settings.timing.launch_settle(), "app reactivation").await;
        Ok(TierOutcome::Completed)
    }

    /// Capture a screenshot into the configured directory.
    ///
    /// Returns the base64 PNG, or an empty string if capture failed.
    pub async fn capture_screenshot(&self, registry: &SessionRegistry, name: &str) -> String {
        self.capture_screenshot_file(registry, name)
            .await
            .map(|shot| shot.base64)
            .unwrap_or_default()
    }

    pub async fn capture_screenshot_file(
        &self,
        registry: &SessionRegistry,
        name: &str,
    ) -> Option<Screenshot> {
        screenshot::capture_or_warn(
            registry.driver().ok(),
            self.reporter.as_ref(),
            &self.settings.screenshot_dir,
            name,
        )
        .await
    }
}
