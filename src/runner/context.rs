use crate::driver::appium::{AppiumServerLauncher, AppiumSessionFactory, ServerLauncher};
use crate::driver::traits::{AutomationSession, Locator, LocatorSet, SessionFactory};
use crate::interact::locator::{self, Resolution};
use crate::interact::sweeper::{self, AnrOutcome, SweepPlan, SweepReport};
use crate::interact::text_entry::{self, EntryOutcome, TextEntry};
use crate::report::sink::ReportSink;
use crate::runner::state::ScenarioCounters;
use crate::session::lifecycle::{DriverManager, DriverOutcome, RestartOutcome};
use crate::session::registry::{Endpoint, SessionRegistry};
use crate::utils::config::Settings;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

/// Everything one worker needs to drive the app: settings, the session
/// registry, the lifecycle manager and the report sink.
///
/// Owned by the worker and passed explicitly; nothing here is global.
pub struct HarnessContext {
    pub settings: Settings,
    pub registry: SessionRegistry,
    pub manager: DriverManager,
    pub reporter: Arc<dyn ReportSink>,
    pub counters: ScenarioCounters,
}

impl HarnessContext {
    pub fn new(
        settings: Settings,
        factory: Arc<dyn SessionFactory>,
        launcher: Arc<dyn ServerLauncher>,
        reporter: Arc<dyn ReportSink>,
    ) -> Self {
        let registry = SessionRegistry::new(Endpoint::from_settings(&settings), launcher);
        let manager = DriverManager::new(settings.clone(), factory, reporter.clone());
        Self {
            settings,
            registry,
            manager,
            reporter,
            counters: ScenarioCounters::default(),
        }
    }

    /// Context talking to a real Appium server
    pub fn production(settings: Settings, reporter: Arc<dyn ReportSink>) -> Self {
        let factory = Arc::new(AppiumSessionFactory::new(settings.command_timeout));
        Self::new(settings, factory, Arc::new(AppiumServerLauncher), reporter)
    }

    pub fn element_timeout(&self) -> Duration {
        self.settings.timing.default_timeout()
    }

    /// Failures swallowed during cleanup: warning if configured, else debug
    pub fn report_suppressed(&self, message: &str) {
        if self.settings.report_suppressed_failures {
            self.reporter.warn(message);
        } else {
            self.reporter.debug(message);
        }
    }

    // ------------------------------------------------------------------
    // Session lifecycle
    // ------------------------------------------------------------------

    pub async fn start_server(&mut self) -> Result<()> {
        self.registry.start_server().await
    }

    pub async fn stop_server(&mut self) -> Result<()> {
        self.registry.stop_server().await
    }

    pub async fn create_driver(&mut self) -> Result<DriverOutcome> {
        self.manager.create_driver(&mut self.registry).await
    }

    pub async fn quit_driver(&mut self) {
        self.manager.quit_driver(&mut self.registry).await
    }

    pub async fn restart_app(&mut self) -> Result<RestartOutcome> {
        self.manager.restart_app(&mut self.registry).await
    }

    pub fn driver(&self) -> Result<&dyn AutomationSession> {
        self.registry.driver()
    }

    pub fn is_driver_initialized(&self) -> bool {
        self.registry.is_driver_initialized()
    }

    pub async fn capture_screenshot(&self, name: &str) -> String {
        self.manager.capture_screenshot(&self.registry, name).await
    }

    // ------------------------------------------------------------------
    // Interaction
    // ------------------------------------------------------------------

    pub async fn resolve(&self, set: &LocatorSet) -> Result<Resolution> {
        Ok(locator::resolve(self.driver()?, set, self.element_timeout()).await)
    }

    pub async fn is_element_present(&self, locator: &Locator, timeout: Duration) -> Result<bool> {
        Ok(locator::is_element_present(self.driver()?, locator, timeout).await)
    }

    pub async fn click(&self, set: &LocatorSet) -> Result<bool> {
        locator::click_when_present(self.driver()?, set, self.element_timeout()).await
    }

    pub async fn text(&self, set: &LocatorSet) -> Result<Option<String>> {
        locator::text_when_present(self.driver()?, set, self.element_timeout()).await
    }

    pub async fn enter_text(&self, entry: &TextEntry<'_>) -> Result<EntryOutcome> {
        Ok(text_entry::enter_text_with_verification(
            self.driver()?,
            self.reporter.as_ref(),
            entry,
            &self.settings.timing,
        )
        .await)
    }

    pub async fn sweep(&self, plan: &SweepPlan) -> Result<SweepReport> {
        Ok(sweeper::sweep(self.driver()?, self.reporter.as_ref(), plan).await)
    }

    pub async fn sweep_notifications(&self) -> Result<SweepReport> {
        self.sweep(&SweepPlan::general(&self.settings.app_package)).await
    }

    pub async fn sweep_post_login(&self) -> Result<SweepReport> {
        self.sweep(&SweepPlan::post_login(&self.settings.app_package)).await
    }

    pub async fn force_dismiss_dialogs(&self) -> Result<usize> {
        Ok(sweeper::force_dismiss_dialogs(
            self.driver()?,
            self.reporter.as_ref(),
            &self.settings.app_package,
        )
        .await)
    }

    pub async fn handle_anr(&self) -> Result<AnrOutcome> {
        Ok(sweeper::handle_anr(self.driver()?, self.reporter.as_ref()).await)
    }
}
