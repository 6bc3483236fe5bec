//! Built-in smoke checks run by the `smoke` command.

use crate::error::{assert_condition, HarnessError};
use crate::interact::sweeper::AnrOutcome;
use crate::report::sink::Level;
use crate::runner::{HarnessContext, Scenario};
use crate::session::lifecycle::RestartOutcome;
use anyhow::Result;
use async_trait::async_trait;

/// App is running, answers on its entry screen and survives a restart
pub struct SmokeScenario;

#[async_trait]
impl Scenario for SmokeScenario {
    fn name(&self) -> &str {
        "App launches to its entry screen"
    }

    fn tags(&self) -> Vec<String> {
        vec!["@smoke".to_string()]
    }

    async fn run(&self, ctx: &mut HarnessContext) -> Result<()> {
        let package = ctx.settings.app_package.clone();
        let state = ctx.driver()?.query_app_state(&package).await?;
        ctx.reporter.log(Level::App, &format!("{} is {}", package, state));
        assert_condition(state.is_running(), format!("{} is not running ({})", package, state))?;

        if ctx.handle_anr().await? != AnrOutcome::NotPresent {
            ctx.reporter.warn("Recovered from an ANR dialog during smoke check");
        }

        let outcome = ctx.restart_app().await?;
        ctx.reporter.info(&format!("Restart outcome: {:?}", outcome));

        let activity = ctx.driver()?.current_activity().await?;
        assert_condition(
            ctx.settings.is_safe_activity(&activity),
            format!("expected an entry activity after restart, found {}", activity),
        )
    }
}

/// What [`lifecycle_check`] observed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleReport {
    /// The harness started (and stopped) its own server
    pub server_managed: bool,
    pub restart: RestartOutcome,
}

/// Walk the whole driver lifecycle once: server up, session up, restart,
/// session down, server down.
pub async fn lifecycle_check(ctx: &mut HarnessContext) -> Result<LifecycleReport> {
    ctx.start_server().await?;
    let server_managed = ctx.registry.is_server_running();

    ctx.create_driver().await?;
    assert_condition(ctx.is_driver_initialized(), "driver should be initialized")?;

    let restart = ctx.restart_app().await?;

    ctx.quit_driver().await;
    assert_condition(!ctx.is_driver_initialized(), "driver should be released")?;
    match ctx.driver() {
        Err(e) if HarnessError::is_uninitialized(&e) => {}
        _ => return Err(HarnessError::Assertion("driver() should fail after quit".into()).into()),
    }

    ctx.stop_server().await?;
    assert_condition(!ctx.registry.is_server_running(), "server should be stopped")?;

    Ok(LifecycleReport {
        server_managed,
        restart,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::fake::Fake;
    use crate::runner::context::tests::fake_context;
    use crate::runner::{run_suite, ScenarioStatus};
    use crate::utils::config::test_settings;

    fn on_login_screen() -> Fake {
        let fake = Fake::new();
        fake.with(|s| s.activity = "com.example.app.LoginActivity".to_string());
        fake
    }

    #[tokio::test(start_paused = true)]
    async fn test_lifecycle_with_local_server() {
        let fake = on_login_screen();
        let (mut ctx, _) = fake_context(&fake, test_settings());

        let report = lifecycle_check(&mut ctx).await.unwrap();
        assert!(report.server_managed);
        assert_eq!(report.restart, RestartOutcome::Skipped);

        let state = fake.state();
        assert!(state.last_capabilities.as_ref().unwrap().no_reset);
        assert_eq!(state.launched, 1);
        assert_eq!(state.stopped, 1);
        assert_eq!(state.opened, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lifecycle_with_external_server() {
        let fake = on_login_screen();
        let mut settings = test_settings();
        settings.use_external_appium = true;
        settings.appium_server_url = "http://grid.local:4723/".to_string();
        let (mut ctx, _) = fake_context(&fake, settings);

        let report = lifecycle_check(&mut ctx).await.unwrap();
        assert!(!report.server_managed);
        assert_eq!(report.restart, RestartOutcome::Skipped);

        let state = fake.state();
        assert_eq!(state.last_endpoint.as_deref(), Some("http://grid.local:4723"));
        assert_eq!(state.launched, 0);
        assert_eq!(state.stopped, 0);
        // restart on the login screen changes nothing
        assert!(!state.calls.iter().any(|c| c.starts_with("mobile:startActivity")
            || c.starts_with("mobile:terminateApp")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_smoke_scenario_passes() {
        let fake = on_login_screen();
        let (mut ctx, _) = fake_context(&fake, test_settings());
        let scenarios: Vec<Box<dyn Scenario>> = vec![Box::new(SmokeScenario)];

        let results = run_suite(&mut ctx, "smoke", &scenarios, &[]).await;
        assert_eq!(results.scenarios[0].status, ScenarioStatus::Passed);
        assert!(results.all_passed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_smoke_scenario_flags_stopped_app() {
        let fake = on_login_screen();
        let (mut ctx, _) = fake_context(&fake, test_settings());
        ctx.create_driver().await.unwrap();
        fake.with(|s| s.app_state = Some(1));

        let err = SmokeScenario.run(&mut ctx).await.unwrap_err();
        assert_eq!(HarnessError::classify(&err), crate::error::FailureKind::Assertion);
    }
}
