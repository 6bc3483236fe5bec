//! Suite and scenario hooks: server and driver setup before, screenshots and
//! app restart between, teardown after.

use crate::report::sink::{exception_details, Attachment, Level};
use crate::runner::context::HarnessContext;
use crate::runner::state::{ScenarioState, SuiteSummary};
use anyhow::Result;

/// Reset counters, announce the suite and start the server
pub async fn before_all(ctx: &mut HarnessContext, suite_name: &str) -> Result<()> {
    ctx.counters.reset();
    ctx.reporter.suite_start(suite_name);
    for (key, value) in ctx.settings.describe() {
        ctx.reporter.info(&format!("{} = {}", key, value));
    }

    if let Err(e) = ctx.start_server().await {
        ctx.reporter.error_with_cause("Failed to start Appium server", &e);
        return Err(e);
    }
    Ok(())
}

/// Make sure a driver is up and the screen is clear of stray dialogs
pub async fn before_each(ctx: &mut HarnessContext, scenario: &ScenarioState) -> Result<()> {
    ctx.counters.started += 1;
    ctx.reporter.scenario_start(&scenario.name);
    ctx.reporter
        .info(&format!("Starting scenario #{}", ctx.counters.started));

    let setup = async {
        ctx.create_driver().await?;
        ctx.sweep_notifications().await?;
        Ok::<(), anyhow::Error>(())
    }
    .await;

    if let Err(e) = setup {
        ctx.reporter.error_with_cause("Driver initialization failed", &e);
        ctx.reporter.attach(Attachment::text(
            "Error Details",
            exception_details(&format!("Setup of '{}' failed", scenario.name), &e),
        ));
        return Err(e);
    }
    Ok(())
}

/// Screenshot the outcome and put the app back on its entry screen for the
/// next scenario. Never fails.
pub async fn after_each(ctx: &mut HarnessContext, scenario: &mut ScenarioState) {
    ctx.counters.completed += 1;
    let last = ctx.counters.is_last();
    ctx.reporter.info(&format!(
        "Completed scenario #{} of {}",
        ctx.counters.completed,
        ctx.counters.planned.unwrap_or(ctx.counters.started)
    ));

    if let Err(e) = finish_scenario(ctx, scenario, last).await {
        ctx.reporter.error_with_cause("Error during cleanup", &e);
        ctx.reporter.log(Level::App, "Final fallback: quitting driver");
        ctx.quit_driver().await;
    }

    scenario.attachments = ctx
        .reporter
        .drain_attachments()
        .into_iter()
        .map(|a| a.name)
        .collect();
}

async fn finish_scenario(ctx: &mut HarnessContext, scenario: &mut ScenarioState, last: bool) -> Result<()> {
    let passed = !scenario.is_failed();

    if !ctx.is_driver_initialized() {
        if passed {
            ctx.reporter.fail("Scenario failed: driver was never initialized");
        } else {
            ctx.reporter.scenario_end(&scenario.name, false);
        }
        return Ok(());
    }

    let prefix = if passed { "Passed" } else { "Failed" };
    let name = format!("{}_{}", prefix, scenario.name);
    if let Some(shot) = ctx.manager.capture_screenshot_file(&ctx.registry, &name).await {
        scenario.screenshot_path = Some(shot.path.display().to_string());
    }
    ctx.reporter.scenario_end(&scenario.name, passed);

    if last {
        ctx.reporter.info("Final scenario completed, skipping app restart");
        return Ok(());
    }

    ctx.reporter.info("Preparing app for next scenario...");
    if let Err(e) = ctx.restart_app().await {
        ctx.report_suppressed(&format!(
            "App restart failed, continuing without restart: {:#}",
            e
        ));
    }
    Ok(())
}

/// Tear everything down regardless of earlier failures
pub async fn after_all(ctx: &mut HarnessContext, suite_name: &str, summary: &SuiteSummary) {
    ctx.reporter.info("Cleaning up resources and quitting driver");
    ctx.quit_driver().await;
    if let Err(e) = ctx.stop_server().await {
        ctx.reporter
            .warn(&format!("Failed to stop Appium server: {:#}", e));
    }
    ctx.reporter
        .suite_end(suite_name, summary.passed as usize, summary.failed as usize);
}
