pub mod context;
pub mod hooks;
pub mod smoke;
pub mod state;

use anyhow::Result;
use async_trait::async_trait;
use colored::Colorize;
use tokio::time::Instant;

pub use context::HarnessContext;
pub use state::*;

use crate::report::types::SuiteResults;

/// A test scenario driven through the harness context
#[async_trait]
pub trait Scenario: Send + Sync {
    fn name(&self) -> &str;

    fn tags(&self) -> Vec<String> {
        Vec::new()
    }

    async fn run(&self, ctx: &mut HarnessContext) -> Result<()>;
}

/// True if the scenario carries any of `filter` (an empty filter matches all)
pub fn matches_tags(scenario_tags: &[String], filter: &[String]) -> bool {
    filter.is_empty()
        || filter.iter().any(|wanted| {
            let wanted = wanted.trim_start_matches('@');
            scenario_tags
                .iter()
                .any(|tag| tag.trim_start_matches('@') == wanted)
        })
}

/// Run scenarios with the suite and scenario hooks around them.
///
/// `after_all` runs even when `before_all` fails; scenarios are then skipped.
pub async fn run_suite(
    ctx: &mut HarnessContext,
    suite_name: &str,
    scenarios: &[Box<dyn Scenario>],
    tags: &[String],
) -> SuiteResults {
    let suite_started = Instant::now();
    let selected: Vec<&dyn Scenario> = scenarios
        .iter()
        .map(|s| s.as_ref())
        .filter(|s| matches_tags(&s.tags(), tags))
        .collect();

    if selected.len() < scenarios.len() {
        println!(
            "{} {} of {} scenario(s) selected by tags {:?}",
            "🏷️".dimmed(),
            selected.len(),
            scenarios.len(),
            tags
        );
    }

    let suite_ready = match hooks::before_all(ctx, suite_name).await {
        Ok(()) => Ok(()),
        Err(e) => Err(format!("{:#}", e)),
    };
    ctx.counters.planned = Some(selected.len());

    let mut reports = Vec::with_capacity(selected.len());
    for scenario in selected {
        let mut state = ScenarioState::new(scenario.name(), &scenario.tags());

        if let Err(reason) = &suite_ready {
            state.skip(&format!("Suite setup failed: {}", reason));
            reports.push(state.to_report());
            continue;
        }

        state.start();
        match hooks::before_each(ctx, &state).await {
            Ok(()) => match scenario.run(ctx).await {
                Ok(()) => state.pass(),
                Err(e) => {
                    ctx.reporter.error_with_cause(&format!("Scenario '{}' failed", state.name), &e);
                    state.fail(&e);
                }
            },
            Err(e) => state.fail(&e),
        }
        hooks::after_each(ctx, &mut state).await;
        reports.push(state.to_report());
    }

    let elapsed = suite_started.elapsed().as_millis() as u64;
    let results = SuiteResults::new(suite_name, reports, Some(elapsed));
    hooks::after_all(ctx, suite_name, &results.summary).await;
    results
}
