use crate::runner::state::{ScenarioReport, SuiteSummary};
use serde::{Deserialize, Serialize};

/// Suite results for report generation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuiteResults {
    pub run_id: String,
    pub suite_name: String,
    pub scenarios: Vec<ScenarioReport>,
    pub summary: SuiteSummary,
    pub generated_at: String,
}

impl SuiteResults {
    pub fn new(suite_name: &str, scenarios: Vec<ScenarioReport>, total_duration_ms: Option<u64>) -> Self {
        let summary = SuiteSummary::from_reports(&scenarios, total_duration_ms);
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            suite_name: suite_name.to_string(),
            scenarios,
            summary,
            generated_at: chrono::Local::now().format("%Y-%m-%dT%H:%M:%S").to_string(),
        }
    }

    pub fn all_passed(&self) -> bool {
        self.summary.failed == 0
    }
}
