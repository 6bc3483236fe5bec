use crate::error::{FailureKind, HarnessError};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Final status of a scenario
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ScenarioStatus {
    Pending,
    Running,
    Passed,
    Failed { kind: FailureKind, message: String },
    Skipped { reason: String },
}

impl ScenarioStatus {
    pub fn is_failed(&self) -> bool {
        matches!(self, ScenarioStatus::Failed { .. })
    }

    pub fn failed_from(err: &anyhow::Error) -> Self {
        ScenarioStatus::Failed {
            kind: HarnessError::classify(err),
            message: format!("{:#}", err),
        }
    }
}

/// Live state of one scenario run
#[derive(Debug, Clone)]
pub struct ScenarioState {
    pub name: String,
    pub tags: Vec<String>,
    pub status: ScenarioStatus,
    pub started_at: Option<Instant>,
    pub duration_ms: Option<u64>,
    pub screenshot_path: Option<String>,
    pub attachments: Vec<String>,
}

impl ScenarioState {
    pub fn new(name: &str, tags: &[String]) -> Self {
        Self {
            name: name.to_string(),
            tags: tags.to_vec(),
            status: ScenarioStatus::Pending,
            started_at: None,
            duration_ms: None,
            screenshot_path: None,
            attachments: Vec::new(),
        }
    }

    pub fn start(&mut self) {
        self.status = ScenarioStatus::Running;
        self.started_at = Some(Instant::now());
    }

    pub fn pass(&mut self) {
        self.finish(ScenarioStatus::Passed);
    }

    pub fn fail(&mut self, err: &anyhow::Error) {
        self.finish(ScenarioStatus::failed_from(err));
    }

    pub fn skip(&mut self, reason: &str) {
        self.status = ScenarioStatus::Skipped {
            reason: reason.to_string(),
        };
    }

    fn finish(&mut self, status: ScenarioStatus) {
        self.status = status;
        if let Some(start) = self.started_at {
            self.duration_ms = Some(start.elapsed().as_millis() as u64);
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status.is_failed()
    }

    /// Serialize state for reporting (without Instant which isn't serializable)
    pub fn to_report(&self) -> ScenarioReport {
        ScenarioReport {
            name: self.name.clone(),
            tags: self.tags.clone(),
            status: self.status.clone(),
            duration_ms: self.duration_ms,
            screenshot_path: self.screenshot_path.clone(),
            attachments: self.attachments.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioReport {
    pub name: String,
    pub tags: Vec<String>,
    pub status: ScenarioStatus,
    pub duration_ms: Option<u64>,
    pub screenshot_path: Option<String>,
    /// Names of attachments recorded during the scenario
    pub attachments: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SuiteSummary {
    pub total: u32,
    pub passed: u32,
    pub failed: u32,
    pub skipped: u32,
    /// Failures caused by the harness rather than the app
    pub infrastructure_failures: u32,
    pub total_duration_ms: Option<u64>,
}

impl SuiteSummary {
    pub fn from_reports(reports: &[ScenarioReport], total_duration_ms: Option<u64>) -> Self {
        let mut summary = SuiteSummary {
            total: reports.len() as u32,
            total_duration_ms,
            ..Default::default()
        };
        for report in reports {
            match &report.status {
                ScenarioStatus::Passed => summary.passed += 1,
                ScenarioStatus::Failed { kind, .. } => {
                    summary.failed += 1;
                    if *kind == FailureKind::Infrastructure {
                        summary.infrastructure_failures += 1;
                    }
                }
                ScenarioStatus::Skipped { .. } => summary.skipped += 1,
                ScenarioStatus::Pending | ScenarioStatus::Running => {}
            }
        }
        summary
    }
}

/// Hook bookkeeping used to spot the last scenario of a run.
///
/// Without `planned`, detection is approximate: in a sequential run
/// `completed` catches up with `started` after every scenario.
#[derive(Debug, Clone, Default)]
pub struct ScenarioCounters {
    pub started: usize,
    pub completed: usize,
    /// Scenario count, when the runner knows the list up front
    pub planned: Option<usize>,
    /// Forces the current scenario to count as the last one
    pub marked_last: bool,
}

impl ScenarioCounters {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn is_last(&self) -> bool {
        if self.marked_last {
            return true;
        }
        match self.planned {
            Some(planned) => self.completed >= planned,
            None => self.completed >= self.started,
        }
    }
}
