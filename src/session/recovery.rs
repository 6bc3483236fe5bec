//! Restart escalation as data.
//!
//! A restart walks an ordered plan of tiers. [`RecoveryPlan::next_tier`] is a
//! pure function from (tier, failure) to the next tier, and the executor in
//! `lifecycle` never runs more tiers than the plan holds.

use crate::driver::appium::client::WebDriverError;
use crate::error::HarnessError;
use std::fmt;

/// One way of getting the app back to its entry screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum RecoveryTier {
    /// Start the launch activity in-process
    GentleReset,
    /// Terminate then activate the app
    HardReset,
    /// Bring the app to the foreground once more
    BasicReactivation,
    /// Quit the session and open a new one
    FullRecreation,
}

impl fmt::Display for RecoveryTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RecoveryTier::GentleReset => "gentle reset",
            RecoveryTier::HardReset => "hard reset",
            RecoveryTier::BasicReactivation => "basic reactivation",
            RecoveryTier::FullRecreation => "full recreation",
        };
        f.write_str(name)
    }
}

/// Why a tier did not restore the app
#[derive(Debug)]
pub enum TierFailure {
    /// The tier ran but the app ended up on the wrong screen
    Verification(String),
    /// A command failed
    Error(anyhow::Error),
    /// The session itself is gone; only a new one can help
    SessionLost(anyhow::Error),
}

impl TierFailure {
    /// Classify a command error
    pub fn from_error(err: anyhow::Error) -> Self {
        let lost = err.chain().any(|cause| {
            matches!(
                cause.downcast_ref::<HarnessError>(),
                Some(HarnessError::Uninitialized)
            ) || matches!(
                cause.downcast_ref::<WebDriverError>(),
                Some(wd) if wd.error == "invalid session id"
            )
        });
        if lost {
            TierFailure::SessionLost(err)
        } else {
            TierFailure::Error(err)
        }
    }

    pub fn describe(&self) -> String {
        match self {
            TierFailure::Verification(reason) => reason.clone(),
            TierFailure::Error(err) | TierFailure::SessionLost(err) => format!("{:#}", err),
        }
    }
}

/// Result of running a single tier
#[derive(Debug)]
pub enum TierOutcome {
    Completed,
    /// Ran without errors but the screen could not be confirmed
    Degraded(String),
    Failed(TierFailure),
}

/// Ordered restart tiers
#[derive(Debug, Clone)]
pub struct RecoveryPlan {
    tiers: Vec<RecoveryTier>,
}

impl Default for RecoveryPlan {
    fn default() -> Self {
        Self {
            tiers: vec![
                RecoveryTier::GentleReset,
                RecoveryTier::HardReset,
                RecoveryTier::BasicReactivation,
                RecoveryTier::FullRecreation,
            ],
        }
    }
}

impl RecoveryPlan {
    pub fn new(tiers: Vec<RecoveryTier>) -> Self {
        Self { tiers }
    }

    pub fn first(&self) -> Option<RecoveryTier> {
        self.tiers.first().copied()
    }

    /// Attempt ceiling
    pub fn len(&self) -> usize {
        self.tiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }

    pub fn tiers(&self) -> &[RecoveryTier] {
        &self.tiers
    }

    /// Tier to run after `tier` failed, or `None` when the plan is exhausted.
    ///
    /// A lost session skips straight to recreation if the plan has it.
    pub fn next_tier(&self, tier: RecoveryTier, failure: &TierFailure) -> Option<RecoveryTier> {
        let position = self.tiers.iter().position(|t| *t == tier)?;
        let remaining = &self.tiers[position + 1..];

        if let TierFailure::SessionLost(_) = failure {
            if let Some(recreate) = remaining
                .iter()
                .find(|t| **t == RecoveryTier::FullRecreation)
            {
                return Some(*recreate);
            }
        }

        remaining.first().copied()
    }
}
