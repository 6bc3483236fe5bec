//! Typed failure causes for the harness.
//!
//! Operational code returns `anyhow::Result` and attaches one of these as the
//! root cause when the caller needs to tell failures apart (for example an
//! assertion failure from an infrastructure failure). Use
//! [`HarnessError::classify`] or `anyhow::Error::downcast_ref` to inspect.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("Driver is not initialized! Call create_driver() first.")]
    Uninitialized,

    #[error("Failed to initialize driver: {message}")]
    Initialization {
        message: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Invalid Appium server URL: {url}")]
    InvalidEndpoint { url: String },

    #[error("Appium server did not become ready at {url} within {}s", timeout.as_secs())]
    ServerStartTimeout { url: String, timeout: Duration },

    #[error("Failed to launch Appium server: {0}")]
    ServerLaunch(String),

    #[error("Complete restart failure after {attempts} recovery tier(s): {message}")]
    RecoveryExhausted { attempts: usize, message: String },

    #[error("Assertion failed: {0}")]
    Assertion(String),

    #[error("Could not find a configuration file. Checked:\n{}", format_paths(.checked))]
    ConfigFileMissing { checked: Vec<PathBuf> },

    #[error("Missing required setting '{0}'")]
    MissingSetting(String),

    #[error("Invalid value '{value}' for setting '{key}'")]
    InvalidSetting { key: String, value: String },
}

/// Broad failure category used by reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    /// The app behaved incorrectly
    Assertion,
    /// The harness could not drive the app
    Infrastructure,
}

impl HarnessError {
    /// Decide whether an error chain represents an assertion failure or an
    /// infrastructure failure.
    pub fn classify(err: &anyhow::Error) -> FailureKind {
        let is_assertion = err.chain().any(|cause| {
            matches!(
                cause.downcast_ref::<HarnessError>(),
                Some(HarnessError::Assertion(_))
            )
        });
        if is_assertion {
            FailureKind::Assertion
        } else {
            FailureKind::Infrastructure
        }
    }

    /// True if the chain contains an `Uninitialized` cause
    pub fn is_uninitialized(err: &anyhow::Error) -> bool {
        err.chain().any(|cause| {
            matches!(
                cause.downcast_ref::<HarnessError>(),
                Some(HarnessError::Uninitialized)
            )
        })
    }
}

/// Fail with an assertion error unless `condition` holds.
///
/// Page objects use this for app-behavior checks so reports can separate
/// them from harness failures.
pub fn assert_condition(condition: bool, message: impl Into<String>) -> anyhow::Result<()> {
    if condition {
        Ok(())
    } else {
        Err(HarnessError::Assertion(message.into()).into())
    }
}

fn format_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| format!("  {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_classify_assertion_through_context() {
        let err: anyhow::Error = HarnessError::Assertion("popup text mismatch".into()).into();
        let err = err.context("verify logout popup");
        assert_eq!(HarnessError::classify(&err), FailureKind::Assertion);
    }

    #[test]
    fn test_classify_infrastructure() {
        let err = anyhow::anyhow!("connection refused");
        assert_eq!(HarnessError::classify(&err), FailureKind::Infrastructure);

        let err: anyhow::Error = HarnessError::Uninitialized.into();
        assert_eq!(HarnessError::classify(&err), FailureKind::Infrastructure);
        assert!(HarnessError::is_uninitialized(&err));
    }

    #[test]
    fn test_assert_condition() {
        assert!(assert_condition(true, "never").is_ok());
        let err = assert_condition(false, "Location names do not match")
            .context("select floor")
            .unwrap_err();
        assert_eq!(HarnessError::classify(&err), FailureKind::Assertion);
        assert!(format!("{:#}", err).contains("Location names do not match"));
    }

    #[test]
    fn test_config_missing_lists_paths() {
        let err = HarnessError::ConfigFileMissing {
            checked: vec![PathBuf::from("Config.properties"), PathBuf::from("config.yaml")],
        };
        let text = err.to_string();
        assert!(text.contains("Config.properties"));
        assert!(text.contains("config.yaml"));
    }
}
