use crate::driver::common::sanitize_file_name;
use crate::driver::traits::AutomationSession;
use crate::report::sink::{Attachment, ReportSink};
use anyhow::{Context, Result};
use base64::Engine;
use std::path::{Path, PathBuf};

/// A screenshot written to disk
#[derive(Debug, Clone)]
pub struct Screenshot {
    pub path: PathBuf,
    pub base64: String,
}

/// `<dir>/<sanitized name>_<yyyyMMdd_HHmmss>.png`
pub fn screenshot_path(dir: &Path, name: &str) -> PathBuf {
    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    dir.join(format!("{}_{}.png", sanitize_file_name(name), timestamp))
}

/// Capture, persist and attach a screenshot
pub async fn capture(
    session: &dyn AutomationSession,
    reporter: &dyn ReportSink,
    dir: &Path,
    name: &str,
) -> Result<Screenshot> {
    let base64 = session
        .screenshot_base64()
        .await
        .context("Failed to take screenshot")?;
    let png = base64::engine::general_purpose::STANDARD
        .decode(base64.trim())
        .context("Failed to decode screenshot")?;

    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;
    let path = screenshot_path(dir, name);
    std::fs::write(&path, &png).with_context(|| format!("Failed to write {}", path.display()))?;

    reporter.attach(Attachment::png(format!("📸 Screenshot: {}", name), png));
    reporter.log(
        crate::report::sink::Level::Screenshot,
        &format!("Screenshot saved: {}", path.display()),
    );

    Ok(Screenshot { path, base64 })
}

/// Best-effort capture: failures are logged and yield `None`
pub async fn capture_or_warn(
    session: Option<&dyn AutomationSession>,
    reporter: &dyn ReportSink,
    dir: &Path,
    name: &str,
) -> Option<Screenshot> {
    let Some(session) = session else {
        reporter.warn(&format!("Cannot capture screenshot '{}': no active driver", name));
        return None;
    };

    match capture(session, reporter, dir, name).await {
        Ok(shot) => Some(shot),
        Err(e) => {
            reporter.warn(&format!("Failed to capture screenshot '{}': {:#}", name, e));
            None
        }
    }
}
