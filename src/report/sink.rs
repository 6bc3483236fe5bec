//! Leveled logging and attachments for test reports.

use crate::error::HarnessError;
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Mutex;

/// Message category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Pass,
    Fail,
    Warn,
    Debug,
    Error,
    Step,
    Scenario,
    Screenshot,
    App,
    Server,
    Element,
}

impl Level {
    pub fn emoji(&self) -> &'static str {
        match self {
            Level::Info => "ℹ️",
            Level::Pass => "✅",
            Level::Fail => "❌",
            Level::Warn => "⚠️",
            Level::Debug => "🔍",
            Level::Error => "❌",
            Level::Step => "▶️",
            Level::Scenario => "📋",
            Level::Screenshot => "📸",
            Level::App => "📱",
            Level::Server => "🖥️",
            Level::Element => "🔎",
        }
    }

    /// Corresponding `log` crate level
    pub fn log_level(&self) -> log::Level {
        match self {
            Level::Fail | Level::Error => log::Level::Error,
            Level::Warn => log::Level::Warn,
            Level::Debug | Level::Element => log::Level::Debug,
            _ => log::Level::Info,
        }
    }
}

/// Named binary payload attached to the report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub name: String,
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl Attachment {
    pub fn text(name: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mime_type: "text/plain".to_string(),
            data: body.into().into_bytes(),
        }
    }

    pub fn png(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: "image/png".to_string(),
            data,
        }
    }

    fn extension(&self) -> &'static str {
        match self.mime_type.as_str() {
            "image/png" => "png",
            "application/json" => "json",
            _ => "txt",
        }
    }
}

/// Format the "Exception Details" attachment body
pub fn exception_details(message: &str, err: &anyhow::Error) -> String {
    let mut details = format!(
        "Error: {}\nCause: {}\nKind: {:?}\nChain:\n",
        message,
        err,
        HarnessError::classify(err)
    );
    for (i, cause) in err.chain().enumerate() {
        details.push_str(&format!("  {}: {}\n", i, cause));
    }
    details.push_str(&format!("\nDebug:\n{:?}\n", err));
    details
}

/// Destination for harness log lines and report attachments
pub trait ReportSink: Send + Sync {
    fn log(&self, level: Level, message: &str);

    fn attach(&self, attachment: Attachment);

    /// Take all attachments recorded since the last drain
    fn drain_attachments(&self) -> Vec<Attachment>;

    fn info(&self, message: &str) {
        self.log(Level::Info, message);
    }

    fn pass(&self, message: &str) {
        self.log(Level::Pass, message);
    }

    fn fail(&self, message: &str) {
        self.log(Level::Fail, message);
    }

    fn warn(&self, message: &str) {
        self.log(Level::Warn, message);
    }

    fn debug(&self, message: &str) {
        self.log(Level::Debug, message);
    }

    fn error(&self, message: &str) {
        self.log(Level::Error, message);
    }

    /// Log an error with its cause chain and attach the details
    fn error_with_cause(&self, message: &str, err: &anyhow::Error) {
        self.log(Level::Error, &format!("{}: {:#}", message, err));
        self.attach(Attachment::text(
            "Exception Details",
            exception_details(message, err),
        ));
    }

    fn suite_start(&self, name: &str) {
        self.log(Level::Info, &"=".repeat(60));
        self.log(Level::Info, &format!("🚀 TEST SUITE STARTED: {}", name));
        self.log(Level::Info, &"=".repeat(60));
    }

    fn suite_end(&self, name: &str, passed: usize, failed: usize) {
        self.log(Level::Info, &"=".repeat(60));
        self.log(
            Level::Info,
            &format!(
                "🏁 TEST SUITE COMPLETED: {} ({} passed, {} failed)",
                name, passed, failed
            ),
        );
        self.log(Level::Info, &"=".repeat(60));
    }

    fn scenario_start(&self, name: &str) {
        self.log(Level::Scenario, &format!("SCENARIO STARTED: {}", name));
    }

    fn scenario_end(&self, name: &str, passed: bool) {
        let status = if passed { "PASSED" } else { "FAILED" };
        self.log(Level::Scenario, &format!("SCENARIO {}: {}", status, name));
    }
}

/// Prints colored lines to the terminal and mirrors them to the `log` facade
pub struct ConsoleReporter {
    verbose: bool,
    output_dir: Option<PathBuf>,
    attachments: Mutex<Vec<Attachment>>,
}

impl ConsoleReporter {
    pub fn new(verbose: bool) -> Self {
        Self {
            verbose,
            output_dir: None,
            attachments: Mutex::new(Vec::new()),
        }
    }

    /// Persist attachments under `dir/attachments`
    pub fn with_output_dir(mut self, dir: PathBuf) -> Self {
        self.output_dir = Some(dir);
        self
    }

    fn persist(&self, attachment: &Attachment) {
        let Some(dir) = &self.output_dir else {
            return;
        };
        let dir = dir.join("attachments");
        let file_name = format!(
            "{}_{}.{}",
            crate::driver::common::sanitize_file_name(&attachment.name),
            uuid::Uuid::new_v4().simple(),
            attachment.extension()
        );
        let result = std::fs::create_dir_all(&dir)
            .and_then(|_| std::fs::write(dir.join(&file_name), &attachment.data));
        if let Err(e) = result {
            log::warn!("Failed to persist attachment '{}': {}", attachment.name, e);
        }
    }
}

impl ReportSink for ConsoleReporter {
    fn log(&self, level: Level, message: &str) {
        log::log!(target: "harness", level.log_level(), "{}", message);

        let line = format!("{} {}", level.emoji(), message);
        match level {
            Level::Debug | Level::Element if !self.verbose => {}
            Level::Debug | Level::Element => println!("  {}", line.dimmed()),
            Level::Pass => println!("  {}", line.green()),
            Level::Fail | Level::Error => eprintln!("  {}", line.red()),
            Level::Warn => println!("  {}", line.yellow()),
            Level::Scenario => println!("{}", line.bold()),
            _ => println!("  {}", line),
        }
    }

    fn attach(&self, attachment: Attachment) {
        self.persist(&attachment);
        let mut attachments = self.attachments.lock().unwrap_or_else(|e| e.into_inner());
        attachments.push(attachment);
    }

    fn drain_attachments(&self) -> Vec<Attachment> {
        let mut attachments = self.attachments.lock().unwrap_or_else(|e| e.into_inner());
        std::mem::take(&mut *attachments)
    }
}

/// Records everything in memory
#[derive(Default)]
pub struct MemoryReporter {
    entries: Mutex<Vec<(Level, String)>>,
    attachments: Mutex<Vec<Attachment>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<(Level, String)> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Messages logged at `level`
    pub fn messages(&self, level: Level) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m)
            .collect()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.entries().iter().any(|(_, m)| m.contains(needle))
    }
}

impl ReportSink for MemoryReporter {
    fn log(&self, level: Level, message: &str) {
        log::log!(target: "harness", level.log_level(), "{}", message);
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((level, message.to_string()));
    }

    fn attach(&self, attachment: Attachment) {
        self.attachments
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(attachment);
    }

    fn drain_attachments(&self) -> Vec<Attachment> {
        let mut attachments = self.attachments.lock().unwrap_or_else(|e| e.into_inner());
        std::mem::take(&mut *attachments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_error_with_cause_attaches_details() {
        let reporter = MemoryReporter::new();
        let err = Err::<(), _>(anyhow::anyhow!("connection refused"))
            .context("open session")
            .unwrap_err();

        reporter.error_with_cause("Failed to initialize driver", &err);

        let errors = reporter.messages(Level::Error);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("connection refused"));

        let attachments = reporter.drain_attachments();
        assert_eq!(attachments.len(), 1);
        assert_eq!(attachments[0].name, "Exception Details");
        let body = String::from_utf8(attachments[0].data.clone()).unwrap();
        assert!(body.contains("0: open session"));
        assert!(body.contains("1: connection refused"));
        assert!(body.contains("Infrastructure"));
        assert!(reporter.drain_attachments().is_empty());
    }

    #[test]
    fn test_suite_banners() {
        let reporter = MemoryReporter::new();
        reporter.suite_start("Android E2E");
        reporter.suite_end("Android E2E", 3, 1);
        assert!(reporter.contains("TEST SUITE STARTED: Android E2E"));
        assert!(reporter.contains("3 passed, 1 failed"));
    }

    #[test]
    fn test_console_reporter_persists_attachments() {
        let dir = std::env::temp_dir().join(format!("harness_report_{}", uuid::Uuid::new_v4()));
        let reporter = ConsoleReporter::new(false).with_output_dir(dir.clone());
        reporter.attach(Attachment::text("Error Details", "boom"));

        let files: Vec<_> = std::fs::read_dir(dir.join("attachments"))
            .unwrap()
            .filter_map(|e| e.ok())
            .collect();
        assert_eq!(files.len(), 1);
        assert_eq!(reporter.drain_attachments().len(), 1);
        let _ = std::fs::remove_dir_all(dir);
    }
}
