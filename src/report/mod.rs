pub mod json;
pub mod junit;
pub mod sink;
pub mod types;

use anyhow::{Context, Result};
use std::path::Path;

pub use sink::{Attachment, ConsoleReporter, Level, MemoryReporter, ReportSink};
pub use types::SuiteResults;

/// Write every report format into `output_dir`
pub fn write_reports(results: &SuiteResults, output_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;
    json::write_report(results, output_dir)?;
    junit::write_report(results, output_dir)?;
    Ok(())
}

/// Generate report from a saved `results.json`
pub fn generate_report(results_path: &Path, format: &str, output_dir: &Path) -> Result<()> {
    let results = json::read_results(results_path)?;
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;

    match format {
        "junit" => junit::write_report(&results, output_dir),
        "json" => json::write_report(&results, output_dir),
        "all" => write_reports(&results, output_dir),
        _ => anyhow::bail!("Unknown format: {}", format),
    }
}
