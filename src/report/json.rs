use super::types::SuiteResults;
use anyhow::{Context, Result};
use std::path::Path;

/// Write `results.json` into the output directory
pub fn write_report(results: &SuiteResults, output_dir: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(results)?;
    let path = output_dir.join("results.json");
    std::fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    println!("    Generated JSON report: {}", path.display());
    Ok(())
}

/// Load previously written results
pub fn read_results(path: &Path) -> Result<SuiteResults> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read results from {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Invalid results file {}", path.display()))
}
