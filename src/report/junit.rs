use super::types::SuiteResults;
use crate::error::FailureKind;
use crate::runner::state::{ScenarioReport, ScenarioStatus};
use anyhow::Result;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::Cursor;
use std::path::Path;

fn seconds(ms: Option<u64>) -> String {
    (ms.unwrap_or(0) as f64 / 1000.0).to_string()
}

/// Generate JUnit XML report string from SuiteResults
pub fn generate_junit_xml(results: &SuiteResults) -> Result<String> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let summary = &results.summary;
    let tests = summary.total.to_string();
    let failures = (summary.failed - summary.infrastructure_failures).to_string();
    let errors = summary.infrastructure_failures.to_string();
    let skipped = summary.skipped.to_string();
    let time = seconds(summary.total_duration_ms);

    let mut suites_start = BytesStart::new("testsuites");
    suites_start.push_attribute(("name", "appium-harness-run"));
    suites_start.push_attribute(("tests", tests.as_str()));
    suites_start.push_attribute(("failures", failures.as_str()));
    suites_start.push_attribute(("errors", errors.as_str()));
    suites_start.push_attribute(("skipped", skipped.as_str()));
    suites_start.push_attribute(("time", time.as_str()));
    writer.write_event(Event::Start(suites_start))?;

    let mut suite_start = BytesStart::new("testsuite");
    suite_start.push_attribute(("name", results.suite_name.as_str()));
    suite_start.push_attribute(("id", results.run_id.as_str()));
    suite_start.push_attribute(("tests", tests.as_str()));
    suite_start.push_attribute(("failures", failures.as_str()));
    suite_start.push_attribute(("errors", errors.as_str()));
    suite_start.push_attribute(("skipped", skipped.as_str()));
    suite_start.push_attribute(("time", time.as_str()));
    suite_start.push_attribute(("timestamp", results.generated_at.as_str()));
    writer.write_event(Event::Start(suite_start))?;

    for scenario in &results.scenarios {
        write_test_case(&mut writer, &results.suite_name, scenario)?;
    }

    writer.write_event(Event::End(BytesEnd::new("testsuite")))?;
    writer.write_event(Event::End(BytesEnd::new("testsuites")))?;

    let xml = String::from_utf8(writer.into_inner().into_inner())?;
    Ok(xml)
}

fn write_test_case<W: std::io::Write>(
    writer: &mut Writer<W>,
    suite_name: &str,
    scenario: &ScenarioReport,
) -> Result<()> {
    let mut case_start = BytesStart::new("testcase");
    case_start.push_attribute(("name", scenario.name.as_str()));
    case_start.push_attribute(("classname", suite_name));
    case_start.push_attribute(("time", seconds(scenario.duration_ms).as_str()));
    writer.write_event(Event::Start(case_start))?;

    match &scenario.status {
        ScenarioStatus::Failed { kind, message } => {
            // JUnit: <failure> for assertions, <error> for everything else
            let (element, error_type) = match kind {
                FailureKind::Assertion => ("failure", "AssertionError"),
                FailureKind::Infrastructure => ("error", "InfrastructureError"),
            };
            let first_line = message.lines().next().unwrap_or_default();
            let mut start = BytesStart::new(element);
            start.push_attribute(("message", first_line));
            start.push_attribute(("type", error_type));
            writer.write_event(Event::Start(start))?;
            writer.write_event(Event::Text(BytesText::new(message)))?;
            writer.write_event(Event::End(BytesEnd::new(element)))?;
        }
        ScenarioStatus::Skipped { reason } => {
            let mut start = BytesStart::new("skipped");
            start.push_attribute(("message", reason.as_str()));
            writer.write_event(Event::Empty(start))?;
        }
        _ => {}
    }

    if let Some(path) = &scenario.screenshot_path {
        writer.write_event(Event::Start(BytesStart::new("system-out")))?;
        writer.write_event(Event::Text(BytesText::new(&format!(
            "[[ATTACHMENT|{}]]",
            path
        ))))?;
        writer.write_event(Event::End(BytesEnd::new("system-out")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("testcase")))?;
    Ok(())
}

/// Write `junit.xml` into the output directory
pub fn write_report(results: &SuiteResults, output_dir: &Path) -> Result<()> {
    let xml = generate_junit_xml(results)?;
    let path = output_dir.join("junit.xml");
    std::fs::write(&path, xml)?;
    println!("    Generated JUnit report: {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::state::SuiteSummary;

    fn scenario(name: &str, status: ScenarioStatus, screenshot: Option<&str>) -> ScenarioReport {
        ScenarioReport {
            name: name.to_string(),
            tags: vec!["@smoke".to_string()],
            status,
            duration_ms: Some(1500),
            screenshot_path: screenshot.map(str::to_string),
            attachments: vec![],
        }
    }

    #[test]
    fn test_generate_junit_xml() {
        let scenarios = vec![
            scenario("Login works", ScenarioStatus::Passed, Some("shots/Passed_Login_works.png")),
            scenario(
                "Title shown",
                ScenarioStatus::Failed {
                    kind: FailureKind::Assertion,
                    message: "Assertion failed: title <Home>".to_string(),
                },
                None,
            ),
            scenario(
                "Settings open",
                ScenarioStatus::Failed {
                    kind: FailureKind::Infrastructure,
                    message: "Failed to initialize driver: refused".to_string(),
                },
                None,
            ),
            scenario(
                "Logout",
                ScenarioStatus::Skipped {
                    reason: "setup failed".to_string(),
                },
                None,
            ),
        ];
        let summary = SuiteSummary::from_reports(&scenarios, Some(6000));
        let results = SuiteResults {
            run_id: "run-1".to_string(),
            suite_name: "Android E2E".to_string(),
            scenarios,
            summary,
            generated_at: "2024-01-01T12:00:00".to_string(),
        };

        let xml = generate_junit_xml(&results).unwrap();

        assert!(xml.contains(r#"<testsuites name="appium-harness-run""#));
        assert!(xml.contains(r#"tests="4""#));
        assert!(xml.contains(r#"failures="1""#));
        assert!(xml.contains(r#"errors="1""#));
        assert!(xml.contains(r#"<testcase name="Login works""#));
        assert!(xml.contains(r#"type="AssertionError""#));
        assert!(xml.contains("title &lt;Home&gt;"));
        assert!(xml.contains(r#"<error message="Failed to initialize driver: refused""#));
        assert!(xml.contains(r#"<skipped message="setup failed"/>"#));
        assert!(xml.contains("[[ATTACHMENT|shots/Passed_Login_works.png]]"));
    }
}
