//! Clears permission prompts, check-in dialogs and ANR dialogs that can pop
//! up over the app at any time.

use crate::driver::common::settle;
use crate::driver::traits::{AutomationSession, Locator};
use crate::interact::locator::{is_element_present, probe, wait_for, Probe};
use crate::report::sink::{Level, ReportSink};
use std::time::Duration;

pub const PERMISSION_ALLOW: &str = "com.android.permissioncontroller:id/permission_allow_button";
pub const PERMISSION_DENY: &str = "com.android.permissioncontroller:id/permission_deny_button";
pub const ANR_TITLE: &str = "android:id/alertTitle";
pub const ANR_WAIT: &str = "android:id/aerr_wait";
pub const ANR_CLOSE: &str = "android:id/aerr_close";

const FORCE_PROBE_TIMEOUT: Duration = Duration::from_secs(1);
const FORCE_SETTLE: Duration = Duration::from_millis(500);
const ANR_PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const ANR_BUTTON_TIMEOUT: Duration = Duration::from_secs(2);
const ANR_SETTLE: Duration = Duration::from_secs(2);

fn check_in_cancel(app_package: &str) -> String {
    format!("{}:id/buttonCancelAutomaticCheckIn", app_package)
}

/// A dialog button to click when it shows up
#[derive(Debug, Clone)]
pub struct DialogRule {
    pub name: String,
    pub locator: Locator,
    /// How long to wait for it on each pass
    pub probe_timeout: Duration,
}

impl DialogRule {
    pub fn new(name: impl Into<String>, locator: Locator, probe_timeout: Duration) -> Self {
        Self {
            name: name.into(),
            locator,
            probe_timeout,
        }
    }
}

/// Prioritized rules and a pass limit
#[derive(Debug, Clone)]
pub struct SweepPlan {
    pub name: String,
    pub rules: Vec<DialogRule>,
    pub max_iterations: usize,
    /// Pause before each pass, for dialogs that animate in late
    pub pause_before_pass: Option<Duration>,
}

impl SweepPlan {
    /// Notifications that can appear at any point
    pub fn general(app_package: &str) -> Self {
        Self {
            name: "general notifications".to_string(),
            rules: vec![
                DialogRule::new("permission allow", Locator::id(PERMISSION_ALLOW), Duration::from_secs(10)),
                DialogRule::new(
                    "automatic check-in cancel",
                    Locator::id(check_in_cancel(app_package)),
                    Duration::from_secs(20),
                ),
            ],
            max_iterations: 3,
            pause_before_pass: None,
        }
    }

    /// Dialogs that pile up right after logging in
    pub fn post_login(app_package: &str) -> Self {
        Self {
            name: "post-login notifications".to_string(),
            rules: vec![
                DialogRule::new("permission allow", Locator::id(PERMISSION_ALLOW), Duration::from_secs(30)),
                DialogRule::new(
                    "automatic check-in cancel",
                    Locator::id(check_in_cancel(app_package)),
                    Duration::from_secs(30),
                ),
                DialogRule::new("OK", Locator::id("android:id/button1"), Duration::from_secs(2)),
            ],
            max_iterations: 5,
            pause_before_pass: Some(Duration::from_secs(1)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Passes run
    pub iterations: usize,
    /// Names of dismissed rules, in order
    pub dismissed: Vec<String>,
}

/// Run the plan: each pass dismisses the first present rule; a pass that
/// finds nothing ends the sweep. A failed dismissal uses up its pass.
pub async fn sweep(
    session: &dyn AutomationSession,
    reporter: &dyn ReportSink,
    plan: &SweepPlan,
) -> SweepReport {
    let mut report = SweepReport::default();
    let mut cleared = false;

    while report.iterations < plan.max_iterations {
        report.iterations += 1;
        if let Some(pause) = plan.pause_before_pass {
            settle(pause, "dialog animation").await;
        }

        let mut present = None;
        for rule in &plan.rules {
            if let Some(element) = wait_for(session, &rule.locator, rule.probe_timeout).await {
                present = Some((rule, element));
                break;
            }
        }

        let Some((rule, element)) = present else {
            reporter.debug(&format!(
                "No {} present (pass {})",
                plan.name, report.iterations
            ));
            cleared = true;
            break;
        };

        match session.click(&element).await {
            Ok(()) => {
                reporter.log(Level::Element, &format!("Dismissed {}", rule.name));
                report.dismissed.push(rule.name.clone());
            }
            Err(e) => reporter.debug(&format!("Could not dismiss {}: {:#}", rule.name, e)),
        }
    }

    if !cleared {
        reporter.debug(&format!(
            "Stopped {} sweep after {} passes",
            plan.name, plan.max_iterations
        ));
    }
    report
}

/// Generic dialog buttons, in the order they are tried
pub fn force_dismiss_locators(app_package: &str) -> Vec<Locator> {
    vec![
        Locator::id("android:id/button1"),
        Locator::id("android:id/button2"),
        Locator::id("android:id/button3"),
        Locator::id(PERMISSION_ALLOW),
        Locator::id(PERMISSION_DENY),
        Locator::id(check_in_cancel(app_package)),
        Locator::id(format!("{}:id/core_dlg_positive_button", app_package)),
        Locator::id(format!("{}:id/core_dlg_negative_button", app_package)),
    ]
}

/// Click every generic dialog button that is showing. Returns how many were clicked.
pub async fn force_dismiss_dialogs(
    session: &dyn AutomationSession,
    reporter: &dyn ReportSink,
    app_package: &str,
) -> usize {
    let mut count = 0;
    for locator in force_dismiss_locators(app_package) {
        let Some(element) = wait_for(session, &locator, FORCE_PROBE_TIMEOUT).await else {
            continue;
        };
        if session.click(&element).await.is_ok() {
            reporter.debug(&format!("Force-dismissed {}", locator.value));
            count += 1;
            settle(FORCE_SETTLE, "dialog dismissal").await;
        }
    }
    if count > 0 {
        reporter.info(&format!("Force-dismissed {} dialog(s)", count));
    }
    count
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnrOutcome {
    NotPresent,
    /// Clicked "Wait"
    Waited,
    /// Clicked "Close app"
    Closed,
    /// Dialog showing but neither button could be used
    Unhandled,
}

/// Answer an "App isn't responding" dialog, preferring to wait
pub async fn handle_anr(session: &dyn AutomationSession, reporter: &dyn ReportSink) -> AnrOutcome {
    if !is_element_present(session, &Locator::id(ANR_TITLE), ANR_PROBE_TIMEOUT).await {
        return AnrOutcome::NotPresent;
    }
    reporter.warn("ANR dialog detected");

    for (button, outcome) in [(ANR_WAIT, AnrOutcome::Waited), (ANR_CLOSE, AnrOutcome::Closed)] {
        let locator = Locator::id(button);
        let Some(element) = wait_for(session, &locator, ANR_BUTTON_TIMEOUT).await else {
            continue;
        };
        match session.click(&element).await {
            Ok(()) => {
                reporter.info(&format!("ANR dialog answered with {}", button));
                settle(ANR_SETTLE, "ANR dismissal").await;
                return outcome;
            }
            Err(e) => reporter.debug(&format!("Could not click {}: {:#}", button, e)),
        }
    }

    reporter.error("ANR dialog could not be dismissed");
    AnrOutcome::Unhandled
}

/// Single-shot check used by callers that only want to know
pub async fn is_anr_showing(session: &dyn AutomationSession) -> bool {
    matches!(probe(session, &Locator::id(ANR_TITLE)).await, Probe::Found(_))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::fake::{Fake, FakeElement};
    use crate::report::sink::MemoryReporter;

    const PKG: &str = "com.example.app";

    #[tokio::test(start_paused = true)]
    async fn test_clean_pass_ends_early() {
        let fake = Fake::new();
        fake.add_element(&Locator::id(PERMISSION_ALLOW), FakeElement::dialog());
        let session = fake.session();
        let reporter = MemoryReporter::new();

        let report = sweep(&session, &reporter, &SweepPlan::general(PKG)).await;
        assert_eq!(report.iterations, 2);
        assert_eq!(report.dismissed, vec!["permission allow".to_string()]);
        assert!(fake.element(&Locator::id(PERMISSION_ALLOW)).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stubborn_dialog_is_bounded() {
        let fake = Fake::new();
        // stays on screen after every click
        fake.add_element(&Locator::id(check_in_cancel(PKG)), FakeElement::default());
        let session = fake.session();
        let reporter = MemoryReporter::new();

        let plan = SweepPlan::post_login(PKG);
        let report = sweep(&session, &reporter, &plan).await;
        assert_eq!(report.iterations, plan.max_iterations);
        assert_eq!(report.dismissed.len(), 5);
        assert_eq!(fake.count("click:"), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_click_keeps_sweeping() {
        let fake = Fake::new();
        let allow = Locator::id(PERMISSION_ALLOW);
        fake.add_element(&allow, FakeElement::dialog());
        fake.with(|s| {
            s.failing_clicks.insert(allow.to_string());
        });
        let session = fake.session();
        let reporter = MemoryReporter::new();

        let plan = SweepPlan::general(PKG);
        let report = sweep(&session, &reporter, &plan).await;
        assert_eq!(report.iterations, plan.max_iterations);
        assert!(report.dismissed.is_empty());
        assert_eq!(fake.count("click:"), plan.max_iterations);
        assert!(reporter.contains("Could not dismiss permission allow"));
        assert!(fake.element(&allow).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_nothing_to_sweep() {
        let fake = Fake::new();
        let session = fake.session();
        let reporter = MemoryReporter::new();

        let report = sweep(&session, &reporter, &SweepPlan::general(PKG)).await;
        assert_eq!(report, SweepReport { iterations: 1, dismissed: vec![] });
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_dismiss_counts_clicks() {
        let fake = Fake::new();
        fake.add_element(&Locator::id("android:id/button2"), FakeElement::dialog());
        fake.add_element(
            &Locator::id(format!("{}:id/core_dlg_positive_button", PKG)),
            FakeElement::dialog(),
        );
        let session = fake.session();
        let reporter = MemoryReporter::new();

        assert_eq!(force_dismiss_dialogs(&session, &reporter, PKG).await, 2);
        assert_eq!(force_dismiss_dialogs(&session, &reporter, PKG).await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_anr_prefers_wait() {
        let fake = Fake::new();
        fake.add_element(&Locator::id(ANR_TITLE), FakeElement::default());
        fake.add_element(&Locator::id(ANR_WAIT), FakeElement::dialog());
        fake.add_element(&Locator::id(ANR_CLOSE), FakeElement::dialog());
        let session = fake.session();
        let reporter = MemoryReporter::new();

        assert!(is_anr_showing(&session).await);
        assert_eq!(handle_anr(&session, &reporter).await, AnrOutcome::Waited);
        assert!(fake.element(&Locator::id(ANR_CLOSE)).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_anr_outcomes() {
        let fake = Fake::new();
        let session = fake.session();
        let reporter = MemoryReporter::new();
        assert_eq!(handle_anr(&session, &reporter).await, AnrOutcome::NotPresent);

        fake.add_element(&Locator::id(ANR_TITLE), FakeElement::default());
        assert_eq!(handle_anr(&session, &reporter).await, AnrOutcome::Unhandled);

        fake.add_element(&Locator::id(ANR_CLOSE), FakeElement::dialog());
        assert_eq!(handle_anr(&session, &reporter).await, AnrOutcome::Closed);
    }
}
