//! Multi-strategy element resolution.
//!
//! Absence is a value here, not an error: [`Resolution::NotFound`],
//! [`Probe::Absent`] and `false` are the not-found results.

use crate::driver::common::{poll_until, Attempt, PollConfig, Polled};
use crate::driver::hierarchy;
use crate::driver::traits::{AutomationSession, ElementId, Locator, LocatorSet};
use anyhow::Result;
use std::time::Duration;

/// Single-shot lookup result
#[derive(Debug)]
pub enum Probe {
    Found(ElementId),
    Absent,
    /// The lookup itself failed (bad selector, dead session, ...)
    Failed(anyhow::Error),
}

impl Probe {
    pub fn is_found(&self) -> bool {
        matches!(self, Probe::Found(_))
    }
}

/// Why one locator of a set was rejected
#[derive(Debug, Clone)]
pub struct LocatorFailure {
    pub locator: Locator,
    pub reason: String,
}

#[derive(Debug)]
pub enum Resolution {
    Found {
        element: ElementId,
        /// Position of the winning locator in the set
        index: usize,
        locator: Locator,
    },
    NotFound { attempts: Vec<LocatorFailure> },
}

impl Resolution {
    pub fn element(&self) -> Option<&ElementId> {
        match self {
            Resolution::Found { element, .. } => Some(element),
            Resolution::NotFound { .. } => None,
        }
    }

    pub fn into_element(self) -> Option<ElementId> {
        match self {
            Resolution::Found { element, .. } => Some(element),
            Resolution::NotFound { .. } => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Resolution::Found { .. })
    }
}

/// Look the locator up once
pub async fn probe(session: &dyn AutomationSession, locator: &Locator) -> Probe {
    match session.find_element(locator).await {
        Ok(Some(element)) => Probe::Found(element),
        Ok(None) => Probe::Absent,
        Err(e) => Probe::Failed(e),
    }
}

/// Poll until the locator resolves to a displayed element.
///
/// Lookup or visibility errors reject the locator at once; absence and
/// invisibility are retried until `timeout`.
async fn wait_visible(
    session: &dyn AutomationSession,
    locator: &Locator,
    timeout: Duration,
) -> std::result::Result<ElementId, String> {
    let polled = poll_until(
        move || async move {
            match probe(session, locator).await {
                Probe::Found(element) => match session.is_displayed(&element).await {
                    Ok(true) => Attempt::Done(Ok(element)),
                    Ok(false) => Attempt::Retry("not displayed".to_string()),
                    Err(e) => Attempt::Done(Err(format!("visibility check failed: {:#}", e))),
                },
                Probe::Absent => Attempt::Retry("not found".to_string()),
                Probe::Failed(e) => Attempt::Done(Err(format!("lookup failed: {:#}", e))),
            }
        },
        &PollConfig::with_timeout(timeout),
    )
    .await;

    match polled {
        Polled::Ready(result) => result,
        Polled::TimedOut { last_reason, .. } => Err(format!(
            "timed out after {}ms ({})",
            timeout.as_millis(),
            last_reason.unwrap_or_else(|| "no check completed".to_string())
        )),
    }
}

/// Poll until the locator resolves, displayed or not. Lookup errors reject
/// at once.
async fn wait_present(
    session: &dyn AutomationSession,
    locator: &Locator,
    timeout: Duration,
) -> std::result::Result<ElementId, String> {
    let polled = poll_until(
        move || async move {
            match probe(session, locator).await {
                Probe::Found(element) => Attempt::Done(Ok(element)),
                Probe::Absent => Attempt::Retry("not found".to_string()),
                Probe::Failed(e) => Attempt::Done(Err(format!("lookup failed: {:#}", e))),
            }
        },
        &PollConfig::with_timeout(timeout),
    )
    .await;

    match polled {
        Polled::Ready(result) => result,
        Polled::TimedOut { .. } => Err(format!("not found within {}ms", timeout.as_millis())),
    }
}

/// Try each locator in order with `timeout` per locator; the first displayed
/// match wins and later locators are never tried.
pub async fn resolve(
    session: &dyn AutomationSession,
    set: &LocatorSet,
    timeout: Duration,
) -> Resolution {
    let mut attempts = Vec::new();

    for (index, locator) in set.locators.iter().enumerate() {
        match wait_visible(session, locator, timeout).await {
            Ok(element) => {
                log::debug!(
                    "Found '{}' with locator {}/{}: {}",
                    set.name,
                    index + 1,
                    set.len(),
                    locator
                );
                return Resolution::Found {
                    element,
                    index,
                    locator: locator.clone(),
                };
            }
            Err(reason) => {
                log::debug!("Locator {} for '{}' rejected: {}", locator, set.name, reason);
                attempts.push(LocatorFailure {
                    locator: locator.clone(),
                    reason,
                });
            }
        }
    }

    log::warn!(
        "Element '{}' not found with any of {} locator(s)",
        set.name,
        set.len()
    );
    if log::log_enabled!(log::Level::Debug) {
        log_screen_summary(session).await;
    }

    Resolution::NotFound { attempts }
}

async fn log_screen_summary(session: &dyn AutomationSession) {
    let source = match session.page_source().await {
        Ok(source) => source,
        Err(e) => {
            log::debug!("Could not read page source: {:#}", e);
            return;
        }
    };
    match hierarchy::parse_page_source(&source) {
        Ok(nodes) => log::debug!("Current screen: {}", hierarchy::summarize(&nodes, 15)),
        Err(e) => log::debug!("Could not parse page source: {:#}", e),
    }
}

/// True if the locator is in the hierarchy within `timeout`; visibility is
/// not checked
pub async fn is_element_present(
    session: &dyn AutomationSession,
    locator: &Locator,
    timeout: Duration,
) -> bool {
    wait_present(session, locator, timeout).await.is_ok()
}

/// True if any locator of the set is present
pub async fn any_present(
    session: &dyn AutomationSession,
    set: &LocatorSet,
    timeout: Duration,
) -> bool {
    for locator in &set.locators {
        if wait_present(session, locator, timeout).await.is_ok() {
            return true;
        }
    }
    false
}

/// Wait for a single locator; `None` if it never shows up
pub async fn wait_for(
    session: &dyn AutomationSession,
    locator: &Locator,
    timeout: Duration,
) -> Option<ElementId> {
    wait_visible(session, locator, timeout).await.ok()
}

/// Click the element if it can be resolved. Returns whether a click happened;
/// only a failing click is an error.
pub async fn click_when_present(
    session: &dyn AutomationSession,
    set: &LocatorSet,
    timeout: Duration,
) -> Result<bool> {
    match resolve(session, set, timeout).await.into_element() {
        Some(element) => {
            session.click(&element).await?;
            Ok(true)
        }
        None => Ok(false),
    }
}

/// Read the element text if it can be resolved
pub async fn text_when_present(
    session: &dyn AutomationSession,
    set: &LocatorSet,
    timeout: Duration,
) -> Result<Option<String>> {
    match resolve(session, set, timeout).await.into_element() {
        Some(element) => Ok(Some(session.text(&element).await?)),
        None => Ok(None),
    }
}
