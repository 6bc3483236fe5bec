//! Text entry that survives flaky input methods.
//!
//! Each tier is only tried when the previous one could not be verified. A
//! field that never confirms the text is reported, not raised.

use crate::driver::common::{escape_for_android_shell, settle};
use crate::driver::traits::{AutomationSession, ElementId, LocatorSet, KEYCODE_DEL};
use crate::interact::locator::{self, resolve};
use crate::report::sink::{Level, ReportSink};
use crate::utils::config::Config;
use anyhow::{Context, Result};
use std::fmt;

/// Backspaces sent by the delete-and-type tier
const DELETE_PRESSES: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryTier {
    /// Click, clear, send keys
    ClearAndType,
    /// Click, backspace repeatedly, send keys
    DeleteAndType,
    /// `mobile: type` into the focused field
    MobileType,
    /// `input` over adb shell
    ShellInput,
}

impl EntryTier {
    pub const ALL: [EntryTier; 4] = [
        EntryTier::ClearAndType,
        EntryTier::DeleteAndType,
        EntryTier::MobileType,
        EntryTier::ShellInput,
    ];
}

impl fmt::Display for EntryTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntryTier::ClearAndType => "clear and type",
            EntryTier::DeleteAndType => "delete and type",
            EntryTier::MobileType => "mobile type",
            EntryTier::ShellInput => "shell input",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryOutcome {
    /// The field confirmed the text after this tier
    Verified(EntryTier),
    /// No tier verified but the dependent control became enabled
    Speculative,
    Unverified,
}

impl EntryOutcome {
    pub fn is_verified(&self) -> bool {
        matches!(self, EntryOutcome::Verified(_))
    }
}

/// What to type and where
pub struct TextEntry<'a> {
    pub field: &'a LocatorSet,
    pub text: &'a str,
    /// Placeholder label of the field; read-back equal to it means nothing was typed
    pub field_label: &'a str,
    /// Control that only enables once the field has content
    pub confirm: Option<&'a LocatorSet>,
}

/// Type `entry.text` into the field, escalating through [`EntryTier::ALL`].
pub async fn enter_text_with_verification(
    session: &dyn AutomationSession,
    reporter: &dyn ReportSink,
    entry: &TextEntry<'_>,
    timing: &Config,
) -> EntryOutcome {
    for tier in EntryTier::ALL {
        // Re-resolve every tier; earlier attempts may have re-rendered the field.
        let Some(element) = resolve(session, entry.field, timing.default_timeout())
            .await
            .into_element()
        else {
            reporter.warn(&format!(
                "Field '{}' not found for {}",
                entry.field.name, tier
            ));
            continue;
        };

        match run_tier(session, &element, entry, tier, timing).await {
            Ok(true) => {
                reporter.log(
                    Level::Element,
                    &format!("Text entered into '{}' via {}", entry.field.name, tier),
                );
                return EntryOutcome::Verified(tier);
            }
            Ok(false) => reporter.debug(&format!(
                "{} did not verify for '{}'",
                tier, entry.field.name
            )),
            Err(e) => reporter.warn(&format!(
                "{} failed for '{}': {:#}",
                tier, entry.field.name, e
            )),
        }
    }

    if let Some(confirm) = entry.confirm {
        if is_enabled(session, confirm, timing).await {
            reporter.warn(&format!(
                "Could not verify text in '{}', but '{}' is enabled; assuming it was entered",
                entry.field.name, confirm.name
            ));
            return EntryOutcome::Speculative;
        }
    }

    reporter.warn(&format!(
        "Could not verify text in '{}' after {} tiers",
        entry.field.name,
        EntryTier::ALL.len()
    ));
    EntryOutcome::Unverified
}

async fn run_tier(
    session: &dyn AutomationSession,
    element: &ElementId,
    entry: &TextEntry<'_>,
    tier: EntryTier,
    timing: &Config,
) -> Result<bool> {
    session.click(element).await?;

    match tier {
        EntryTier::ClearAndType => {
            session.clear(element).await?;
            session.send_keys(element, entry.text).await?;
        }
        EntryTier::DeleteAndType => {
            for _ in 0..DELETE_PRESSES {
                session.press_keycode(KEYCODE_DEL).await?;
            }
            session.send_keys(element, entry.text).await?;
        }
        EntryTier::MobileType => {
            session.type_text(entry.text).await?;
        }
        EntryTier::ShellInput => {
            session
                .shell("input", &["keyevent", "KEYCODE_CTRL_LEFT", "KEYCODE_A"])
                .await
                .context("select all")?;
            session
                .shell("input", &["keyevent", "KEYCODE_DEL"])
                .await
                .context("delete selection")?;
            let escaped = escape_for_android_shell(entry.text);
            session
                .shell("input", &["text", escaped.as_str()])
                .await
                .context("input text")?;
        }
    }

    settle(timing.input_settle(), "text entry").await;

    match tier {
        EntryTier::ClearAndType => {
            Ok(text_matches(session, element, entry.text).await? || hint_gone(session, element).await?)
        }
        EntryTier::DeleteAndType => {
            if hint_gone(session, element).await? {
                return Ok(true);
            }
            let text = session.text(element).await?;
            Ok(!text.is_empty() && text != entry.field_label)
        }
        EntryTier::MobileType | EntryTier::ShellInput => hint_gone(session, element).await,
    }
}

async fn text_matches(session: &dyn AutomationSession, element: &ElementId, expected: &str) -> Result<bool> {
    if session.text(element).await? == expected {
        return Ok(true);
    }
    Ok(session.attribute(element, "text").await?.as_deref() == Some(expected))
}

/// The placeholder hint is no longer shown
async fn hint_gone(session: &dyn AutomationSession, element: &ElementId) -> Result<bool> {
    Ok(session.attribute(element, "showingHintText").await?.as_deref() == Some("false"))
}

async fn is_enabled(session: &dyn AutomationSession, set: &LocatorSet, timing: &Config) -> bool {
    let Some(element) = locator::resolve(session, set, timing.default_timeout())
        .await
        .into_element()
    else {
        return false;
    };
    session.is_enabled(&element).await.unwrap_or(false)
}
