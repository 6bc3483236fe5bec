pub mod appium;
pub mod common;
pub mod hierarchy;
pub mod traits;

#[cfg(test)]
pub mod fake;

pub use traits::{AppState, AutomationSession, ElementId, Locator, LocatorSet, SessionFactory, Strategy};
