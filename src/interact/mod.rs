pub mod locator;
pub mod sweeper;
pub mod text_entry;

pub use locator::{probe, resolve, Probe, Resolution};
pub use sweeper::{AnrOutcome, SweepPlan, SweepReport};
pub use text_entry::{enter_text_with_verification, EntryOutcome, EntryTier, TextEntry};
