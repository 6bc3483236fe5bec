pub mod driver;
pub mod error;
pub mod interact;
pub mod report;
pub mod runner;
pub mod session;
pub mod utils;

// Re-export common items
pub use error::{assert_condition, FailureKind, HarnessError};
pub use report::generate_report;
pub use runner::{run_suite, HarnessContext, Scenario};
