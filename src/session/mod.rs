pub mod lifecycle;
pub mod recovery;
pub mod registry;
pub mod screenshot;

pub use lifecycle::{DriverManager, DriverOutcome, RestartOutcome};
pub use registry::{DriverPhase, Endpoint, SessionRegistry};
