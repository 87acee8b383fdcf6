//! Turn coordination: who speaks next, what gets forwarded, when the
//! session is complete.

pub mod approval;
pub mod error;
pub mod log;
pub mod machine;

pub use approval::ApprovalPolicy;
pub use error::CoordinatorError;
pub use log::{LogEntry, SessionLog, TurnMessage};
pub use machine::{CoordinatorState, Directive, TurnCoordinator};
