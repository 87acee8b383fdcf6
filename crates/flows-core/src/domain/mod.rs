//! Domain error types shared by every flow.

pub mod error;

pub use error::{FlowError, Result};
