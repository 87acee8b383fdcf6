//! Participant roles for a reviewed group chat.
//!
//! # Module layout
//!
//! - [`registry`]: `RoleId`, `RoleKind`, `Role`, `RoleRegistry`
//! - [`error`]: `RoleError`, `RoleResult`

pub mod error;
pub mod registry;

pub use error::{RoleError, RoleResult};
pub use registry::{Role, RoleId, RoleKind, RoleRegistry};
