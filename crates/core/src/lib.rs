//! Bakery core data models.
//!
//! This crate defines the vocabulary shared by the check engine: the status
//! scale, messages and events, invocation identities, captured results and
//! the dynamic values passed between declarations.

#![warn(missing_docs)]

// Core identities
mod id;
mod identity;

// Outcomes
mod status;
mod message;
mod result;

// Values
mod value;

// Re-exports
pub use id::*;
pub use identity::{Bindings, Identity};
pub use status::{ParseStatusError, Status, StatusCounter};
pub use message::{Event, EventMessage, Message};
pub use result::{CheckMeta, CheckResult};
pub use value::Value;

/// Timestamp type
pub type Time = chrono::DateTime<chrono::Utc>;
