//! Fatal run errors and per-identity faults.

use bakery_core::{Event, Status};
use bakery_profile::{ConfigError, SetupError};
use std::any::Any;

/// Errors that stop a run before any identity executes.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// The profile is malformed
    #[error(transparent)]
    Setup(#[from] SetupError),

    /// The configuration could not be loaded
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A supplied value failed its validator
    #[error("Value \"{name}\" is invalid: {reason}")]
    Validation {
        /// Expected value name
        name: String,
        /// Validator message
        reason: String,
    },

    /// An iterarg collection is not a list
    #[error("Value \"{0}\" must be a list to be iterated over")]
    NotAList(String),
}

/// Recoverable faults: each turns exactly one identity into an ERROR.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Fault {
    /// A condition body failed
    #[error("The condition {name} had an error: {detail}")]
    FailedCondition {
        /// Condition name
        name: String,
        /// Error chain
        detail: String,
    },

    /// A check body returned an error
    #[error("{check} had an error: {detail}")]
    FailedCheck {
        /// Check id
        check: String,
        /// Error chain
        detail: String,
    },

    /// A check body panicked
    #[error("{check} had an error: panicked: {detail}")]
    Panicked {
        /// Check id
        check: String,
        /// Panic payload
        detail: String,
    },

    /// A parameter could not be resolved
    #[error("Value \"{0}\" is undefined")]
    MissingValue(String),

    /// An iterarg element failed its item validator
    #[error("Value \"{name}\" at index {index} is invalid: {reason}")]
    InvalidItem {
        /// Expected value name
        name: String,
        /// Element index
        index: usize,
        /// Validator message
        reason: String,
    },

    /// The identity exceeded its time budget
    #[error("{check} exceeded its time budget of {budget:?}")]
    TimedOut {
        /// Check id
        check: String,
        /// Time budget per identity
        budget: std::time::Duration,
    },

    /// The run was stopped while the identity was in flight
    #[error("cancelled")]
    Cancelled,
}

impl Fault {
    /// Message code reported for this fault.
    pub fn code(&self) -> &'static str {
        match self {
            Fault::FailedCondition { .. } => "failed-condition",
            Fault::FailedCheck { .. } | Fault::Panicked { .. } => "failed-check",
            Fault::MissingValue(_) => "missing-value",
            Fault::InvalidItem { .. } => "invalid-value",
            Fault::TimedOut { .. } => "timed-out",
            Fault::Cancelled => "cancelled",
        }
    }

    /// The ERROR event reporting this fault.
    pub fn to_event(&self) -> Event {
        Event::coded(Status::Error, self.code(), self.to_string())
    }
}

/// Text of a panic payload.
pub fn panic_detail(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fault_events() {
        let fault = Fault::FailedCondition {
            name: "is_ttf".into(),
            detail: "bad header".into(),
        };
        let event = fault.to_event();
        assert_eq!(event.status, Status::Error);
        assert_eq!(event.message.code(), Some("failed-condition"));
        assert_eq!(event.message.text(), "The condition is_ttf had an error: bad header");

        let fault = Fault::FailedCheck {
            check: "file_size".into(),
            detail: "boom".into(),
        };
        assert_eq!(fault.to_string(), "file_size had an error: boom");
        assert_eq!(Fault::Cancelled.to_event().message.code(), Some("cancelled"));
    }

    #[test]
    fn test_panic_detail() {
        let payload: Box<dyn Any + Send> = Box::new("bad table");
        assert_eq!(panic_detail(payload.as_ref()), "bad table");
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_detail(payload.as_ref()), "owned");
        let payload: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_detail(payload.as_ref()), "unknown panic");
    }

    #[test]
    fn test_setup_errors_convert() {
        let err: RunnerError = SetupError::UnknownCheck("x".into()).into();
        assert_eq!(err.to_string(), "Unknown check: x");
    }
}
