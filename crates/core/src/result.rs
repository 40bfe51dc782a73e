//! Captured output of one check invocation.

use crate::{Event, Identity, Status};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Descriptive metadata of a check, carried into its results for reporting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckMeta {
    /// Stable check id
    pub id: String,

    /// One line description
    pub description: String,

    /// Long form documentation
    pub documentation: Option<String>,

    /// Why the check exists
    pub rationale: Option<String>,

    /// Severity hint for report ordering
    pub severity: Option<u8>,

    /// Links to the original requests
    pub proposal: Vec<String>,

    /// Whether the check is experimental
    pub experimental: bool,
}

/// The result of one identity: its events and their summary.
///
/// Created when execution of the identity begins, appended to while the
/// check runs, and sealed once the check's output is exhausted or a fault
/// was caught. Sealing computes `summary_status`.
#[derive(Debug, Clone)]
pub struct CheckResult {
    /// The invocation this result belongs to
    pub identity: Identity,

    /// Check metadata
    pub meta: Arc<CheckMeta>,

    /// Ordered events
    pub events: Vec<Event>,

    summary_status: Option<Status>,
}

impl CheckResult {
    /// Begin a result for `identity`.
    pub fn new(identity: Identity, meta: Arc<CheckMeta>) -> Self {
        Self {
            identity,
            meta,
            events: Vec::new(),
            summary_status: None,
        }
    }

    /// Append an event. Ignored once the result is sealed.
    pub fn push(&mut self, event: Event) {
        if self.summary_status.is_none() {
            self.events.push(event);
        }
    }

    /// Record the summary status and stop accepting events.
    pub fn seal(&mut self, summary: Status) {
        self.summary_status = Some(summary);
    }

    /// Whether the result has been sealed.
    pub fn is_sealed(&self) -> bool {
        self.summary_status.is_some()
    }

    /// Summary status; an unsealed result reads as ERROR.
    pub fn summary_status(&self) -> Status {
        self.summary_status.unwrap_or(Status::Error)
    }

    /// Serializable data for report renderers.
    pub fn get_data(&self) -> serde_json::Value {
        serde_json::json!({
            "key": self.identity.key(),
            "description": self.meta.description,
            "documentation": self.meta.documentation,
            "rationale": self.meta.rationale,
            "severity": self.meta.severity,
            "proposal": self.meta.proposal,
            "experimental": self.meta.experimental,
            "result": self.summary_status().name(),
            "logs": self.events.iter().map(Event::get_data).collect::<Vec<_>>(),
        })
    }
}
