//! The status scale checks report on.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Outcome severity of a single check event or a whole check.
///
/// The derived ordering is the severity order:
/// `DEBUG < PASS < SKIP < INFO < WARN < FAIL < FATAL < ERROR`.
/// A check must report at least one status at or above [`Status::Pass`];
/// [`Status::Error`] is reserved for faults the engine detects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    /// Silent by default; never a valid check outcome on its own
    Debug,
    /// The checked property is fine
    Pass,
    /// The check did not apply
    Skip,
    /// Informational observation
    Info,
    /// Might be a problem
    Warn,
    /// A problem was found
    Fail,
    /// A severe problem that must be addressed immediately
    Fatal,
    /// Something a programmer must fix
    Error,
}

impl Status {
    /// All statuses, lowest first.
    pub const ALL: [Status; 8] = [
        Status::Debug,
        Status::Pass,
        Status::Skip,
        Status::Info,
        Status::Warn,
        Status::Fail,
        Status::Fatal,
        Status::Error,
    ];

    /// Canonical upper-case name.
    pub fn name(self) -> &'static str {
        match self {
            Status::Debug => "DEBUG",
            Status::Pass => "PASS",
            Status::Skip => "SKIP",
            Status::Info => "INFO",
            Status::Warn => "WARN",
            Status::Fail => "FAIL",
            Status::Fatal => "FATAL",
            Status::Error => "ERROR",
        }
    }

    /// Numeric weight, kept compatible with existing report consumers.
    pub fn weight(self) -> u8 {
        self as u8
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when a status name is not on the scale.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown status: {0}")]
pub struct ParseStatusError(pub String);

impl std::str::FromStr for Status {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Status::ALL
            .into_iter()
            .find(|status| status.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseStatusError(s.to_string()))
    }
}

/// Tally of statuses, e.g. the summary of one section or a whole run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounter {
    counts: BTreeMap<Status, usize>,
}

impl StatusCounter {
    /// Create an empty counter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one occurrence.
    pub fn add(&mut self, status: Status) {
        *self.counts.entry(status).or_default() += 1;
    }

    /// Merge another counter into this one.
    pub fn merge(&mut self, other: &StatusCounter) {
        for (status, count) in &other.counts {
            *self.counts.entry(*status).or_default() += count;
        }
    }

    /// Occurrences of `status`.
    pub fn get(&self, status: Status) -> usize {
        self.counts.get(&status).copied().unwrap_or(0)
    }

    /// Total number of counted items.
    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    /// The most severe status counted, if any.
    pub fn worst(&self) -> Option<Status> {
        self.counts.keys().next_back().copied()
    }

    /// Iterate `(status, count)` pairs, lowest status first.
    pub fn iter(&self) -> impl Iterator<Item = (Status, usize)> + '_ {
        self.counts.iter().map(|(status, count)| (*status, *count))
    }
}
