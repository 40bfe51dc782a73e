//! Identities: the unique key of one concrete check invocation.

use serde::{Deserialize, Serialize};

/// Ordered `(iterarg singular name, element index)` pairs an invocation is
/// bound to. Empty for checks that run once for the whole collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Bindings(Vec<(String, usize)>);

impl Bindings {
    /// No bindings.
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// Build from pairs; pairs are kept sorted by iterarg name.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (String, usize)>) -> Self {
        let mut pairs: Vec<_> = pairs.into_iter().collect();
        pairs.sort();
        pairs.dedup_by(|a, b| a.0 == b.0);
        Self(pairs)
    }

    /// Index bound to `name`, if bound.
    pub fn get(&self, name: &str) -> Option<usize> {
        self.0
            .iter()
            .find(|(bound, _)| bound == name)
            .map(|(_, index)| *index)
    }

    /// Restrict to the names accepted by `keep`.
    pub fn restrict(&self, mut keep: impl FnMut(&str) -> bool) -> Self {
        Self(
            self.0
                .iter()
                .filter(|(name, _)| keep(name))
                .cloned()
                .collect(),
        )
    }

    /// Whether nothing is bound.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate bound pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> + '_ {
        self.0.iter().map(|(name, index)| (name.as_str(), *index))
    }

    /// Report representation: `[["font", 0], ...]`.
    pub fn get_data(&self) -> serde_json::Value {
        serde_json::Value::Array(
            self.0
                .iter()
                .map(|(name, index)| serde_json::json!([name, index]))
                .collect(),
        )
    }
}

impl std::fmt::Display for Bindings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|(name, index)| format!("{name}={index}"))
            .collect();
        write!(f, "({})", parts.join(", "))
    }
}

/// `{section, check, iterarg_bindings}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    /// Section name
    pub section: String,

    /// Check id
    pub check: String,

    /// Iterarg bindings
    pub bindings: Bindings,
}

impl Identity {
    /// Create an identity.
    pub fn new(section: impl Into<String>, check: impl Into<String>, bindings: Bindings) -> Self {
        Self {
            section: section.into(),
            check: check.into(),
            bindings,
        }
    }

    /// Report key: `[section_name, check_id, iterarg_bindings]`.
    pub fn key(&self) -> serde_json::Value {
        serde_json::json!([self.section, self.check, self.bindings.get_data()])
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}::{}{}", self.section, self.check, self.bindings)
    }
}
