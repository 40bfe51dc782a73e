//! Run configuration documents.

use bakery_core::Status;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Errors loading a configuration document.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A per-check section is not an object
    #[error("Configuration for check \"{0}\" must be an object")]
    NotAnObject(String),
}

/// Reclassification of one message code of one check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideRule {
    /// Message code to match
    pub code: String,

    /// Replacement status
    pub status: Status,

    /// Replacement text; the original text is kept when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl OverrideRule {
    /// Override `code` to `status`.
    pub fn new(code: impl Into<String>, status: Status) -> Self {
        Self {
            code: code.into(),
            status,
            message: None,
        }
    }

    /// Also replace the message text.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Per-check override rules, keyed by check id.
pub type Overrides = BTreeMap<String, Vec<OverrideRule>>;

/// A run configuration.
///
/// Keys other than the well known ones are per-check namespaces:
/// `{"file_size": {"WARN_SIZE": 1048576}}` configures the `file_size` check.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    /// Execution order tokens: iterarg names and `*check`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_order: Option<Vec<String>>,

    /// Only run checks whose id contains one of these
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explicit_checks: Option<Vec<String>>,

    /// Never run checks whose id contains one of these
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude_checks: Option<Vec<String>>,

    /// Formatting hint for reporters, passed through untouched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_lists: Option<serde_json::Value>,

    /// Status overrides
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub overrides: Overrides,

    /// Per-check namespaced keys
    #[serde(flatten)]
    pub checks: BTreeMap<String, serde_json::Value>,
}

impl Configuration {
    /// Parse a configuration from JSON text.
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: Configuration = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (check_id, section) in &self.checks {
            if !section.is_object() {
                return Err(ConfigError::NotAnObject(check_id.clone()));
            }
        }
        Ok(())
    }

    /// Overlay `other` on top of `self`: per-check keys are merged key by
    /// key, override lists are replaced per check, everything else is taken
    /// from `other` when set.
    pub fn overlay(&mut self, other: &Configuration) {
        if other.custom_order.is_some() {
            self.custom_order = other.custom_order.clone();
        }
        if other.explicit_checks.is_some() {
            self.explicit_checks = other.explicit_checks.clone();
        }
        if other.exclude_checks.is_some() {
            self.exclude_checks = other.exclude_checks.clone();
        }
        if other.full_lists.is_some() {
            self.full_lists = other.full_lists.clone();
        }
        for (check_id, rules) in &other.overrides {
            self.overrides.insert(check_id.clone(), rules.clone());
        }
        for (check_id, section) in &other.checks {
            match (self.checks.get_mut(check_id), section) {
                (Some(serde_json::Value::Object(mine)), serde_json::Value::Object(theirs)) => {
                    for (key, value) in theirs {
                        mine.insert(key.clone(), value.clone());
                    }
                }
                _ => {
                    self.checks.insert(check_id.clone(), section.clone());
                }
            }
        }
    }

    /// The configuration seen by one check.
    pub fn check_config(&self, check_id: &str) -> CheckConfig {
        let values = match self.checks.get(check_id) {
            Some(serde_json::Value::Object(map)) => map.clone(),
            _ => serde_json::Map::new(),
        };
        CheckConfig {
            check_id: check_id.to_string(),
            values,
            full_lists: self.full_lists.clone(),
        }
    }

    /// Keys configured for `check_id`.
    pub fn keys_for(&self, check_id: &str) -> Vec<String> {
        match self.checks.get(check_id) {
            Some(serde_json::Value::Object(map)) => map.keys().cloned().collect(),
            _ => Vec::new(),
        }
    }
}

/// Configuration namespace of a single check, handed to its body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CheckConfig {
    check_id: String,
    values: serde_json::Map<String, serde_json::Value>,
    full_lists: Option<serde_json::Value>,
}

impl CheckConfig {
    /// An empty configuration for `check_id`.
    pub fn empty(check_id: impl Into<String>) -> Self {
        Self {
            check_id: check_id.into(),
            ..Default::default()
        }
    }

    /// Id of the configured check.
    pub fn check_id(&self) -> &str {
        &self.check_id
    }

    /// Raw value of `key`.
    pub fn raw(&self, key: &str) -> Option<&serde_json::Value> {
        self.values.get(key)
    }

    /// Typed value of `key`; `None` when missing or of the wrong shape.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.values
            .get(key)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    /// Typed value of `key`, or `default`.
    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.get(key).unwrap_or(default)
    }

    /// The reporter formatting hint.
    pub fn full_lists(&self) -> Option<&serde_json::Value> {
        self.full_lists.as_ref()
    }
}
