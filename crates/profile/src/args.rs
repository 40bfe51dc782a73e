//! Resolved arguments handed to check and condition bodies, and the sink
//! check bodies report into.

use crate::config::CheckConfig;
use bakery_core::{Event, EventMessage, Message, Status, Value};
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

/// Errors reading an argument inside a body.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ArgError {
    /// The parameter was not resolved
    #[error("argument \"{0}\" is not available")]
    Missing(String),

    /// The parameter holds another kind of value
    #[error("argument \"{name}\" is {actual}, expected {expected}")]
    WrongType {
        /// Parameter name
        name: String,
        /// Expected kind
        expected: &'static str,
        /// Actual kind
        actual: &'static str,
    },
}

/// Named parameter values for one invocation.
#[derive(Debug, Clone)]
pub struct Args {
    values: HashMap<String, Value>,
    config: Arc<CheckConfig>,
}

impl Args {
    /// Create arguments with the given configuration namespace.
    pub fn new(config: Arc<CheckConfig>) -> Self {
        Self {
            values: HashMap::new(),
            config,
        }
    }

    /// Arguments with an empty configuration; handy in tests.
    pub fn empty() -> Self {
        Self::new(Arc::new(CheckConfig::default()))
    }

    /// Bind `name`.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    /// Builder form of [`Args::insert`].
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value.into());
        self
    }

    /// The configuration namespace of the running check.
    pub fn config(&self) -> &CheckConfig {
        &self.config
    }

    /// Whether `name` is bound.
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Value of a mandatory parameter.
    pub fn value(&self, name: &str) -> Result<&Value, ArgError> {
        self.values
            .get(name)
            .ok_or_else(|| ArgError::Missing(name.to_string()))
    }

    /// Value of an optional parameter.
    pub fn optional(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Collaborator object bound to `name`.
    pub fn get<T: Any>(&self, name: &str) -> Result<&T, ArgError> {
        let value = self.value(name)?;
        value.downcast_ref::<T>().ok_or_else(|| ArgError::WrongType {
            name: name.to_string(),
            expected: std::any::type_name::<T>(),
            actual: value.kind(),
        })
    }

    /// Text bound to `name`.
    pub fn text(&self, name: &str) -> Result<&str, ArgError> {
        let value = self.value(name)?;
        value.as_str().ok_or_else(|| self.wrong(name, "text", value))
    }

    /// Integer bound to `name`.
    pub fn int(&self, name: &str) -> Result<i64, ArgError> {
        let value = self.value(name)?;
        value.as_int().ok_or_else(|| self.wrong(name, "int", value))
    }

    /// Boolean bound to `name`.
    pub fn bool(&self, name: &str) -> Result<bool, ArgError> {
        let value = self.value(name)?;
        value.as_bool().ok_or_else(|| self.wrong(name, "bool", value))
    }

    /// List bound to `name`.
    pub fn list(&self, name: &str) -> Result<&[Value], ArgError> {
        let value = self.value(name)?;
        value.as_list().ok_or_else(|| self.wrong(name, "list", value))
    }

    fn wrong(&self, name: &str, expected: &'static str, value: &Value) -> ArgError {
        ArgError::WrongType {
            name: name.to_string(),
            expected,
            actual: value.kind(),
        }
    }
}

/// Sink a check body emits its events into, in order.
#[derive(Debug, Default)]
pub struct Report {
    events: Vec<Event>,
}

impl Report {
    /// Create an empty report.
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit one event.
    pub fn emit(&mut self, status: Status, message: impl Into<EventMessage>) {
        self.events.push(Event::new(status, message));
    }

    /// Emit a coded event.
    pub fn emit_coded(&mut self, status: Status, code: impl Into<String>, text: impl Into<String>) {
        self.events.push(Event::new(status, Message::new(code, text)));
    }

    /// Emit a coded PASS.
    pub fn pass(&mut self, code: impl Into<String>, text: impl Into<String>) {
        self.emit_coded(Status::Pass, code, text);
    }

    /// Emit a coded INFO.
    pub fn info(&mut self, code: impl Into<String>, text: impl Into<String>) {
        self.emit_coded(Status::Info, code, text);
    }

    /// Emit a coded WARN.
    pub fn warn(&mut self, code: impl Into<String>, text: impl Into<String>) {
        self.emit_coded(Status::Warn, code, text);
    }

    /// Emit a coded FAIL.
    pub fn fail(&mut self, code: impl Into<String>, text: impl Into<String>) {
        self.emit_coded(Status::Fail, code, text);
    }

    /// Emit a coded SKIP.
    pub fn skip(&mut self, code: impl Into<String>, text: impl Into<String>) {
        self.emit_coded(Status::Skip, code, text);
    }

    /// Emit a DEBUG note.
    pub fn debug(&mut self, text: impl Into<String>) {
        self.emit(Status::Debug, text.into());
    }

    /// Events emitted so far.
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Consume the report.
    pub fn into_events(self) -> Vec<Event> {
        self.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_accessors() {
        let args = Args::empty()
            .with("font", "a.ttf")
            .with("count", 3i64)
            .with("flag", true)
            .with("ttFont", Value::opaque(vec![0u8; 4]));

        assert_eq!(args.text("font").unwrap(), "a.ttf");
        assert_eq!(args.int("count").unwrap(), 3);
        assert!(args.bool("flag").unwrap());
        assert_eq!(args.get::<Vec<u8>>("ttFont").unwrap().len(), 4);
        assert!(args.optional("missing").is_none());
    }

    #[test]
    fn test_accessor_errors() {
        let args = Args::empty().with("font", "a.ttf");
        assert_eq!(args.int("nope").unwrap_err(), ArgError::Missing("nope".into()));
        assert!(matches!(
            args.int("font").unwrap_err(),
            ArgError::WrongType { expected: "int", actual: "text", .. }
        ));
        assert!(matches!(args.get::<u32>("font"), Err(ArgError::WrongType { .. })));
    }

    #[test]
    fn test_report_keeps_order() {
        let mut report = Report::new();
        report.warn("a", "first");
        report.pass("b", "second");
        report.emit(Status::Info, "third");
        let statuses: Vec<_> = report.events().iter().map(|e| e.status).collect();
        assert_eq!(statuses, vec![Status::Warn, Status::Pass, Status::Info]);
        assert_eq!(report.into_events()[0].message.code(), Some("a"));
    }
}
