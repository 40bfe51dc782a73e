//! Declarations: checks, conditions, expected values and the iteration
//! helpers that tie them to the inputs of a run.

use crate::args::{Args, Report};
use crate::error::{Result, SetupError};
use async_trait::async_trait;
use bakery_core::{CheckMeta, Value};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Parameter name that always receives the check's configuration.
pub const CONFIG_PARAM: &str = "config";

/// Parameter list of a declaration without parameters.
pub const NO_PARAMS: [&str; 0] = [];

/// Body of a check: emits events for one invocation.
///
/// Returning an error after emitting events keeps the emitted events; the
/// engine appends an ERROR describing the failure.
#[async_trait]
pub trait CheckBody: Send + Sync {
    /// Run the check.
    async fn run(&self, args: &Args, report: &mut Report) -> anyhow::Result<()>;
}

/// Body of a condition: computes a value whose truthiness gates checks.
#[async_trait]
pub trait ConditionBody: Send + Sync {
    /// Evaluate the condition.
    async fn evaluate(&self, args: &Args) -> anyhow::Result<Value>;
}

/// Adapter turning a plain function into a [`CheckBody`].
pub struct FnCheck<F>(pub F);

#[async_trait]
impl<F> CheckBody for FnCheck<F>
where
    F: Fn(&Args, &mut Report) -> anyhow::Result<()> + Send + Sync,
{
    async fn run(&self, args: &Args, report: &mut Report) -> anyhow::Result<()> {
        (self.0)(args, report)
    }
}

/// Adapter turning a plain function into a [`ConditionBody`].
pub struct FnCondition<F>(pub F);

#[async_trait]
impl<F> ConditionBody for FnCondition<F>
where
    F: Fn(&Args) -> anyhow::Result<Value> + Send + Sync,
{
    async fn evaluate(&self, args: &Args) -> anyhow::Result<Value> {
        (self.0)(args)
    }
}

/// The input kind a declaration is scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Testable {
    /// A single font binary
    Font,
    /// A font family
    Family,
    /// A design-space source project
    Project,
    /// The whole run
    Run,
}

impl Testable {
    /// All scopes.
    pub const ALL: [Testable; 4] = [Testable::Font, Testable::Family, Testable::Project, Testable::Run];

    /// Name the engine binds the context under; reserved for declarations.
    pub fn context_name(self) -> &'static str {
        match self {
            Testable::Font => "font",
            Testable::Family => "family",
            Testable::Project => "project",
            Testable::Run => "run",
        }
    }

    /// Whether `name` is bound by the engine itself.
    pub fn is_reserved(name: &str) -> bool {
        name == CONFIG_PARAM || Testable::ALL.iter().any(|t| t.context_name() == name)
    }
}

impl Default for Testable {
    fn default() -> Self {
        Testable::Run
    }
}

impl std::fmt::Display for Testable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.context_name())
    }
}

/// A declared parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Param {
    /// Parameter name
    pub name: String,

    /// Whether a missing value is acceptable
    pub optional: bool,
}

impl Param {
    /// A mandatory parameter.
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            optional: false,
        }
    }

    /// An optional parameter.
    pub fn optional(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            optional: true,
        }
    }
}

/// A reference to a gating condition, parsed once at declaration time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConditionRef {
    /// Referenced condition
    pub name: String,

    /// Whether the test is inverted
    pub negated: bool,

    raw: String,
}

impl ConditionRef {
    /// Parse `"name"`, `"not name"` or `"!name"`.
    pub fn parse(reference: &str) -> Self {
        let raw = reference.trim().to_string();
        let (negated, name) = if let Some(rest) = raw.strip_prefix("not ") {
            (true, rest.trim())
        } else if let Some(rest) = raw.strip_prefix('!') {
            (true, rest.trim())
        } else {
            (false, raw.as_str())
        };
        Self {
            name: name.to_string(),
            negated,
            raw: raw.clone(),
        }
    }

    /// The reference as written.
    pub fn as_written(&self) -> &str {
        &self.raw
    }

    /// Apply the negation to a condition value.
    pub fn is_fulfilled(&self, value: &Value) -> bool {
        value.is_truthy() != self.negated
    }
}

/// One independently reportable quality rule.
#[derive(Clone)]
pub struct Check {
    /// Reporting metadata, including the id
    pub meta: Arc<CheckMeta>,

    /// Scope for condition lookup
    pub testable: Testable,

    /// Declared parameters
    pub params: Vec<Param>,

    /// Gating conditions, in order
    pub conditions: Vec<ConditionRef>,

    /// Configuration keys the check reads
    pub used_config_keys: Vec<String>,

    body: Arc<dyn CheckBody>,
}

impl Check {
    /// Start declaring a check.
    pub fn builder(id: impl Into<String>) -> CheckBuilder {
        CheckBuilder::new(id)
    }

    /// Stable id.
    pub fn id(&self) -> &str {
        &self.meta.id
    }

    /// The body.
    pub fn body(&self) -> &Arc<dyn CheckBody> {
        &self.body
    }

    /// Whether `other` is the very same declaration.
    pub fn is_same(&self, other: &Check) -> bool {
        Arc::ptr_eq(&self.body, &other.body) && self.meta == other.meta
    }
}

impl std::fmt::Debug for Check {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Check")
            .field("id", &self.meta.id)
            .field("testable", &self.testable)
            .field("params", &self.params)
            .field("conditions", &self.conditions)
            .finish()
    }
}

impl std::fmt::Display for Check {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<Check:{}>", self.meta.id)
    }
}

const CHECK_ID_PATTERN: &str = r"^[A-Za-z0-9_.:/\-]+$";

/// Check ids are keyword based: no whitespace, and the last segment is not
/// a bare number.
fn is_valid_check_id(id: &str) -> bool {
    let charset_ok = match Regex::new(CHECK_ID_PATTERN) {
        Ok(re) => re.is_match(id),
        Err(_) => false,
    };
    let tail = id.rsplit('/').next().unwrap_or(id);
    charset_ok && !tail.chars().all(|c| c.is_ascii_digit())
}

/// Builder for [`Check`].
pub struct CheckBuilder {
    meta: CheckMeta,
    testable: Testable,
    params: Vec<Param>,
    conditions: Vec<String>,
    used_config_keys: Vec<String>,
    body: Option<Arc<dyn CheckBody>>,
}

impl CheckBuilder {
    /// Create a new builder.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            meta: CheckMeta {
                id: id.into(),
                ..Default::default()
            },
            testable: Testable::Run,
            params: Vec::new(),
            conditions: Vec::new(),
            used_config_keys: Vec::new(),
            body: None,
        }
    }

    /// Set description.
    pub fn description(mut self, desc: impl Into<String>) -> Self {
        self.meta.description = desc.into();
        self
    }

    /// Set documentation.
    pub fn documentation(mut self, doc: impl Into<String>) -> Self {
        self.meta.documentation = Some(doc.into());
        self
    }

    /// Set rationale.
    pub fn rationale(mut self, rationale: impl Into<String>) -> Self {
        self.meta.rationale = Some(rationale.into());
        self
    }

    /// Set severity hint.
    pub fn severity(mut self, severity: u8) -> Self {
        self.meta.severity = Some(severity);
        self
    }

    /// Add a proposal link.
    pub fn proposal(mut self, url: impl Into<String>) -> Self {
        self.meta.proposal.push(url.into());
        self
    }

    /// Mark as experimental.
    pub fn experimental(mut self) -> Self {
        self.meta.experimental = true;
        self
    }

    /// Set scope.
    pub fn testable(mut self, testable: Testable) -> Self {
        self.testable = testable;
        self
    }

    /// Add mandatory parameters.
    pub fn params<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.params.extend(names.into_iter().map(Param::required));
        self
    }

    /// Add an optional parameter.
    pub fn optional_param(mut self, name: impl Into<String>) -> Self {
        self.params.push(Param::optional(name));
        self
    }

    /// Add gating conditions (`"name"` or `"not name"`).
    pub fn conditions<I, S>(mut self, refs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.conditions.extend(refs.into_iter().map(Into::into));
        self
    }

    /// Declare configuration keys the check reads.
    pub fn configs<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.used_config_keys.extend(keys.into_iter().map(Into::into));
        self
    }

    /// Set the body.
    pub fn body(mut self, body: impl CheckBody + 'static) -> Self {
        self.body = Some(Arc::new(body));
        self
    }

    /// Set a plain function as body.
    pub fn body_fn<F>(self, f: F) -> Self
    where
        F: Fn(&Args, &mut Report) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.body(FnCheck(f))
    }

    /// Build the check.
    pub fn build(self) -> Result<Check> {
        let id = self.meta.id.clone();
        if !is_valid_check_id(&id) {
            return Err(SetupError::InvalidCheckId(id));
        }
        let body = self.body.ok_or_else(|| SetupError::MissingBody(id.clone()))?;

        let mut meta = self.meta;
        if meta.description.is_empty() {
            meta.description = id;
        }

        Ok(Check {
            meta: Arc::new(meta),
            testable: self.testable,
            params: self.params,
            conditions: self
                .conditions
                .iter()
                .map(|reference| ConditionRef::parse(reference))
                .collect(),
            used_config_keys: self.used_config_keys,
            body,
        })
    }
}

/// A cached gate or derived value checks depend on.
#[derive(Clone)]
pub struct Condition {
    /// Name checks reference it by
    pub name: String,

    /// Short description
    pub description: Option<String>,

    /// Scope
    pub testable: Testable,

    /// Declared parameters
    pub params: Vec<Param>,

    /// Replace an existing registration with the same name
    pub force: bool,

    body: Arc<dyn ConditionBody>,
}

impl Condition {
    /// Declare a condition.
    pub fn new(
        name: impl Into<String>,
        testable: Testable,
        params: impl IntoIterator<Item = impl Into<String>>,
        body: impl ConditionBody + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            description: None,
            testable,
            params: params.into_iter().map(Param::required).collect(),
            force: false,
            body: Arc::new(body),
        }
    }

    /// Declare a condition from a plain function.
    pub fn from_fn<F>(
        name: impl Into<String>,
        testable: Testable,
        params: impl IntoIterator<Item = impl Into<String>>,
        f: F,
    ) -> Self
    where
        F: Fn(&Args) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        Self::new(name, testable, params, FnCondition(f))
    }

    /// Set description.
    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    /// Add an optional parameter.
    pub fn with_optional_param(mut self, name: impl Into<String>) -> Self {
        self.params.push(Param::optional(name));
        self
    }

    /// Allow replacing an earlier registration.
    pub fn forced(mut self) -> Self {
        self.force = true;
        self
    }

    /// The body.
    pub fn body(&self) -> &Arc<dyn ConditionBody> {
        &self.body
    }

    /// Whether `other` is the very same declaration.
    pub fn is_same(&self, other: &Condition) -> bool {
        self.name == other.name
            && self.testable == other.testable
            && Arc::ptr_eq(&self.body, &other.body)
    }
}

impl std::fmt::Debug for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Condition")
            .field("name", &self.name)
            .field("testable", &self.testable)
            .field("params", &self.params)
            .finish()
    }
}

impl std::fmt::Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<Condition:{}>", self.name)
    }
}

type Validator = Arc<dyn Fn(&Value) -> std::result::Result<(), String> + Send + Sync>;

/// A caller-supplied input, e.g. the list of font files.
#[derive(Clone)]
pub struct ExpectedValue {
    /// Name
    pub name: String,

    /// Description
    pub description: String,

    /// Value used when the caller supplies none
    pub default: Option<Value>,

    validator: Option<Validator>,
    item_validator: Option<Validator>,
}

impl ExpectedValue {
    /// Declare an expected value.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            default: None,
            validator: None,
            item_validator: None,
        }
    }

    /// Set the default.
    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// Validate the whole supplied value at load time.
    pub fn with_validator<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value) -> std::result::Result<(), String> + Send + Sync + 'static,
    {
        self.validator = Some(Arc::new(f));
        self
    }

    /// Validate each element of a plural value when an identity binds it.
    pub fn with_item_validator<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value) -> std::result::Result<(), String> + Send + Sync + 'static,
    {
        self.item_validator = Some(Arc::new(f));
        self
    }

    /// Run the load-time validator.
    pub fn validate(&self, value: &Value) -> std::result::Result<(), String> {
        match &self.validator {
            Some(validator) => validator(value),
            None => Ok(()),
        }
    }

    /// Run the per-element validator.
    pub fn validate_item(&self, value: &Value) -> std::result::Result<(), String> {
        match &self.item_validator {
            Some(validator) => validator(value),
            None => Ok(()),
        }
    }

    /// Whether `other` declares the same input.
    pub fn is_same(&self, other: &ExpectedValue) -> bool {
        self.name == other.name && self.description == other.description && self.default == other.default
    }
}

impl std::fmt::Debug for ExpectedValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpectedValue")
            .field("name", &self.name)
            .field("default", &self.default)
            .finish()
    }
}

/// `{singular_name, plural_expected_value_name}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Iterarg {
    /// Name bound to one element
    pub singular: String,

    /// Expected value holding the collection
    pub plural: String,
}

impl Iterarg {
    /// Pair `singular` with `plural`.
    pub fn new(singular: impl Into<String>, plural: impl Into<String>) -> Self {
        Self {
            singular: singular.into(),
            plural: plural.into(),
        }
    }
}

/// A collection built by evaluating a per-element condition over its iterarg.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DerivedIterable {
    /// Name checks reference it by
    pub name: String,

    /// Condition evaluated per element
    pub source: String,

    /// Plain values when true, `Indexed(bindings, value)` items otherwise
    pub simple: bool,
}

impl DerivedIterable {
    /// Declare a derived iterable.
    pub fn new(name: impl Into<String>, source: impl Into<String>, simple: bool) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            simple,
        }
    }
}
