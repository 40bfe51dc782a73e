//! Profile assembly errors.

/// Result type for profile assembly.
pub type Result<T> = std::result::Result<T, SetupError>;

/// Authoring faults: defects in how a profile was put together.
///
/// These are never tied to a particular input and are fatal before any
/// identity runs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SetupError {
    /// Two different checks share an id
    #[error("Check id \"{0}\" is not unique")]
    DuplicateCheck(String),

    /// Two different sections share a name
    #[error("A section named \"{0}\" is already registered")]
    DuplicateSection(String),

    /// A name is already registered with a different meaning
    #[error("Name \"{name}\" is already registered as {existing}; requested registering as {requested}")]
    NamespaceClash {
        /// The contested name
        name: String,
        /// Kind already registered
        existing: String,
        /// Kind requested
        requested: String,
    },

    /// A declaration tried to use a name the engine binds itself
    #[error("\"{0}\" is a reserved name and can't be declared")]
    ReservedName(String),

    /// Checks or conditions reference names nobody declared
    #[error("Profile uses names that are not declared in its namespace: {}", .0.join(", "))]
    UndeclaredNames(Vec<String>),

    /// Conditions depend on each other in a loop
    #[error("Condition \"{name}\" is a circular dependency in {}", .path.join(" -> "))]
    CircularDependency {
        /// Condition closing the loop
        name: String,
        /// Resolution path that led back to it
        path: Vec<String>,
    },

    /// Aliases point at each other in a loop
    #[error("Alias for \"{name}\" has a circular reference in {}", .path.join(" -> "))]
    CircularAlias {
        /// Alias that was being resolved
        name: String,
        /// Alias chain
        path: Vec<String>,
    },

    /// Check id is malformed
    #[error("Invalid check id \"{0}\": ids must be keyword based")]
    InvalidCheckId(String),

    /// A declaration was built without a body
    #[error("Declaration \"{0}\" has no body")]
    MissingBody(String),

    /// A derived iterable's source doesn't iterate
    #[error("Derived iterable \"{name}\" needs condition \"{condition}\" to depend on exactly one iterarg")]
    NotIterable {
        /// Derived iterable name
        name: String,
        /// Source condition name
        condition: String,
    },

    /// Section lookup failed
    #[error("Unknown section: {0}")]
    UnknownSection(String),

    /// Check lookup failed
    #[error("Unknown check: {0}")]
    UnknownCheck(String),

    /// The expected-checks self test failed
    #[error("Profile fails expected checks test: {0}")]
    ExpectedChecks(String),

    /// Profile catalog lookup failed
    #[error("Unknown profile: {0}")]
    UnknownProfile(String),

    /// A supplied value collides with a profile name
    #[error("Values entry \"{name}\" collides with profile namespace as {kind}")]
    ValueCollision {
        /// Supplied value name
        name: String,
        /// Kind of the registered name
        kind: String,
    },
}
