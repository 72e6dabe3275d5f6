//! Unified error types for the resolution engine.
//!
//! Every fatal variant carries the display identifier of the resource (or the
//! name of the override variable) that caused it, so a failure can be traced
//! back to a concrete file without a debugger.

use std::io;

use thiserror::Error;

/// Boxed error returned by fallible implementation constructors.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

// =============================================================================
// Syntax Errors
// =============================================================================

/// Malformed configuration text. Always aborts loader construction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyntaxError {
    /// The key does not have the shape required by the resource family.
    #[error("illegal key '{key}', expected format {expected}, in {resource}")]
    IllegalKey {
        /// The offending key.
        key: String,
        /// Human readable key shape, e.g. `interface>id>level=impl`.
        expected: &'static str,
        /// Display identifier of the resource.
        resource: String,
    },

    /// A key maps to an empty or blank value.
    #[error("value of '{key}' is empty, in {resource}")]
    EmptyValue {
        /// The key whose value is empty.
        key: String,
        /// Display identifier of the resource.
        resource: String,
    },

    /// The level part of a service key is not a known level.
    #[error(
        "undefined level '{level}' in key '{key}', expected default/library/platform/application, in {resource}"
    )]
    UndefinedLevel {
        /// The unparseable level text.
        level: String,
        /// The full key.
        key: String,
        /// Display identifier of the resource.
        resource: String,
    },

    /// The priority part of a plugin key is not a signed integer.
    #[error("invalid priority '{priority}' in key '{key}', expected an integer, in {resource}")]
    InvalidPriority {
        /// The unparseable priority text.
        priority: String,
        /// The full key.
        key: String,
        /// Display identifier of the resource.
        resource: String,
    },

    /// The value starts with `(`, so no implementation name is present.
    #[error("value of '{key}' starts with '(', in {resource}")]
    MissingImplementation {
        /// The key (or override variable) holding the value.
        key: String,
        /// Display identifier of the resource, or the override variable name.
        resource: String,
    },

    /// The value contains `(` but does not end with `)`.
    #[error("value of '{key}' has '(' but no ')' at the end, in {resource}")]
    UnterminatedArgument {
        /// The key (or override variable) holding the value.
        key: String,
        /// Display identifier of the resource, or the override variable name.
        resource: String,
    },

    /// The properties text itself could not be parsed.
    #[error("malformed properties at line {line}: {reason}, in {resource}")]
    Malformed {
        /// One-based line number.
        line: usize,
        /// What went wrong.
        reason: String,
        /// Display identifier of the resource.
        resource: String,
    },

    /// The resource is not valid UTF-8.
    #[error("resource is not valid UTF-8: {resource}")]
    Encoding {
        /// Display identifier of the resource.
        resource: String,
    },
}

// =============================================================================
// Conflict Errors
// =============================================================================

/// Irreconcilable configuration. Fatal unless an override variable
/// disambiguates it before resolution reaches the conflicting tier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConflictError {
    /// Two service definitions share a contract and an id.
    #[error("duplicate service id '{id}' for {contract}, defined in {first} and {second}")]
    DuplicateId {
        /// The service contract.
        contract: String,
        /// The duplicated id.
        id: String,
        /// Resource of the definition seen first.
        first: String,
        /// Resource of the definition seen second.
        second: String,
    },

    /// More than one definition shares the highest level.
    #[error("ambiguous services with the same level for {contract}, conflicts: {}", .conflicts.join(" | "))]
    AmbiguousLevel {
        /// The service contract.
        contract: String,
        /// One rendered entry per conflicting definition.
        conflicts: Vec<String>,
    },

    /// Two apply records disagree about the chosen id.
    #[error(
        "apply records disagree for {contract}: '{first_id}' in {first} and '{second_id}' in {second}"
    )]
    ApplyDisagreement {
        /// The service contract.
        contract: String,
        /// Id chosen by the record seen first.
        first_id: String,
        /// Resource of the record seen first.
        first: String,
        /// Id chosen by the record seen second.
        second_id: String,
        /// Resource of the record seen second.
        second: String,
    },
}

// =============================================================================
// Instantiation Errors
// =============================================================================

/// Failure to build a resolved implementation. Scoped to the single service or
/// plugin contract being loaded.
#[derive(Debug, Error)]
pub enum InstantiationError {
    /// No constructor is registered under the implementation name.
    #[error("implementation {implementation} is not registered, declared in {resource}")]
    NotRegistered {
        /// The implementation name.
        implementation: String,
        /// Resource that declared the implementation.
        resource: String,
    },

    /// More than one constructor is registered under the implementation name.
    #[error(
        "implementation {implementation} must have exactly one constructor, found {count}, declared in {resource}"
    )]
    MultipleConstructors {
        /// The implementation name.
        implementation: String,
        /// Number of registered constructors.
        count: usize,
        /// Resource that declared the implementation.
        resource: String,
    },

    /// The parameter resource referenced by the constructor argument is absent
    /// from the declaring resource group.
    #[error(
        "implementation {implementation} takes parameters, expected a resource at {expected}, declared in {resource}"
    )]
    MissingParameters {
        /// The implementation name.
        implementation: String,
        /// Location the parameter resource was expected at.
        expected: String,
        /// Resource that declared the implementation.
        resource: String,
    },

    /// The parameter argument is absolute or climbs out of the parameter
    /// directory.
    #[error(
        "parameter file '{arg}' of {implementation} must be relative to the parameter directory, declared in {resource}"
    )]
    InvalidParameterPath {
        /// The implementation name.
        implementation: String,
        /// The rejected constructor argument.
        arg: String,
        /// Resource that declared the implementation.
        resource: String,
    },

    /// The parameter resource could not be enumerated or read.
    #[error("failed to load parameters {path} for {implementation}, declared in {resource}")]
    ParameterIo {
        /// The implementation name.
        implementation: String,
        /// The parameter path that was looked up.
        path: String,
        /// Resource that declared the implementation.
        resource: String,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },

    /// The parameter resource is not valid properties text.
    #[error("invalid parameters for {implementation}, declared in {resource}")]
    InvalidParameters {
        /// The implementation name.
        implementation: String,
        /// Resource that declared the implementation.
        resource: String,
        /// The syntax problem in the parameter resource.
        #[source]
        source: SyntaxError,
    },

    /// The constructor itself reported a failure.
    #[error("constructor of {implementation} failed, declared in {resource}")]
    Failed {
        /// The implementation name.
        implementation: String,
        /// Resource that declared the implementation.
        resource: String,
        /// Error returned by the constructor.
        #[source]
        source: BoxError,
    },

    /// The constructed object does not implement the requested contract.
    #[error("{implementation} is not an implementation of {contract}, declared in {resource}")]
    TypeMismatch {
        /// The implementation name.
        implementation: String,
        /// The requested contract.
        contract: String,
        /// Resource that declared the implementation.
        resource: String,
    },
}

// =============================================================================
// Umbrella Error
// =============================================================================

/// Any failure raised by loader construction or loading.
#[derive(Debug, Error)]
pub enum SpiError {
    /// Malformed configuration.
    #[error(transparent)]
    Syntax(#[from] SyntaxError),

    /// Conflicting configuration.
    #[error(transparent)]
    Conflict(#[from] ConflictError),

    /// Failure to construct an implementation.
    #[error(transparent)]
    Instantiation(#[from] InstantiationError),

    /// The resource enumerator failed.
    #[error("failed to enumerate resources at {path}")]
    Resource {
        /// The path being enumerated.
        path: String,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },
}

impl SpiError {
    /// Creates a resource enumeration error.
    pub fn resource(path: impl Into<String>, source: io::Error) -> Self {
        Self::Resource {
            path: path.into(),
            source,
        }
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for engine operations.
pub type SpiResult<T> = Result<T, SpiError>;

/// Result type for properties and key parsing.
pub type SyntaxResult<T> = Result<T, SyntaxError>;

/// Result type for instantiation.
pub type InstantiationResult<T> = Result<T, InstantiationError>;
