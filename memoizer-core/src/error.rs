//! Error types for memoizer operations

use thiserror::Error;

/// Errors raised while encoding or decoding call identities.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("Unsupported value: {reason}")]
    UnsupportedValue { reason: String },

    #[error("Invalid keyword argument name: {name:?}")]
    InvalidKeyword { name: String },

    #[error("Malformed call identity at offset {offset}: {reason}")]
    Decode { offset: usize, reason: String },

    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("Missing positional argument {index} for {function}")]
    MissingArgument { function: String, index: usize },
}

/// Function registry errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Cannot resolve function {qualified_name}")]
    Unresolved { qualified_name: String },

    #[error("Registry lock poisoned")]
    LockPoisoned,
}

/// Timestamp formatting/parsing errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TimestampError {
    #[error("Unrecognised timestamp format: {value:?}")]
    UnrecognizedFormat { value: String },

    #[error("Invalid timestamp {value:?}: {reason}")]
    Parse { value: String, reason: String },
}

/// Node/call identity structure errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("Node identity has no '@' separator: {id:?}")]
    MissingSeparator { id: String },

    #[error("Query string is {len} characters, limit is {max}")]
    QueryStringTooLong { len: usize, max: usize },

    #[error("Query string is missing key {key:?}")]
    MissingQueryKey { key: String },

    #[error("Query string is not valid percent-encoding: {reason}")]
    QueryDecode { reason: String },
}

/// Cache backend errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Node not found in cache: {node_id}")]
    NotFound { node_id: String },

    #[error("Operation {operation} not supported by {backend}")]
    NotImplemented {
        backend: &'static str,
        operation: &'static str,
    },

    #[error("I/O error on {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Serialization error: {reason}")]
    Serialization { reason: String },

    #[error("Cache lock poisoned")]
    LockPoisoned,
}

/// Execution context errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ContextError {
    #[error("Invalid context: {reason}")]
    InvalidContext { reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all memoizer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MemoError {
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Timestamp error: {0}")]
    Timestamp(#[from] TimestampError),

    #[error("Identity error: {0}")]
    Identity(#[from] IdentityError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Context error: {0}")]
    Context(#[from] ContextError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Failure raised by a memoized function body that uses `MemoError` as
    /// its own error type.
    #[error("Evaluation failed: {0}")]
    Evaluation(String),
}

impl MemoError {
    /// Shorthand for a failure inside a memoized function body.
    pub fn evaluation(reason: impl Into<String>) -> Self {
        Self::Evaluation(reason.into())
    }

    /// True when this is a `CacheError::NotFound`.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Cache(CacheError::NotFound { .. }))
    }
}

/// Result type alias for memoizer operations.
pub type MemoResult<T> = Result<T, MemoError>;

// =============================================================================
// TESTS
// =============================================================================
