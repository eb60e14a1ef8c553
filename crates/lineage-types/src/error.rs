use thiserror::Error;

/// Errors produced by type construction and parsing.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid attribute key {key:?}: {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("invalid member name {0:?}")]
    InvalidMember(String),

    #[error("invalid merge strategy: {0:?} (expected override, merge or concat)")]
    InvalidStrategy(String),

    #[error("attribute key not registered: {0}")]
    UnknownKey(String),
}

/// Result alias for type operations.
pub type TypeResult<T> = Result<T, TypeError>;
