//! Error taxonomy.
//!
//! Each collaborator surfaces its own error kind; `CacherError` composes
//! them so callers can tell a cache outage apart from a query outage.

use thiserror::Error;

use crate::operation::Operation;

/// Session misconfiguration, detected before any store or database call.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid method `{name}`")]
    InvalidMethod { name: String },
    #[error("model not set")]
    ModelNotSet,
}

impl ConfigError {
    pub fn invalid_method(name: impl Into<String>) -> Self {
        Self::InvalidMethod { name: name.into() }
    }
}

/// Transport or protocol failure from the key-value store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store transport failure: {0}")]
    Transport(String),
}

impl StoreError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }
}

/// Failure from the underlying database collaborator.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("unsupported operation `{operation}` for model `{model}`")]
    UnsupportedOperation { model: String, operation: Operation },
    #[error("query execution failed: {0}")]
    Execution(String),
}

impl QueryError {
    pub fn execution(err: impl std::fmt::Display) -> Self {
        Self::Execution(err.to_string())
    }
}

/// Unified error surfaced by a cache session.
///
/// Every failure maps onto exactly one variant; the session performs no
/// retries and no partial-success states.
#[derive(Debug, Error)]
pub enum CacherError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error("serialization failed: {message}")]
    Serialization { message: String },
    #[error("cached entry under `{key}` could not be decoded: {message}")]
    Decode { key: String, message: String },
}

impl CacherError {
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    pub fn decode(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            key: key.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variants_are_distinguishable() {
        let err = CacherError::from(ConfigError::ModelNotSet);
        assert!(matches!(err, CacherError::Config(_)));

        let err = CacherError::from(StoreError::transport("connection refused"));
        assert!(matches!(err, CacherError::Store(_)));

        let err = CacherError::from(QueryError::execution("relation missing"));
        assert!(matches!(err, CacherError::Query(_)));
    }

    #[test]
    fn messages_carry_context() {
        let err = ConfigError::invalid_method("explode");
        assert_eq!(err.to_string(), "invalid method `explode`");

        let err = CacherError::decode("cacher:entity:find:abc", "expected value");
        assert_eq!(
            err.to_string(),
            "cached entry under `cacher:entity:find:abc` could not be decoded: expected value"
        );
    }
}
