//! Persistence layer error types

use std::fmt;

use rowcache_domain::DomainError;
use thiserror::Error;

/// Which store a backend fault came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Cache,
    Source,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cache => f.write_str("cache"),
            Self::Source => f.write_str("source"),
        }
    }
}

/// Persistence layer errors
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Invalid id: {0}")]
    InvalidId(String),

    #[error("Entity not found: {entity_type} with key {key}")]
    NotFound { entity_type: String, key: String },

    #[error("Record is missing declared field '{field}'")]
    MissingField { field: String },

    #[error("Cache entry {key} is corrupt at field '{field}'")]
    CorruptEntry { key: String, field: String },

    #[error("Backend unavailable ({backend}): {message}")]
    BackendUnavailable { backend: Backend, message: String },

    #[error("Invalid query parameters: {0}")]
    InvalidQuery(String),
}

impl PersistenceError {
    pub fn cache_unavailable(message: impl Into<String>) -> Self {
        Self::BackendUnavailable {
            backend: Backend::Cache,
            message: message.into(),
        }
    }

    pub fn source_unavailable(message: impl Into<String>) -> Self {
        Self::BackendUnavailable {
            backend: Backend::Source,
            message: message.into(),
        }
    }

    /// I/O fault on either store
    #[must_use]
    pub const fn is_backend_unavailable(&self) -> bool {
        matches!(self, Self::BackendUnavailable { .. })
    }
}

impl From<DomainError> for PersistenceError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::InvalidId { .. } | DomainError::InvalidKey(_) => {
                Self::InvalidId(err.to_string())
            }
            DomainError::MissingField { field } => Self::MissingField { field },
            DomainError::CorruptEntry { key, field } => Self::CorruptEntry { key, field },
            DomainError::Schema(msg) => Self::InvalidQuery(msg),
        }
    }
}

#[cfg(feature = "scylla")]
impl From<scylla::transport::errors::NewSessionError> for PersistenceError {
    fn from(err: scylla::transport::errors::NewSessionError) -> Self {
        Self::source_unavailable(err.to_string())
    }
}

#[cfg(feature = "scylla")]
impl From<scylla::transport::errors::QueryError> for PersistenceError {
    fn from(err: scylla::transport::errors::QueryError) -> Self {
        Self::source_unavailable(err.to_string())
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for PersistenceError {
    fn from(err: redis::RedisError) -> Self {
        Self::cache_unavailable(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PersistenceError>;
