//! Cache engine error types

use crate::resilience::CircuitBreakerError;
use thiserror::Error;

/// Errors that can occur during cache operations
///
/// Absence of a key is never an error: reads return `Ok(None)` instead.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    /// The backend's circuit breaker is open, the call was not attempted
    #[error("Circuit breaker open for backend '{backend}'")]
    BreakerOpen { backend: String },

    /// The remote call itself failed while the breaker was closed or half-open
    #[error("Cache backend error: {0}")]
    Backend(String),

    /// Failed to establish the backend connection
    #[error("Cache connection error: {0}")]
    Connection(String),

    /// The distributed mutex for a key is held by another owner
    #[error("Lock error on '{key}': {reason}")]
    Lock { key: String, reason: String },

    /// The distributed mutex was no longer owned by the caller on release
    #[error("Unlock error on '{key}': {reason}")]
    Unlock { key: String, reason: String },

    /// A stored value could not be decoded into a cache entry
    #[error("Cache codec error: {0}")]
    Codec(String),

    /// The response declared `Vary: *` and cannot be keyed
    #[error("Response is not cacheable: Vary: *")]
    WildcardVary,

    /// No backend is registered under the given name
    #[error("Unknown cache backend '{0}'")]
    UnknownBackend(String),
}

impl CacheError {
    /// Whether the error means the backend was not reached at all
    pub fn is_short_circuit(&self) -> bool {
        matches!(self, Self::BreakerOpen { .. })
    }

    /// Whether the error comes from mutex contention or lost ownership
    pub fn is_lock_error(&self) -> bool {
        matches!(self, Self::Lock { .. } | Self::Unlock { .. })
    }
}

impl From<CircuitBreakerError<CacheError>> for CacheError {
    fn from(err: CircuitBreakerError<CacheError>) -> Self {
        match err {
            CircuitBreakerError::CircuitOpen { component } => {
                Self::BreakerOpen { backend: component }
            }
            CircuitBreakerError::OperationFailed(inner) => inner,
        }
    }
}

#[cfg(feature = "cache-redis")]
impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        Self::Backend(err.to_string())
    }
}

/// Result type for cache operations
pub type CacheResult<T> = Result<T, CacheError>;
