//! Error types for cache stores.

/// Errors that can occur when talking to a cache backend.
///
/// Callers must treat every variant as transient: it never means "key absent".
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// The backend could not be reached or rejected the operation.
    #[error("{backend} backend unavailable: {reason}")]
    BackendUnavailable {
        /// Backend type identifier (`memory`, `redis`, `disk`).
        backend: &'static str,
        /// What went wrong.
        reason: String,
    },

    /// The store could not be built from its configuration.
    #[error("invalid store configuration: {0}")]
    InvalidConfig(String),
}

impl StoreError {
    /// Creates a new backend unavailable error.
    pub fn unavailable(backend: &'static str, reason: impl ToString) -> Self {
        Self::BackendUnavailable {
            backend,
            reason: reason.to_string(),
        }
    }

    /// Returns true if the backend could not be reached.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::BackendUnavailable { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StoreError::unavailable("redis", "connection refused");
        assert_eq!(
            err.to_string(),
            "redis backend unavailable: connection refused"
        );

        let err = StoreError::InvalidConfig("pool size must be positive".to_string());
        assert_eq!(
            err.to_string(),
            "invalid store configuration: pool size must be positive"
        );
    }

    #[test]
    fn test_is_unavailable() {
        assert!(StoreError::unavailable("disk", "permission denied").is_unavailable());
        assert!(!StoreError::InvalidConfig("x".to_string()).is_unavailable());
    }
}
