//! Error types for Portico domain values.
//!
//! Parsing a request path into a [`CacheKey`](crate::CacheKey) or a
//! `host:port` pair into a [`BackendAddress`](crate::BackendAddress) are the
//! only fallible operations in this crate. Both errors carry the offending
//! input so callers can log it, but the server never forwards them verbatim
//! to clients.

use thiserror::Error;

/// Errors produced while normalizing a request path into a cache key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    /// The path was empty after stripping the query string.
    #[error("cache key cannot be empty")]
    Empty,

    /// The path does not start with `/`.
    #[error("cache key '{path}' must start with '/'")]
    MissingLeadingSlash {
        /// The rejected path
        path: String,
    },
}

/// Errors produced while parsing a `host:port` backend address.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    /// No `:` separator was found.
    #[error("backend address '{0}' must have the form host:port")]
    MissingPort(String),

    /// The host part is empty.
    #[error("backend address '{0}' has an empty host")]
    EmptyHost(String),

    /// The port is not a valid `u16`.
    #[error("backend address '{input}' has an invalid port: {reason}")]
    InvalidPort {
        /// The rejected input
        input: String,
        /// Why the port failed to parse
        reason: String,
    },
}

impl KeyError {
    /// Creates a MissingLeadingSlash error.
    pub fn missing_leading_slash(path: impl Into<String>) -> Self {
        Self::MissingLeadingSlash { path: path.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_error_display() {
        let err = KeyError::missing_leading_slash("index.html");
        assert_eq!(err.to_string(), "cache key 'index.html' must start with '/'");

        assert_eq!(KeyError::Empty.to_string(), "cache key cannot be empty");
    }

    #[test]
    fn test_address_error_display() {
        let err = AddressError::InvalidPort {
            input: "s1:http".to_string(),
            reason: "invalid digit found in string".to_string(),
        };
        assert!(err.to_string().contains("s1:http"));
        assert!(err.to_string().contains("invalid port"));
    }
}
