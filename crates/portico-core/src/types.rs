//! Cache keys and backend addresses.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{AddressError, KeyError};

/// Key of a cacheable resource: the normalized request path.
///
/// Normalization drops the query string and fragment and nothing else.
/// Keys are case-sensitive and always start with `/`.
///
/// # Examples
///
/// ```
/// use portico_core::CacheKey;
///
/// let key = CacheKey::from_path("/docs/Intro.html?lang=es").unwrap();
/// assert_eq!(key.as_str(), "/docs/Intro.html");
///
/// assert!(CacheKey::from_path("docs").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CacheKey(String);

impl CacheKey {
    /// Normalizes a raw request path (optionally carrying a query string).
    pub fn from_path(raw: &str) -> Result<Self, KeyError> {
        let path = raw
            .split_once(['?', '#'])
            .map(|(path, _)| path)
            .unwrap_or(raw);

        if path.is_empty() {
            return Err(KeyError::Empty);
        }
        if !path.starts_with('/') {
            return Err(KeyError::missing_leading_slash(path));
        }

        Ok(Self(path.to_string()))
    }

    /// Returns the normalized path.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for CacheKey {
    type Error = KeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_path(&value)
    }
}

impl From<CacheKey> for String {
    fn from(key: CacheKey) -> Self {
        key.0
    }
}

/// A backend server of the load-balanced pool.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BackendAddress {
    host: String,
    port: u16,
}

impl BackendAddress {
    /// Creates a backend address from its parts.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Returns the host name or IP.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the TCP port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Returns the `host:port` authority used when building upstream URLs.
    pub fn authority(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for BackendAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for BackendAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (host, port) = trimmed
            .rsplit_once(':')
            .ok_or_else(|| AddressError::MissingPort(trimmed.to_string()))?;

        if host.is_empty() {
            return Err(AddressError::EmptyHost(trimmed.to_string()));
        }

        let port = port.parse::<u16>().map_err(|e| AddressError::InvalidPort {
            input: trimmed.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self::new(host, port))
    }
}

impl TryFrom<String> for BackendAddress {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<BackendAddress> for String {
    fn from(address: BackendAddress) -> Self {
        address.to_string()
    }
}
