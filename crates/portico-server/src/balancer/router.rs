//! Deterministic backend selection.

use portico_core::BackendAddress;
use xxhash_rust::xxh3::xxh3_64;

/// Error returned by [`BackendRouter::select`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RouterError {
    #[error("no backends configured")]
    NoBackendsConfigured,
}

/// Selects a backend from a fixed pool by hashing the request path.
///
/// `index = xxh3_64(path) % len(pool)`. The mapping is stable for a given
/// pool; changing the pool remaps paths freely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendRouter {
    backends: Vec<BackendAddress>,
}

impl BackendRouter {
    pub fn new(backends: Vec<BackendAddress>) -> Self {
        Self { backends }
    }

    pub fn backends(&self) -> &[BackendAddress] {
        &self.backends
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    /// Returns the backend for `path`.
    ///
    /// # Errors
    ///
    /// - `RouterError::NoBackendsConfigured` if the pool is empty
    pub fn select(&self, path: &str) -> Result<&BackendAddress, RouterError> {
        if self.backends.is_empty() {
            return Err(RouterError::NoBackendsConfigured);
        }

        let index = (xxh3_64(path.as_bytes()) % self.backends.len() as u64) as usize;
        Ok(&self.backends[index])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(addrs: &[&str]) -> BackendRouter {
        BackendRouter::new(addrs.iter().map(|a| a.parse().unwrap()).collect())
    }

    #[test]
    fn test_select_is_deterministic() {
        let router = pool(&["s1:80", "s2:80", "s3:80"]);
        let first = router.select("/foo").unwrap().clone();

        for _ in 0..1000 {
            assert_eq!(router.select("/foo").unwrap(), &first);
        }
    }

    #[test]
    fn test_single_backend_takes_everything() {
        let router = pool(&["only:8080"]);

        for path in ["/", "/a", "/b/c", "/very/long/path?x=1"] {
            assert_eq!(router.select(path).unwrap().to_string(), "only:8080");
        }
    }

    #[test]
    fn test_paths_spread_over_pool() {
        let router = pool(&["s1:80", "s2:80", "s3:80"]);
        let mut seen = std::collections::HashSet::new();

        for i in 0..300 {
            seen.insert(router.select(&format!("/item/{}", i)).unwrap().clone());
        }

        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn test_empty_pool_fails_closed() {
        let router = BackendRouter::new(Vec::new());

        assert!(router.is_empty());
        assert_eq!(router.select("/foo"), Err(RouterError::NoBackendsConfigured));
    }
}
