//! Origin fetchers: the source of truth behind the cache.
//!
//! The pipeline only relies on the [`OriginFetcher`] contract. Two
//! implementations are provided:
//! - [`StaticDirOrigin`]: files under a local directory
//! - [`UpstreamOrigin`]: an upstream HTTP service

mod static_dir;
mod upstream;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use portico_core::CacheKey;

use crate::settings::OriginSettings;

pub use static_dir::StaticDirOrigin;
pub use upstream::UpstreamOrigin;

/// Request handed to the origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginRequest {
    pub key: CacheKey,
}

impl OriginRequest {
    pub fn new(key: CacheKey) -> Self {
        Self { key }
    }
}

/// Response produced by the origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginResponse {
    pub status: u16,
    pub body: Bytes,
    pub content_type: Option<String>,
}

impl OriginResponse {
    pub fn new(status: u16, body: impl Into<Bytes>, content_type: Option<String>) -> Self {
        Self {
            status,
            body: body.into(),
            content_type,
        }
    }
}

/// Origin failure. The reason is internal and never sent to clients.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OriginError {
    #[error("origin unavailable: {reason}")]
    Unavailable { reason: String },
}

impl OriginError {
    pub fn unavailable(reason: impl ToString) -> Self {
        Self::Unavailable {
            reason: reason.to_string(),
        }
    }
}

/// Produces the response for a request path.
#[async_trait]
pub trait OriginFetcher: Send + Sync {
    /// Fetches the response for `request`.
    ///
    /// # Errors
    ///
    /// - `OriginError::Unavailable` if no response could be produced
    async fn fetch(&self, request: &OriginRequest) -> Result<OriginResponse, OriginError>;

    /// Returns the origin type identifier.
    fn name(&self) -> &'static str;
}

/// Builds the origin selected in the configuration.
pub fn build_origin(settings: &OriginSettings) -> Result<Arc<dyn OriginFetcher>, OriginError> {
    let origin: Arc<dyn OriginFetcher> = match settings {
        OriginSettings::Static { root } => Arc::new(StaticDirOrigin::new(root.clone())),
        OriginSettings::Upstream { base_url, timeout } => {
            Arc::new(UpstreamOrigin::new(base_url.clone(), *timeout)?)
        },
    };

    tracing::info!(origin = origin.name(), "Origin initialized");
    Ok(origin)
}
