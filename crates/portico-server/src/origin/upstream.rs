//! Origin backed by an upstream HTTP service.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use tracing::debug;

use super::{OriginError, OriginFetcher, OriginRequest, OriginResponse};

/// Fetches `GET <base_url><path>`.
///
/// Transport errors and `5xx` answers are failures and are never cached.
/// Any other status is a regular response.
#[derive(Debug, Clone)]
pub struct UpstreamOrigin {
    client: reqwest::Client,
    base_url: String,
}

impl UpstreamOrigin {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, OriginError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(OriginError::unavailable)?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url_for(&self, request: &OriginRequest) -> String {
        format!("{}{}", self.base_url, request.key)
    }
}

#[async_trait]
impl OriginFetcher for UpstreamOrigin {
    async fn fetch(&self, request: &OriginRequest) -> Result<OriginResponse, OriginError> {
        let url = self.url_for(request);
        debug!(url = %url, "Fetching from upstream origin");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(OriginError::unavailable)?;

        let status = response.status();
        if status.is_server_error() {
            return Err(OriginError::unavailable(format!(
                "upstream answered {}",
                status
            )));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let body = response.bytes().await.map_err(OriginError::unavailable)?;

        Ok(OriginResponse::new(status.as_u16(), body, content_type))
    }

    fn name(&self) -> &'static str {
        "upstream"
    }
}
