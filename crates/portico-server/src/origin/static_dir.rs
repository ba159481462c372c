//! Origin serving files from a local directory.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::debug;

use super::{OriginError, OriginFetcher, OriginRequest, OriginResponse};

const INDEX_FILE: &str = "index.html";
const NOT_FOUND_BODY: &str = "Not Found";

/// Serves `<root>/<path>`; `/` and directories map to `index.html`.
///
/// A missing file is a regular `404` response, so it is cached like any other.
#[derive(Debug, Clone)]
pub struct StaticDirOrigin {
    root: PathBuf,
}

impl StaticDirOrigin {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps a request path to a file under the root, `None` if it escapes it.
    fn resolve(&self, path: &str) -> Option<PathBuf> {
        let decoded = urlencoding::decode(path).ok()?;
        let relative = Path::new(decoded.trim_start_matches('/'));

        let mut resolved = self.root.clone();
        for component in relative.components() {
            match component {
                Component::Normal(segment) => resolved.push(segment),
                Component::CurDir => {},
                // `..`, raiz absoluta o prefijo: fuera del root
                _ => return None,
            }
        }
        Some(resolved)
    }

    fn not_found() -> OriginResponse {
        OriginResponse::new(404, NOT_FOUND_BODY, Some("text/plain; charset=utf-8".to_string()))
    }
}

#[async_trait]
impl OriginFetcher for StaticDirOrigin {
    async fn fetch(&self, request: &OriginRequest) -> Result<OriginResponse, OriginError> {
        let Some(mut path) = self.resolve(request.key.as_str()) else {
            debug!(key = %request.key, "Rejected path outside origin root");
            return Ok(Self::not_found());
        };

        match fs::metadata(&path).await {
            Ok(meta) if meta.is_dir() => path.push(INDEX_FILE),
            Ok(_) => {},
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::not_found()),
            Err(e) => return Err(OriginError::unavailable(e)),
        }

        match fs::read(&path).await {
            Ok(body) => {
                let content_type = mime_guess::from_path(&path)
                    .first()
                    .map(|mime| mime.essence_str().to_string());
                Ok(OriginResponse::new(200, body, content_type))
            },
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Self::not_found()),
            Err(e) => Err(OriginError::unavailable(e)),
        }
    }

    fn name(&self) -> &'static str {
        "static"
    }
}
