//! Cache invalidation endpoint handlers.

use axum::{
    extract::State,
    http::Uri,
    response::Json,
};
use portico_core::CacheKey;
use serde::Serialize;
use tracing::instrument;

use crate::error::AppError;
use crate::server::ADMIN_CACHE_PREFIX;
use crate::state::AppState;

/// Response para operaciones de invalidación.
#[derive(Debug, Serialize)]
pub struct InvalidateResponse {
    /// Key invalidada, o `*` para toda la cache.
    pub invalidated: String,
    /// Mensaje descriptivo.
    pub message: String,
}

/// DELETE /_portico/cache
/// Invalida toda la cache.
#[instrument(skip_all)]
pub async fn invalidate_all(
    State(state): State<AppState>,
) -> Result<Json<InvalidateResponse>, AppError> {
    state.pipeline().invalidate_all().await?;

    tracing::info!(backend = state.store().backend_type(), "All cache entries invalidated");

    Ok(Json(InvalidateResponse {
        invalidated: "*".to_string(),
        message: "Invalidated all cache entries".to_string(),
    }))
}

/// DELETE /_portico/cache/{*path}
/// Invalida la entry de un path. Se usa el path crudo de la URI, igual que
/// el pipeline, para que la key coincida byte a byte.
#[instrument(skip_all, fields(path = %uri.path()))]
pub async fn invalidate_path(
    State(state): State<AppState>,
    uri: Uri,
) -> Result<Json<InvalidateResponse>, AppError> {
    let raw = uri
        .path()
        .strip_prefix(ADMIN_CACHE_PREFIX)
        .unwrap_or_default();
    let key = CacheKey::from_path(raw).map_err(|e| AppError::BadRequest(e.to_string()))?;

    state.pipeline().invalidate(&key).await?;

    tracing::info!(key = %key, "Cache entry invalidated");

    Ok(Json(InvalidateResponse {
        invalidated: key.to_string(),
        message: format!("Invalidated cache entry for '{}'", key),
    }))
}
