//! Cache path: every GET/HEAD outside the admin prefix.

use axum::{
    body::Body,
    extract::State,
    http::{
        HeaderName, HeaderValue, Method, StatusCode, Uri,
        header::{CONTENT_LENGTH, CONTENT_TYPE},
    },
    response::Response,
};

use crate::error::AppError;
use crate::pipeline::PipelineResponse;
use crate::server::ADMIN_PREFIX;
use crate::state::AppState;

/// Header telling how the response was obtained (`HIT`, `MISS`, ...).
pub static X_CACHE_HEADER: HeaderName = HeaderName::from_static("x-cache");

/// Fallback handler of the cache listeners.
pub async fn serve_cached(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
) -> Result<Response, AppError> {
    if is_admin_path(uri.path()) {
        return Err(AppError::NotFound);
    }
    if method != Method::GET && method != Method::HEAD {
        return Err(AppError::MethodNotAllowed);
    }

    let response = state
        .pipeline()
        .handle_path(uri.path(), state.request_timeout())
        .await?;

    into_http_response(response, method == Method::HEAD)
}

/// El prefijo de admin nunca llega al origin.
fn is_admin_path(path: &str) -> bool {
    path.strip_prefix(ADMIN_PREFIX)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

fn into_http_response(response: PipelineResponse, head: bool) -> Result<Response, AppError> {
    let status = StatusCode::from_u16(response.status)
        .map_err(|_| AppError::Internal(format!("invalid cached status {}", response.status)))?;

    let mut builder = Response::builder()
        .status(status)
        .header(&X_CACHE_HEADER, response.cache.as_str())
        .header(CONTENT_LENGTH, response.body.len());

    if let Some(content_type) = response
        .content_type
        .as_deref()
        .and_then(|ct| HeaderValue::from_str(ct).ok())
    {
        builder = builder.header(CONTENT_TYPE, content_type);
    }

    let body = if head {
        Body::empty()
    } else {
        Body::from(response.body)
    };

    builder
        .body(body)
        .map_err(|e| AppError::Internal(e.to_string()))
}
