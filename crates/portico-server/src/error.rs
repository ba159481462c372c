use axum::{
    Json,
    http::{HeaderValue, StatusCode, header::ALLOW},
    response::{IntoResponse, Response},
};
use portico_store::StoreError;
use serde::Serialize;

use crate::balancer::{ProxyError, RouterError};
use crate::pipeline::PipelineError;

/// Errores visibles para el cliente.
///
/// Los mensajes son fijos: el detalle interno solo va a los logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    /// Path de request invalido
    BadRequest(String),

    /// Path reservado sin handler
    NotFound,

    /// Metodo no soportado en el path de cache
    MethodNotAllowed,

    /// El origin o el backend no respondio
    UpstreamUnavailable,

    /// El request excedio el timeout
    Timeout,

    /// El pool de backends esta vacio
    NoBackends,

    /// El store de cache no respondio a una operacion de admin
    CacheUnavailable,

    /// Body del request demasiado grande para reenviar
    PayloadTooLarge,

    /// Error interno
    Internal(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound => (StatusCode::NOT_FOUND, "no such admin endpoint".to_string()),
            AppError::MethodNotAllowed => (
                StatusCode::METHOD_NOT_ALLOWED,
                "only GET and HEAD are served from the cache".to_string(),
            ),
            AppError::UpstreamUnavailable => {
                (StatusCode::BAD_GATEWAY, "upstream unavailable".to_string())
            },
            AppError::Timeout => (
                StatusCode::GATEWAY_TIMEOUT,
                "request timed out".to_string(),
            ),
            AppError::NoBackends => (
                StatusCode::SERVICE_UNAVAILABLE,
                "no backends configured".to_string(),
            ),
            AppError::CacheUnavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                "cache backend unavailable".to_string(),
            ),
            AppError::PayloadTooLarge => (
                StatusCode::PAYLOAD_TOO_LARGE,
                "request body too large".to_string(),
            ),
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            },
        };

        let body = Json(ErrorResponse {
            error: status
                .canonical_reason()
                .unwrap_or("Error")
                .to_string(),
            message,
        });

        let mut response = (status, body).into_response();
        if status == StatusCode::METHOD_NOT_ALLOWED {
            response
                .headers_mut()
                .insert(ALLOW, HeaderValue::from_static("GET, HEAD"));
        }
        response
    }
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::InvalidKey(e) => AppError::BadRequest(e.to_string()),
            PipelineError::OriginUnavailable(_) => AppError::UpstreamUnavailable,
            PipelineError::Timeout => AppError::Timeout,
        }
    }
}

impl From<RouterError> for AppError {
    fn from(err: RouterError) -> Self {
        match err {
            RouterError::NoBackendsConfigured => AppError::NoBackends,
        }
    }
}

impl From<ProxyError> for AppError {
    fn from(err: ProxyError) -> Self {
        match err {
            ProxyError::Upstream { .. } | ProxyError::InvalidResponse { .. } => {
                AppError::UpstreamUnavailable
            },
            ProxyError::BodyTooLarge { .. } => AppError::PayloadTooLarge,
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::BackendUnavailable { .. } => AppError::CacheUnavailable,
            StoreError::InvalidConfig(msg) => AppError::Internal(msg),
        }
    }
}
