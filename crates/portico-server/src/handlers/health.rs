use axum::{Json, extract::State};
use serde::Serialize;

use crate::invalidation::InvalidationSnapshot;
use crate::metrics::CacheMetrics;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store: Option<StoreHealth>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<CacheStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invalidation: Option<InvalidationSnapshot>,
}

/// Contadores del pipeline desde el arranque.
#[derive(Debug, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub coalesced: u64,
    pub hit_rate: f64,
}

impl From<&CacheMetrics> for CacheStats {
    fn from(metrics: &CacheMetrics) -> Self {
        Self {
            hits: metrics.hits(),
            misses: metrics.misses(),
            coalesced: metrics.coalesced(),
            hit_rate: metrics.hit_rate(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StoreHealth {
    pub backend: &'static str,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "UP".to_string(),
            store: None,
            cache: None,
            invalidation: None,
        }
    }
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse::default())
}

/// GET /_portico/health
///
/// Un store caido no tumba el servicio: el pipeline sigue sirviendo desde el
/// origin, por eso se reporta `DEGRADED` con 200.
pub async fn health_with_state(State(state): State<AppState>) -> Json<HealthResponse> {
    let store = state.store();
    let (status, store_health) = match store.health_check().await {
        Ok(()) => (
            "UP",
            StoreHealth {
                backend: store.backend_type(),
                status: "UP".to_string(),
                error: None,
            },
        ),
        Err(e) => (
            "DEGRADED",
            StoreHealth {
                backend: store.backend_type(),
                status: "DOWN".to_string(),
                error: Some(e.to_string()),
            },
        ),
    };

    Json(HealthResponse {
        status: status.to_string(),
        store: Some(store_health),
        cache: Some(CacheStats::from(state.pipeline().metrics())),
        invalidation: Some(state.invalidation().snapshot()),
    })
}
