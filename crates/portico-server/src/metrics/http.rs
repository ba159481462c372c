//! HTTP metrics middleware.

use axum::{body::Body, extract::MatchedPath, http::Request, middleware::Next, response::Response};
use metrics::{counter, histogram};
use std::time::Instant;

use crate::listener::ListenerKind;

/// Label de path de un request.
///
/// Los paths sin ruta matcheada (pipeline o proxy) se agrupan por clase de
/// trafico.
fn path_label(matched_path: Option<&MatchedPath>, listener: Option<ListenerKind>) -> String {
    match (matched_path, listener) {
        (Some(path), _) => path.as_str().to_string(),
        (None, Some(ListenerKind::Balancer)) => "proxy".to_string(),
        (None, _) => "cache".to_string(),
    }
}

/// Middleware que registra metricas HTTP para cada request.
pub async fn http_metrics_middleware(
    matched_path: Option<MatchedPath>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let listener = request.extensions().get::<ListenerKind>().copied();
    let path = path_label(matched_path.as_ref(), listener);

    let response = next.run(request).await;

    let status = response.status().as_u16().to_string();
    let duration = start.elapsed();

    // Registrar metricas
    counter!(
        "portico_http_requests_total",
        "method" => method.clone(),
        "path" => path.clone(),
        "status" => status
    )
    .increment(1);

    histogram!(
        "portico_http_request_duration_seconds",
        "method" => method,
        "path" => path
    )
    .record(duration.as_secs_f64());

    response
}

/// Registra las metricas HTTP
pub fn register_http_metrics() {
    metrics::describe_counter!(
        "portico_http_requests_total",
        "Total number of HTTP requests"
    );
    metrics::describe_histogram!(
        "portico_http_request_duration_seconds",
        "HTTP request duration in seconds"
    );
}
