use std::net::SocketAddr;

use axum::{
    Router, middleware,
    routing::{delete, get},
};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tower::ServiceBuilder;

use crate::handlers::{
    cache::serve_cached,
    health::{health_check, health_with_state},
    invalidate::{invalidate_all, invalidate_path},
    proxy::proxy_request,
};
use crate::listener::{ConnectionLimits, EdgeListener, ListenerError, ListenerKind};
use crate::metrics::metrics_handler;
use crate::middleware::{LoggingLayer, RequestIdLayer};
use crate::settings::ServerConfig;
use crate::state::{AppState, BalancerState};
use crate::tls::load_tls_config;

/// Prefijo reservado para los endpoints de administracion.
pub const ADMIN_PREFIX: &str = "/_portico";
/// Prefijo de los endpoints de invalidacion.
pub const ADMIN_CACHE_PREFIX: &str = "/_portico/cache";

/// Creates the cache listener router with the given state and metrics handle.
///
/// Admin routes live under [`ADMIN_PREFIX`]; every other path goes to the
/// cache-aside pipeline. The invalidation routes are mounted only when
/// [`AppState::admin_invalidation`] is set; otherwise they answer 404.
pub fn create_router_with_state(state: AppState, prometheus_handle: PrometheusHandle) -> Router {
    let middleware_stack = ServiceBuilder::new()
        .layer(RequestIdLayer)
        .layer(LoggingLayer);

    // Router del endpoint de metricas (otro state)
    let metrics_router = Router::new()
        .route("/_portico/metrics", get(metrics_handler))
        .with_state(prometheus_handle);

    let mut app_router = Router::new().route("/_portico/health", get(health_with_state));
    if state.admin_invalidation() {
        app_router = app_router
            .route("/_portico/cache", delete(invalidate_all))
            .route("/_portico/cache/{*path}", delete(invalidate_path));
    }
    let app_router = app_router.fallback(serve_cached).with_state(state);

    Router::new()
        .merge(app_router)
        .merge(metrics_router)
        .layer(middleware::from_fn(
            crate::metrics::http::http_metrics_middleware,
        ))
        .layer(middleware_stack)
}

/// Creates the load-balancer listener router: every request is forwarded.
pub fn create_balancer_router(state: BalancerState) -> Router {
    let middleware_stack = ServiceBuilder::new()
        .layer(RequestIdLayer)
        .layer(LoggingLayer);

    Router::new()
        .fallback(proxy_request)
        .with_state(state)
        .layer(middleware::from_fn(
            crate::metrics::http::http_metrics_middleware,
        ))
        .layer(middleware_stack)
}

/// Creates a router without state (for testing only - health endpoint).
pub fn create_router() -> Router {
    let middleware = ServiceBuilder::new()
        .layer(RequestIdLayer)
        .layer(LoggingLayer);

    Router::new()
        .route("/_portico/health", get(health_check))
        .layer(middleware)
}

/// Binds every configured listener.
///
/// The balancer listener is bound only when `balancer` is given.
pub async fn bind_listeners(
    config: &ServerConfig,
    state: AppState,
    balancer: Option<BalancerState>,
    prometheus_handle: PrometheusHandle,
) -> Result<Vec<EdgeListener>, ListenerError> {
    let settings = &config.listener;
    let limits = ConnectionLimits::new(
        settings.max_connections,
        settings.keep_alive,
        settings.shutdown_grace,
    );
    let cache_app = create_router_with_state(state, prometheus_handle);

    let mut listeners = vec![
        EdgeListener::bind(
            ListenerKind::Http,
            settings.http_addr(),
            cache_app.clone(),
            limits.clone(),
        )
        .await?,
    ];

    if let Some(tls) = &settings.https {
        let tls_config = load_tls_config(tls)?;
        let addr = SocketAddr::new(settings.host, tls.port);
        listeners.push(
            EdgeListener::bind(ListenerKind::Https, addr, cache_app, limits.clone())
                .await?
                .with_tls(tls_config),
        );
    }

    if let Some(balancer) = balancer {
        if balancer.router().is_empty() {
            tracing::error!(
                "Load balancer enabled with an empty backend pool; its port answers 503"
            );
        }
        let addr = SocketAddr::new(settings.host, config.load_balancer.port);
        listeners.push(
            EdgeListener::bind(
                ListenerKind::Balancer,
                addr,
                create_balancer_router(balancer),
                limits,
            )
            .await?,
        );
    }

    Ok(listeners)
}

/// Serves `listeners` until `shutdown` completes, then drains them.
pub async fn serve_listeners(
    listeners: Vec<EdgeListener>,
    shutdown: impl std::future::Future<Output = ()>,
) -> Result<(), ListenerError> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut tasks = JoinSet::new();

    for listener in listeners {
        tasks.spawn(listener.serve(shutdown_rx.clone()));
    }

    let mut first_error = None;
    tokio::select! {
        _ = shutdown => {},
        // Un listener que termina antes del shutdown detiene al resto
        Some(result) = tasks.join_next() => {
            first_error = flatten(result).err();
        }
    }

    let _ = shutdown_tx.send(true);
    while let Some(result) = tasks.join_next().await {
        if let Err(e) = flatten(result)
            && first_error.is_none()
        {
            first_error = Some(e);
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn flatten(
    result: Result<Result<(), ListenerError>, tokio::task::JoinError>,
) -> Result<(), ListenerError> {
    result.map_err(|e| ListenerError::Io(std::io::Error::other(e)))?
}

/// Runs every listener until SIGINT or SIGTERM.
pub async fn run_server(
    config: &ServerConfig,
    state: AppState,
    balancer: Option<BalancerState>,
    prometheus_handle: PrometheusHandle,
) -> Result<(), ListenerError> {
    let listeners = bind_listeners(config, state, balancer, prometheus_handle).await?;
    serve_listeners(listeners, shutdown_signal()).await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
