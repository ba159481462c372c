//! Portico edge server binary.

use std::sync::Arc;

use anyhow::Context;
use portico_server::balancer::BackendRouter;
use portico_server::invalidation::InvalidationLoop;
use portico_server::metrics::init_metrics;
use portico_server::observability::{MetricsSink, ObservabilitySink};
use portico_server::origin::build_origin;
use portico_server::pipeline::{CacheAsidePipeline, PipelineConfig};
use portico_server::settings::{LogFormat, LoggingSettings};
use portico_server::{AppState, BalancerState, ServerConfig, run_server};
use portico_store::build_store;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

fn init_tracing(logging: &LoggingSettings) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let (pretty, json) = match logging.format {
        LogFormat::Pretty => (Some(tracing_subscriber::fmt::layer()), None),
        LogFormat::Json => (None, Some(tracing_subscriber::fmt::layer().json())),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(pretty)
        .with(json)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Proveedor de crypto para rustls y reqwest
    let _ = rustls::crypto::ring::default_provider().install_default();

    let config = ServerConfig::load().context("Failed to load configuration")?;
    init_tracing(&config.logging);

    tracing::info!(
        "Starting Portico edge server v{}",
        env!("CARGO_PKG_VERSION")
    );

    let prometheus_handle = init_metrics()?;
    let sink: Arc<dyn ObservabilitySink> = Arc::new(MetricsSink);

    let store = build_store(&config.cache.store)
        .await
        .context("Failed to initialize cache store")?;
    if let Err(e) = store.health_check().await {
        // No es fatal: el pipeline degrada a fetch directo
        tracing::warn!(error = %e, "Cache store is not reachable at startup");
    }

    let origin = build_origin(&config.origin).context("Failed to initialize origin")?;

    let pipeline = CacheAsidePipeline::new(
        Arc::clone(&store),
        origin,
        PipelineConfig {
            ttl: config.cache.ttl,
            follower_wait: config.cache.follower_wait,
        },
    )
    .with_sink(Arc::clone(&sink));

    let invalidation = InvalidationLoop::new(
        Arc::clone(&store),
        config.cache.invalidation_interval,
        Arc::clone(&sink),
    );
    let invalidation_state = invalidation.state();
    let _invalidation_handle = invalidation.start();

    let state = AppState::new(
        Arc::new(pipeline),
        invalidation_state,
        config.listener.request_timeout,
    )
    .with_admin_invalidation(config.cache.admin_invalidation);
    if config.cache.admin_invalidation {
        tracing::warn!("Admin invalidation endpoints enabled on every cache listener");
    }

    let balancer = if config.load_balancer.enabled {
        let client = reqwest::Client::builder()
            .connect_timeout(config.load_balancer.connect_timeout)
            .build()
            .context("Failed to build backend client")?;
        tracing::info!(
            backends = config.load_balancer.backends.len(),
            port = config.load_balancer.port,
            "Load balancer enabled"
        );
        Some(
            BalancerState::new(
                BackendRouter::new(config.load_balancer.backends.clone()),
                client,
                config.listener.request_timeout,
            )
            .with_sink(Arc::clone(&sink)),
        )
    } else {
        None
    };

    run_server(&config, state, balancer, prometheus_handle).await?;

    Ok(())
}
