//! Prometheus exporter for the `metrics` facade.

use axum::{Router, extract::State, routing::get};
use eyre::{Result, WrapErr};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use std::{net::SocketAddr, time::Duration};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};
use wayfare_tasks::Shutdown;

/// How often histogram buckets are drained.
const UPKEEP_INTERVAL: Duration = Duration::from_secs(5);

static PROMETHEUS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Install the Prometheus recorder as the global metrics recorder.
///
/// Subsequent calls return the already installed handle.
pub fn install_prometheus_recorder() -> Result<PrometheusHandle> {
    PROMETHEUS_HANDLE
        .get_or_try_init(|| {
            let recorder = PrometheusBuilder::new().build_recorder();
            let handle = recorder.handle();
            ::metrics::set_global_recorder(recorder)
                .map_err(|e| eyre::eyre!("Failed to install prometheus recorder: {e}"))?;
            Ok(handle)
        })
        .cloned()
}

/// Router exposing `/metrics` in the Prometheus text format.
pub fn metrics_router(handle: PrometheusHandle) -> Router {
    Router::new()
        .route("/metrics", get(render))
        .with_state(handle)
        .layer(TraceLayer::new_for_http())
}

async fn render(State(handle): State<PrometheusHandle>) -> String {
    handle.render()
}

/// Serve the metrics endpoint until shutdown is requested.
pub async fn serve_metrics(
    addr: SocketAddr,
    handle: PrometheusHandle,
    shutdown: Shutdown,
) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .wrap_err_with(|| format!("Failed to bind metrics listener on {addr}"))?;
    info!(%addr, "Metrics endpoint listening");

    let upkeep = handle.clone();
    let upkeep_shutdown = shutdown.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(UPKEEP_INTERVAL);
        loop {
            tokio::select! {
                _ = upkeep_shutdown.cancelled() => break,
                _ = interval.tick() => upkeep.run_upkeep(),
            }
        }
    });

    axum::serve(listener, metrics_router(handle))
        .with_graceful_shutdown(shutdown.into_future())
        .await
        .wrap_err("Metrics server failed")?;

    debug!("Metrics endpoint stopped");
    Ok(())
}
