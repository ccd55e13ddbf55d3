use std::io;
use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};
use wayfare_peers::PeerRegistry;
use wayfare_primitives::TunnelKey;
use wayfare_tasks::Shutdown;
use wayfare_tunnel::TunnelArgs;

use crate::handlers;

/// Shared handler state.
#[derive(Debug, Clone)]
pub struct ApiState {
    pub(crate) registry: Arc<PeerRegistry>,
    /// Public key of the node interface, written into client configs.
    pub(crate) server_key: TunnelKey,
    pub(crate) tunnel: Arc<TunnelArgs>,
}

impl ApiState {
    pub fn new(registry: Arc<PeerRegistry>, server_key: TunnelKey, tunnel: TunnelArgs) -> Self {
        Self {
            registry,
            server_key,
            tunnel: Arc::new(tunnel),
        }
    }
}

/// Build the API router.
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/peers",
            get(handlers::list_peers).post(handlers::register_peer),
        )
        .route(
            "/peers/:wallet",
            get(handlers::get_peer).delete(handlers::remove_peer),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Serve the API on `listener` until shutdown is requested.
///
/// In-flight requests are drained before this returns.
pub async fn serve(listener: TcpListener, state: ApiState, shutdown: Shutdown) -> io::Result<()> {
    info!(addr = %listener.local_addr()?, "Peer API listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown.into_future())
        .await?;
    debug!("Peer API stopped");
    Ok(())
}
