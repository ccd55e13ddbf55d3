//! Node command - run the VPN node.
//!
//! Startup:
//!
//! - Loading configuration from defaults, env, config file, and CLI
//! - Validating the backend URL and provider wallet
//! - Bringing the tunnel interface up and restoring persisted peers
//! - Announcing the node, then serving the peer API and running the usage
//!   and heartbeat loops until shutdown is requested
//!
//! Shutdown (SIGINT/SIGTERM or a critical task failure) runs in a fixed
//! order, see [`NodeServices::shutdown`].

use crate::cli::NodeArgs;
use crate::config::NodeConfig;
use eyre::{Result, WrapErr};
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use wayfare_node_api::ApiState;
use wayfare_node_core::constants::DEFAULT_TASK_SHUTDOWN_TIMEOUT_SECS;
use wayfare_node_core::dirs::DataDirs;
use wayfare_node_core::metrics::{install_prometheus_recorder, serve_metrics};
use wayfare_peers::{
    AddressAllocator, FilePeerStore, MemoryPeerStore, PeerArgs, PeerRegistry, PeerStore,
};
use wayfare_tasks::{Shutdown, TaskManager};
use wayfare_tunnel::{TunnelController, WgController};
use wayfare_usage::{
    Heartbeat, HeartbeatService, HttpBackend, NodeAnnouncement, ProviderIdentity,
    SettlementBackend, UsageMeter, UsageReporter, UsageService,
};

/// Run the node command
pub async fn run(args: NodeArgs) -> Result<()> {
    let dirs = DataDirs::new(&args.datadir)?;
    info!("Data directory: {}", dirs.root.display());

    // Load configuration (defaults < env < config file < CLI)
    let default_config = dirs.config_file();
    let config_path = match args.config.as_deref() {
        Some(path) => Some(path),
        None => default_config.exists().then_some(default_config.as_path()),
    };
    let config = NodeConfig::load(config_path, &NodeConfig::from_args(&args))?;
    let required = config.required()?;
    log_node_config(&config);

    let task_manager = TaskManager::current();
    let executor = task_manager.executor();

    if config.metrics.enabled {
        let handle = install_prometheus_recorder()?;
        let addr = config.metrics.socket_addr();
        executor.spawn_with_graceful_shutdown("metrics", move |shutdown| async move {
            if let Err(err) = serve_metrics(addr, handle, shutdown).await {
                error!(%err, "Metrics endpoint failed");
            }
        });
    }

    let tunnel: Arc<dyn TunnelController> = Arc::new(WgController::from_args(&config.tunnel));
    tunnel
        .bring_up()
        .await
        .wrap_err_with(|| format!("Failed to bring up interface {}", config.tunnel.interface))?;
    let server_key = tunnel
        .interface_public_key()
        .await
        .wrap_err("Failed to read interface public key")?;
    info!(interface = %config.tunnel.interface, public_key = %server_key, "Tunnel interface up");

    let store: Arc<dyn PeerStore> = if config.peers.ephemeral {
        info!("Peer state is ephemeral");
        Arc::new(MemoryPeerStore::new())
    } else {
        let peers_file = dirs.peers_file();
        let store = FilePeerStore::new_with_create_dir(&peers_file)
            .wrap_err_with(|| format!("Failed to open peer store: {}", peers_file.display()))?;
        info!("Peer store: {}", peers_file.display());
        Arc::new(store)
    };

    let allocator = AddressAllocator::new(config.tunnel.subnet)?;
    let registry = Arc::new(PeerRegistry::new(allocator, tunnel.clone(), store));
    registry.restore().await.wrap_err("Failed to restore peers")?;

    let backend = HttpBackend::new(&required.backend_url, &config.backend)?;
    info!(url = %backend.base_url(), "Registration backend");

    let delivery_timeout = config.backend.delivery_timeout();
    let announcement = NodeAnnouncement::new(
        required.provider_wallet,
        &config.provider,
        config.tunnel.endpoint.clone(),
    );
    let heartbeat = Arc::new(Heartbeat::new(backend.clone(), announcement, delivery_timeout));
    // Failure is logged; the heartbeat loop keeps trying.
    heartbeat.announce().await.ok();

    let meter = Arc::new(UsageMeter::new(
        registry.clone(),
        tunnel.clone(),
        ProviderIdentity {
            wallet: required.provider_wallet,
            region: config.provider.region.clone(),
        },
    ));
    let reporter = Arc::new(
        UsageReporter::new(backend, config.usage.max_pending, delivery_timeout)
            .with_max_attempts(config.usage.max_attempts),
    );

    let api_addr = config.api.socket_addr();
    let listener = TcpListener::bind(api_addr)
        .await
        .wrap_err_with(|| format!("Failed to bind peer API on {api_addr}"))?;
    let api_state = ApiState::new(registry.clone(), server_key, config.tunnel.clone());
    executor.spawn_with_graceful_shutdown("peer_api", move |shutdown| async move {
        if let Err(err) = wayfare_node_api::serve(listener, api_state, shutdown).await {
            error!(%err, "Peer API failed");
        }
    });

    let usage = UsageService::new(meter.clone(), reporter.clone(), config.usage.report_interval());
    executor.spawn_with_graceful_shutdown("usage", move |shutdown| usage.run(shutdown));

    let beats = HeartbeatService::new(heartbeat.clone(), config.usage.heartbeat_interval());
    executor.spawn_with_graceful_shutdown("heartbeat", move |shutdown| beats.run(shutdown));

    info!("Node running (press Ctrl+C to stop)");
    wait_for_shutdown(task_manager.shutdown_signal()).await;

    info!("Shutting down");
    if !task_manager
        .graceful_shutdown_with_timeout(Duration::from_secs(DEFAULT_TASK_SHUTDOWN_TIMEOUT_SECS))
        .await
    {
        warn!("Some tasks did not stop in time");
    }

    let services = NodeServices {
        registry,
        tunnel,
        meter,
        reporter,
        heartbeat,
    };
    services.shutdown(&config.peers).await;

    info!("Node shutdown complete");
    Ok(())
}

/// Resolves on SIGINT, SIGTERM, or when a critical task fires shutdown.
async fn wait_for_shutdown(shutdown: Shutdown) {
    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!(%err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
        _ = shutdown.cancelled() => warn!("Shutdown requested by a failed task"),
    }
}

/// Components that take part in the shutdown sequence.
struct NodeServices<B> {
    registry: Arc<PeerRegistry>,
    tunnel: Arc<dyn TunnelController>,
    meter: Arc<UsageMeter>,
    reporter: Arc<UsageReporter<B>>,
    heartbeat: Arc<Heartbeat<B>>,
}

impl<B: SettlementBackend> NodeServices<B> {
    /// Wind the node down once the loops and the API have stopped.
    ///
    /// 1. Close the registry and wait for in-flight mutations
    /// 2. Meter and report the traffic since the last poll
    /// 3. Mark the node offline
    /// 4. Revoke every peer, unless they are retained across restarts
    /// 5. Tear the interface down
    ///
    /// Every step runs even if an earlier one failed.
    async fn shutdown(&self, peers: &PeerArgs) {
        if !self.registry.close(peers.shutdown_timeout()).await {
            warn!("Continuing shutdown with a peer mutation in flight");
        }

        let events = self.meter.poll().await;
        let summary = self.reporter.report(events).await;
        if summary.pending > 0 {
            warn!(undelivered = summary.pending, "Usage left undelivered at shutdown");
        }

        // Failure is logged by the heartbeat itself.
        self.heartbeat.offline().await.ok();

        if peers.retain_on_shutdown {
            info!(live = self.registry.live_count(), "Retaining peers for the next start");
        } else if let Err(err) = self.registry.revoke_all().await {
            error!(%err, "Failed to revoke peers");
        }

        if let Err(err) = self.tunnel.tear_down().await {
            error!(%err, "Failed to tear down interface");
        }
    }
}

/// Log the node configuration for debugging
fn log_node_config(config: &NodeConfig) {
    info!("Tunnel configuration:");
    info!("  Interface: {}", config.tunnel.interface);
    info!("  Subnet: {}", config.tunnel.subnet);
    info!("  Endpoint: {}", config.tunnel.endpoint);

    info!("Provider configuration:");
    info!("  Region: {}", config.provider.region);
    info!("  Price per GB: {}", config.provider.price_per_gb);
    info!("  Capacity: {} Mbps", config.provider.capacity_mbps);

    info!(
        "Usage poll every {:?}, heartbeat every {:?}",
        config.usage.report_interval(),
        config.usage.heartbeat_interval()
    );
    info!("Peer API: {}", config.api.socket_addr());

    if config.metrics.enabled {
        info!("Metrics: {}", config.metrics.socket_addr());
    }
}
