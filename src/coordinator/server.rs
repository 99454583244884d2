//! Node server

use crate::common::{NodeConfig, Result, RuntimeConfig};
use crate::coordinator::http::{create_router, NodeState};
use crate::coordinator::replica_client::HttpReplicaClient;
use crate::replica::{EntryStore, ReplicaService};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

pub struct Node {
    config: NodeConfig,
    state: NodeState,
}

impl Node {
    pub fn new(config: NodeConfig) -> Result<Self> {
        let store = Arc::new(EntryStore::new());
        let replica = Arc::new(ReplicaService::new(
            store,
            config.write_delay(),
            config.read_delay(),
        ));
        let client = Arc::new(HttpReplicaClient::new(config.peer_timeout())?);
        let state = NodeState::new(replica, client, RuntimeConfig::from(&config));
        Ok(Self { config, state })
    }

    /// Handles onto the running node (store, coordinators, runtime config)
    pub fn state(&self) -> &NodeState {
        &self.state
    }

    /// Bind the configured address and serve until Ctrl-C.
    pub async fn serve(self) -> Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve_on(listener, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
        })
        .await
    }

    /// Serve on an already bound listener until `shutdown` resolves, then
    /// let in-flight background replication finish.
    pub async fn serve_on<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let view = self.state.config.snapshot();
        tracing::info!("Starting quorumkv node ({})", view.role);
        tracing::info!("  HTTP API: {}", listener.local_addr()?);
        tracing::info!("  Peers: {:?}", view.peers);
        tracing::info!("  N={} R={} W={}", view.n, view.r, view.w);
        tracing::info!(
            "  Delays: write={:?} read={:?}",
            self.config.write_delay(),
            self.config.read_delay()
        );
        if view.is_leaderless() {
            tracing::info!("  Leaderless mode: this node coordinates writes (W == N)");
        }

        let writes = self.state.writes.clone();
        let router = create_router(self.state);

        tracing::info!("✓ Node ready");
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await?;

        let pending = writes.background().in_flight();
        if pending > 0 {
            tracing::info!(pending, "Waiting for background replication");
        }
        writes.wait_for_replication().await;
        tracing::info!("Node stopped");
        Ok(())
    }
}
