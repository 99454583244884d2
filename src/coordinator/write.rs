//! Write coordination
//!
//! A coordinating node stamps the write with its clock, applies it locally
//! (the first acknowledgment) and fans a replicate RPC out to every peer:
//!
//! - W <= 1: the fan-out is detached and the write returns after the local
//!   apply. Background tasks outlive the request and cannot be cancelled.
//! - W > 1: every peer RPC is awaited; local + peer acks are tallied against W.
//!
//! Nothing is rolled back when the quorum is missed. Data already applied on
//! the coordinator or on acking peers stays there.

use crate::common::{timestamp_now_nanos, Error, Result, RuntimeConfig, METRICS};
use crate::coordinator::replica_client::ReplicaClient;
use crate::replica::{Entry, ReplicaService};
use futures_util::stream::{FuturesUnordered, StreamExt};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

/// How peers were (or are being) brought up to date
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Replication {
    /// Fire-and-forget; peers converge after the response
    Background,
    /// All peer RPCs completed before the response
    Synchronous,
}

/// Successful write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteReceipt {
    pub timestamp: i64,
    /// Local apply plus acknowledging peers known at return time
    pub acks: usize,
    pub replication: Replication,
}

/// Tracks detached replication tasks so a harness or shutdown path can wait
/// for quiescence without the request ever waiting on them.
#[derive(Debug, Clone, Default)]
pub struct BackgroundReplication {
    inner: Arc<BackgroundInner>,
}

#[derive(Debug, Default)]
struct BackgroundInner {
    in_flight: AtomicUsize,
    idle: Notify,
}

struct InFlightGuard(Arc<BackgroundInner>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        METRICS.background_replications.dec();
        if self.0.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

impl BackgroundReplication {
    fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.inner.in_flight.fetch_add(1, Ordering::AcqRel);
        METRICS.background_replications.inc();
        let guard = InFlightGuard(self.inner.clone());
        tokio::spawn(async move {
            let _guard = guard;
            task.await;
        });
    }

    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::Acquire)
    }

    /// Resolve once no background replication is running.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }
}

pub struct WriteCoordinator<C: ReplicaClient> {
    replica: Arc<ReplicaService>,
    client: Arc<C>,
    config: RuntimeConfig,
    background: BackgroundReplication,
}

impl<C: ReplicaClient> WriteCoordinator<C> {
    pub fn new(replica: Arc<ReplicaService>, client: Arc<C>, config: RuntimeConfig) -> Self {
        Self {
            replica,
            client,
            config,
            background: BackgroundReplication::default(),
        }
    }

    pub fn background(&self) -> &BackgroundReplication {
        &self.background
    }

    /// Wait until every fire-and-forget replication has finished.
    pub async fn wait_for_replication(&self) {
        self.background.wait_idle().await;
    }

    /// Coordinate a client write.
    pub async fn write(&self, key: &str, value: impl Into<String>) -> Result<WriteReceipt> {
        if key.is_empty() {
            return Err(Error::InvalidRequest("key required".into()));
        }

        let view = self.config.snapshot();
        if !view.is_write_coordinator() {
            METRICS.writes_rejected.inc();
            return Err(Error::NotCoordinator {
                role: view.role,
                n: view.n,
                w: view.w,
            });
        }

        let entry = Entry::new(value, timestamp_now_nanos());
        self.replica.apply(key, entry.clone()).await;
        let mut acks = 1usize;

        if view.is_fire_and_forget() {
            for peer in &view.peers {
                let client = self.client.clone();
                let peer = peer.clone();
                let key = key.to_string();
                let entry = entry.clone();
                self.background.spawn(async move {
                    if client.replicate(&peer, &key, &entry).await {
                        METRICS.replicate_acks.inc();
                        debug!(peer = %peer, key = %key, "Background replication acknowledged");
                    } else {
                        METRICS.replicate_nacks.inc();
                    }
                });
            }
            METRICS.writes_accepted.inc();
            info!(key, timestamp = entry.timestamp, peers = view.peers.len(), "Write accepted, replicating in background");
            return Ok(WriteReceipt {
                timestamp: entry.timestamp,
                acks,
                replication: Replication::Background,
            });
        }

        let mut pending: FuturesUnordered<_> = view
            .peers
            .iter()
            .map(|peer| {
                let client = self.client.clone();
                let peer = peer.clone();
                let key = key.to_string();
                let entry = entry.clone();
                tokio::spawn(async move { client.replicate(&peer, &key, &entry).await })
            })
            .collect();

        while let Some(joined) = pending.next().await {
            match joined {
                Ok(true) => {
                    acks += 1;
                    METRICS.replicate_acks.inc();
                }
                Ok(false) => METRICS.replicate_nacks.inc(),
                Err(e) => {
                    METRICS.replicate_nacks.inc();
                    warn!(error = %e, "Replication task aborted");
                }
            }
        }

        if acks < view.w {
            METRICS.writes_quorum_not_met.inc();
            warn!(key, acks, w = view.w, "Write quorum not met");
            return Err(Error::QuorumNotMet {
                needed: view.w,
                acked: acks,
            });
        }

        METRICS.writes_accepted.inc();
        info!(key, timestamp = entry.timestamp, acks, w = view.w, "Write accepted");
        Ok(WriteReceipt {
            timestamp: entry.timestamp,
            acks,
            replication: Replication::Synchronous,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{ClusterView, NodeRole, QuorumUpdate};
    use crate::coordinator::mock::{MockPeer, MockReplicaClient};
    use crate::replica::EntryStore;
    use std::time::Duration;

    const B: &str = "node-b:8000";
    const C: &str = "node-c:8000";

    fn coordinator(
        role: NodeRole,
        n: usize,
        w: usize,
        client: MockReplicaClient,
    ) -> (WriteCoordinator<MockReplicaClient>, Arc<EntryStore>, Arc<MockReplicaClient>, RuntimeConfig) {
        let store = Arc::new(EntryStore::new());
        let replica = Arc::new(ReplicaService::immediate(store.clone()));
        let client = Arc::new(client);
        let config = RuntimeConfig::new(ClusterView {
            role,
            peers: vec![B.to_string(), C.to_string()],
            n,
            r: 1,
            w,
        });
        let coord = WriteCoordinator::new(replica, client.clone(), config.clone());
        (coord, store, client, config)
    }

    #[tokio::test]
    async fn test_leader_unanimous_write() {
        let client = MockReplicaClient::new()
            .with_peer(B, MockPeer::acking())
            .with_peer(C, MockPeer::acking());
        let (coord, store, client, _) = coordinator(NodeRole::Leader, 3, 3, client);

        let receipt = coord.write("foo", "bar").await.unwrap();
        assert_eq!(receipt.acks, 3);
        assert_eq!(receipt.replication, Replication::Synchronous);

        let local = store.get("foo").unwrap();
        assert_eq!(local, Entry::new("bar", receipt.timestamp));
        assert_eq!(client.replicated_to(B), vec![local.clone()]);
        assert_eq!(client.replicated_to(C), vec![local]);
    }

    #[tokio::test]
    async fn test_quorum_not_met_keeps_partial_writes() {
        let client = MockReplicaClient::new()
            .with_peer(B, MockPeer::acking())
            .with_peer(C, MockPeer::refusing());
        let (coord, store, client, _) = coordinator(NodeRole::Leader, 3, 3, client);

        let err = coord.write("foo", "bar").await.unwrap_err();
        assert!(matches!(err, Error::QuorumNotMet { needed: 3, acked: 2 }));

        // No rollback: the coordinator and the acking peer keep the write
        assert_eq!(store.get("foo").map(|e| e.value), Some("bar".to_string()));
        assert_eq!(client.replicated_to(B).len(), 1);
    }

    #[tokio::test]
    async fn test_quorum_arithmetic() {
        // (acking peers, W) -> met iff 1 + acking >= W
        for acking in 0..=2usize {
            for w in 2..=4usize {
                let b = if acking >= 1 { MockPeer::acking() } else { MockPeer::refusing() };
                let c = if acking >= 2 { MockPeer::acking() } else { MockPeer::refusing() };
                let client = MockReplicaClient::new().with_peer(B, b).with_peer(C, c);
                let (coord, _, _, _) = coordinator(NodeRole::Leader, 3, w, client);

                let result = coord.write("k", "v").await;
                if 1 + acking >= w {
                    assert_eq!(result.unwrap().acks, 1 + acking, "acking={} w={}", acking, w);
                } else {
                    assert!(
                        matches!(result, Err(Error::QuorumNotMet { needed, acked }) if needed == w && acked == 1 + acking),
                        "acking={} w={}",
                        acking,
                        w
                    );
                }
            }
        }
    }

    #[tokio::test]
    async fn test_unreachable_peer_counts_as_nack() {
        // C is not registered with the mock: every RPC to it fails
        let client = MockReplicaClient::new().with_peer(B, MockPeer::acking());
        let (coord, _, _, _) = coordinator(NodeRole::Leader, 3, 2, client);

        let receipt = coord.write("k", "v").await.unwrap();
        assert_eq!(receipt.acks, 2);
    }

    #[tokio::test]
    async fn test_peer_rejected_unless_leaderless() {
        let client = MockReplicaClient::new()
            .with_peer(B, MockPeer::acking())
            .with_peer(C, MockPeer::acking());
        let (coord, store, _, _) = coordinator(NodeRole::Peer, 3, 2, client);

        let err = coord.write("foo", "bar").await.unwrap_err();
        assert!(matches!(err, Error::NotCoordinator { role: NodeRole::Peer, n: 3, w: 2 }));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_leaderless_write_requires_every_peer() {
        let client = MockReplicaClient::new()
            .with_peer(B, MockPeer::acking())
            .with_peer(C, MockPeer::acking());
        let (coord, _, _, _) = coordinator(NodeRole::Peer, 3, 3, client);
        assert_eq!(coord.write("baz", "qux").await.unwrap().acks, 3);

        let client = MockReplicaClient::new().with_peer(B, MockPeer::acking());
        let (coord, store, _, _) = coordinator(NodeRole::Peer, 3, 3, client);
        assert!(matches!(
            coord.write("baz", "qux").await,
            Err(Error::QuorumNotMet { needed: 3, acked: 2 })
        ));
        assert!(store.get("baz").is_some());
    }

    #[tokio::test]
    async fn test_empty_key_rejected() {
        let (coord, store, _, _) = coordinator(NodeRole::Leader, 1, 1, MockReplicaClient::new());
        assert!(matches!(
            coord.write("", "v").await,
            Err(Error::InvalidRequest(_))
        ));
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fire_and_forget_returns_before_peers() {
        let slow = Duration::from_millis(500);
        let client = MockReplicaClient::new()
            .with_peer(B, MockPeer::acking().after(slow))
            .with_peer(C, MockPeer::acking().after(slow));
        let (coord, store, client, _) = coordinator(NodeRole::Leader, 3, 1, client);

        let receipt = coord.write("foo", "bar").await.unwrap();
        assert_eq!(receipt.replication, Replication::Background);
        assert_eq!(receipt.acks, 1);
        assert!(store.get("foo").is_some());
        assert_eq!(coord.background().in_flight(), 2);
        assert!(client.replicated_to(B).is_empty());

        coord.wait_for_replication().await;
        assert_eq!(coord.background().in_flight(), 0);
        assert_eq!(client.replicated_to(B), vec![Entry::new("bar", receipt.timestamp)]);
        assert_eq!(client.replicated_to(C), vec![Entry::new("bar", receipt.timestamp)]);
    }

    #[tokio::test]
    async fn test_fire_and_forget_ignores_peer_failures() {
        let client = MockReplicaClient::new().with_peer(B, MockPeer::refusing());
        let (coord, _, _, _) = coordinator(NodeRole::Leader, 3, 1, client);

        assert!(coord.write("foo", "bar").await.is_ok());
        coord.wait_for_replication().await;
    }

    #[tokio::test]
    async fn test_reconfigure_applies_to_next_write() {
        let client = MockReplicaClient::new()
            .with_peer(B, MockPeer::acking())
            .with_peer(C, MockPeer::refusing());
        let (coord, _, _, config) = coordinator(NodeRole::Leader, 3, 3, client);

        assert!(coord.write("k", "v1").await.is_err());

        config.reconfigure(QuorumUpdate {
            w: Some(2),
            ..Default::default()
        });
        assert_eq!(coord.write("k", "v2").await.unwrap().acks, 2);
    }

    #[tokio::test]
    async fn test_later_write_supersedes_locally() {
        let client = MockReplicaClient::new()
            .with_peer(B, MockPeer::acking())
            .with_peer(C, MockPeer::acking());
        let (coord, store, _, _) = coordinator(NodeRole::Leader, 3, 3, client);

        let first = coord.write("k", "v1").await.unwrap();
        let second = coord.write("k", "v2").await.unwrap();
        assert!(second.timestamp > first.timestamp);
        assert_eq!(store.get("k"), Some(Entry::new("v2", second.timestamp)));
    }
}
