//! Scripted [`ReplicaClient`] for coordinator unit tests

use crate::common::{Error, Result};
use crate::coordinator::replica_client::ReplicaClient;
use crate::replica::Entry;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// How one fake peer behaves
#[derive(Debug, Clone, Default)]
pub(crate) struct MockPeer {
    /// Answer replicate RPCs with success
    pub ack: bool,
    /// What a replica read returns; `None` is a 404
    pub entry: Option<Entry>,
    /// Latency before answering
    pub delay: Duration,
}

impl MockPeer {
    pub fn acking() -> Self {
        Self {
            ack: true,
            ..Default::default()
        }
    }

    pub fn refusing() -> Self {
        Self::default()
    }

    pub fn holding(entry: Entry) -> Self {
        Self {
            ack: true,
            entry: Some(entry),
            ..Default::default()
        }
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// Peers not registered behave as unreachable.
#[derive(Debug, Default)]
pub(crate) struct MockReplicaClient {
    peers: HashMap<String, MockPeer>,
    replicated: Mutex<Vec<(String, String, Entry)>>,
}

impl MockReplicaClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_peer(mut self, addr: &str, peer: MockPeer) -> Self {
        self.peers.insert(addr.to_string(), peer);
        self
    }

    /// Entries a peer acknowledged, in arrival order
    pub fn replicated_to(&self, peer: &str) -> Vec<Entry> {
        self.replicated
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _, _)| p == peer)
            .map(|(_, _, e)| e.clone())
            .collect()
    }
}

#[async_trait]
impl ReplicaClient for MockReplicaClient {
    async fn replicate(&self, peer: &str, key: &str, entry: &Entry) -> bool {
        let Some(mock) = self.peers.get(peer) else {
            return false;
        };
        tokio::time::sleep(mock.delay).await;
        if mock.ack {
            self.replicated
                .lock()
                .unwrap()
                .push((peer.to_string(), key.to_string(), entry.clone()));
        }
        mock.ack
    }

    async fn replica_read(&self, peer: &str, key: &str) -> Result<Entry> {
        let Some(mock) = self.peers.get(peer) else {
            return Err(Error::PeerUnreachable {
                peer: peer.to_string(),
                reason: "connection refused".into(),
            });
        };
        tokio::time::sleep(mock.delay).await;
        mock.entry
            .clone()
            .ok_or_else(|| Error::NotFound(key.to_string()))
    }
}
