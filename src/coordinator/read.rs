//! Read coordination
//!
//! R <= 1 reads the local store. Otherwise the local store and every peer are
//! queried concurrently and the first R successful responses are merged by
//! highest timestamp. Which replicas make up those R depends on who answers
//! first, so two reads under load may pick different winners.

use crate::common::{Error, Result, RuntimeConfig, METRICS};
use crate::coordinator::replica_client::ReplicaClient;
use crate::replica::{Entry, ReplicaService};
use futures_util::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct ReadCoordinator<C: ReplicaClient> {
    replica: Arc<ReplicaService>,
    client: Arc<C>,
    config: RuntimeConfig,
}

impl<C: ReplicaClient> ReadCoordinator<C> {
    pub fn new(replica: Arc<ReplicaService>, client: Arc<C>, config: RuntimeConfig) -> Self {
        Self {
            replica,
            client,
            config,
        }
    }

    /// Coordinate a client read.
    pub async fn read(&self, key: &str) -> Result<Entry> {
        if key.is_empty() {
            return Err(Error::InvalidRequest("key required".into()));
        }

        let view = self.config.snapshot();
        let result = if view.reads_local_only() {
            self.replica
                .read(key)
                .await
                .ok_or_else(|| Error::NotFound(key.to_string()))
        } else {
            self.quorum_read(key, &view.peers, view.r).await
        };

        match &result {
            Ok(_) => METRICS.reads_served.inc(),
            Err(Error::NotFound(_)) => METRICS.reads_not_found.inc(),
            Err(_) => {}
        }
        result
    }

    async fn quorum_read(&self, key: &str, peers: &[String], r: usize) -> Result<Entry> {
        let mut pending = FuturesUnordered::new();

        let replica = self.replica.clone();
        let local_key = key.to_string();
        pending.push(tokio::spawn(async move {
            replica
                .read(&local_key)
                .await
                .ok_or(Error::NotFound(local_key))
        }));

        for peer in peers {
            let client = self.client.clone();
            let peer = peer.clone();
            let key = key.to_string();
            pending.push(tokio::spawn(async move {
                client.replica_read(&peer, &key).await.map_err(|e| {
                    if e.is_peer_failure() {
                        warn!(peer = %peer, key = %key, error = %e, "Replica read failed");
                    } else {
                        debug!(peer = %peer, key = %key, error = %e, "Replica read found nothing");
                    }
                    e
                })
            }));
        }

        let mut responses = 0usize;
        let mut freshest: Option<Entry> = None;
        while let Some(joined) = pending.next().await {
            match joined {
                Ok(Ok(entry)) => {
                    responses += 1;
                    if freshest.as_ref().map_or(true, |best| entry.supersedes(best)) {
                        freshest = Some(entry);
                    }
                    if responses >= r {
                        break;
                    }
                }
                Ok(Err(_)) | Err(_) => METRICS.replica_read_failures.inc(),
            }
        }
        // Tasks still in `pending` are detached, not aborted, when it drops

        match freshest {
            Some(entry) => {
                info!(key, responses, r, timestamp = entry.timestamp, "Quorum read resolved");
                Ok(entry)
            }
            None => Err(Error::NotFound(key.to_string())),
        }
    }
}
