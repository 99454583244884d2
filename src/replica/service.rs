//! Node-local replica operations
//!
//! Wraps the [`EntryStore`] with the simulated processing latency that makes
//! replication and quorum windows observable: a write delay before any apply
//! and a read delay before any quorum read. `local_read` skips the delay and
//! reports the instantaneous state.

use crate::common::{Error, Result, METRICS};
use crate::replica::store::{Entry, EntryStore};
use std::sync::Arc;
use std::time::Duration;

pub struct ReplicaService {
    store: Arc<EntryStore>,
    write_delay: Duration,
    read_delay: Duration,
}

impl ReplicaService {
    pub fn new(store: Arc<EntryStore>, write_delay: Duration, read_delay: Duration) -> Self {
        Self {
            store,
            write_delay,
            read_delay,
        }
    }

    /// No simulated latency; for tests and embedded use
    pub fn immediate(store: Arc<EntryStore>) -> Self {
        Self::new(store, Duration::ZERO, Duration::ZERO)
    }

    pub fn store(&self) -> &Arc<EntryStore> {
        &self.store
    }

    /// Apply an entry after the write delay.
    pub async fn apply(&self, key: &str, entry: Entry) -> bool {
        pause(self.write_delay).await;
        self.store.apply_if_newer(key, entry)
    }

    /// Read after the read delay.
    pub async fn read(&self, key: &str) -> Option<Entry> {
        pause(self.read_delay).await;
        self.store.get(key)
    }

    /// Inbound replicate RPC. Validates the arguments, then applies if newer.
    /// Both outcomes of the apply are accepted from the sender's side; the
    /// returned flag only says whether the store changed.
    pub async fn receive_replicate(&self, key: &str, value: String, timestamp: &str) -> Result<bool> {
        let timestamp: i64 = match timestamp.trim().parse() {
            Ok(ts) if !key.is_empty() => ts,
            _ => return Err(Error::InvalidRequest("invalid replicate args".into())),
        };

        let applied = self.apply(key, Entry::new(value, timestamp)).await;
        if applied {
            METRICS.replicas_applied.inc();
            tracing::debug!(key, timestamp, "Replica applied");
        } else {
            METRICS.replicas_stale.inc();
            tracing::debug!(key, timestamp, "Replica ignored, not newer");
        }
        Ok(applied)
    }

    /// Inbound replica read on behalf of a remote read coordinator.
    pub async fn receive_replica_read(&self, key: &str) -> Result<Entry> {
        self.read(key)
            .await
            .ok_or_else(|| Error::NotFound(key.to_string()))
    }

    /// Raw local state, without simulated latency.
    pub fn receive_local_read(&self, key: &str) -> Result<Entry> {
        self.store
            .get(key)
            .ok_or_else(|| Error::NotFound(key.to_string()))
    }
}

async fn pause(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}
