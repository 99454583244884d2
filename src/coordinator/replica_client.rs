//! Outbound replica RPCs
//!
//! One call, one attempt: no retries. A transport failure or any non-success
//! status is a non-acknowledgment for the caller to count, never an error it
//! surfaces to its own client.

use crate::common::{peer_base_url, Error, Result};
use crate::replica::Entry;
use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;

/// Path of the inbound replicate endpoint
pub const ENDPOINT_REPLICATE: &str = "/replicate";
/// Path of the inbound replica read endpoint
pub const ENDPOINT_REPLICA_READ: &str = "/getReplica";

/// RPCs a coordinator issues against one peer.
///
/// Coordinators are generic over this so tests can script peer behaviour.
#[async_trait]
pub trait ReplicaClient: Send + Sync + 'static {
    /// Push one versioned write to `peer`; true only on explicit success.
    async fn replicate(&self, peer: &str, key: &str, entry: &Entry) -> bool;

    /// Fetch `peer`'s current entry for `key`.
    async fn replica_read(&self, peer: &str, key: &str) -> Result<Entry>;
}

/// [`ReplicaClient`] speaking the node HTTP API
#[derive(Debug, Clone)]
pub struct HttpReplicaClient {
    client: reqwest::Client,
}

impl HttpReplicaClient {
    /// Build a client. Without a timeout a silent peer is waited on for as
    /// long as the transport keeps the connection.
    pub fn new(timeout: Option<Duration>) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
        })
    }

    fn unreachable(peer: &str, err: impl std::fmt::Display) -> Error {
        Error::PeerUnreachable {
            peer: peer.to_string(),
            reason: err.to_string(),
        }
    }
}

#[async_trait]
impl ReplicaClient for HttpReplicaClient {
    async fn replicate(&self, peer: &str, key: &str, entry: &Entry) -> bool {
        let url = format!("{}{}", peer_base_url(peer), ENDPOINT_REPLICATE);
        let timestamp = entry.timestamp.to_string();
        let result = self
            .client
            .post(&url)
            .query(&[
                ("key", key),
                ("value", entry.value.as_str()),
                ("timestamp", timestamp.as_str()),
            ])
            .send()
            .await;

        match result {
            Ok(resp) if resp.status() == StatusCode::OK => true,
            Ok(resp) => {
                tracing::warn!(peer, key, status = %resp.status(), "Replicate refused");
                false
            }
            Err(e) => {
                tracing::warn!(peer, key, error = %e, "Replicate failed");
                false
            }
        }
    }

    async fn replica_read(&self, peer: &str, key: &str) -> Result<Entry> {
        let url = format!("{}{}", peer_base_url(peer), ENDPOINT_REPLICA_READ);
        let resp = self
            .client
            .get(&url)
            .query(&[("key", key)])
            .send()
            .await
            .map_err(|e| Self::unreachable(peer, e))?;

        match resp.status() {
            StatusCode::OK => resp
                .json::<Entry>()
                .await
                .map_err(|e| Self::unreachable(peer, e)),
            StatusCode::NOT_FOUND => Err(Error::NotFound(key.to_string())),
            status => Err(Self::unreachable(peer, format!("status {}", status))),
        }
    }
}
