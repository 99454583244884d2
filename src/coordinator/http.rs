//! HTTP API of a node
//!
//! Every operation is a query-parameter endpoint:
//! - `/put`, `/set`: coordinate a write (201 Created)
//! - `/get`: coordinate a read
//! - `/replicate`, `/getReplica` (alias `/replica_read`): inbound replica RPCs
//! - `/local_read`: raw local state, no simulated latency
//! - `/config`: override N, W, R for subsequent operations
//! - `/health`, `/metrics`

use crate::common::tracing_middleware::request_tracing_middleware;
use crate::common::{Error, QuorumUpdate, Result, RuntimeConfig, METRICS};
use crate::coordinator::read::ReadCoordinator;
use crate::coordinator::replica_client::{
    HttpReplicaClient, ReplicaClient, ENDPOINT_REPLICATE, ENDPOINT_REPLICA_READ,
};
use crate::coordinator::write::WriteCoordinator;
use crate::replica::{Entry, ReplicaService};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;

/// Operations carry their arguments in the query string
const MAX_BODY_BYTES: usize = 64 * 1024;

/// Shared handler state
pub struct NodeState<C: ReplicaClient = HttpReplicaClient> {
    pub replica: Arc<ReplicaService>,
    pub writes: Arc<WriteCoordinator<C>>,
    pub reads: Arc<ReadCoordinator<C>>,
    pub config: RuntimeConfig,
}

impl<C: ReplicaClient> Clone for NodeState<C> {
    fn clone(&self) -> Self {
        Self {
            replica: self.replica.clone(),
            writes: self.writes.clone(),
            reads: self.reads.clone(),
            config: self.config.clone(),
        }
    }
}

impl<C: ReplicaClient> NodeState<C> {
    /// Wire both coordinators to one replica and one peer client.
    pub fn new(replica: Arc<ReplicaService>, client: Arc<C>, config: RuntimeConfig) -> Self {
        Self {
            writes: Arc::new(WriteCoordinator::new(
                replica.clone(),
                client.clone(),
                config.clone(),
            )),
            reads: Arc::new(ReadCoordinator::new(replica.clone(), client, config.clone())),
            replica,
            config,
        }
    }
}

#[derive(Debug, Deserialize)]
struct KeyQuery {
    key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WriteQuery {
    key: Option<String>,
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReplicateQuery {
    key: Option<String>,
    value: Option<String>,
    timestamp: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ConfigQuery {
    #[serde(rename = "N")]
    n: Option<String>,
    #[serde(rename = "W")]
    w: Option<String>,
    #[serde(rename = "R")]
    r: Option<String>,
}

fn required_key(key: Option<String>) -> Result<String> {
    match key {
        Some(key) if !key.is_empty() => Ok(key),
        _ => Err(Error::InvalidRequest("key required".into())),
    }
}

pub fn create_router<C: ReplicaClient>(state: NodeState<C>) -> Router {
    Router::new()
        // Client operations
        .route("/put", get(put_value::<C>).post(put_value::<C>))
        .route("/set", get(put_value::<C>).post(put_value::<C>))
        .route("/get", get(get_value::<C>).post(get_value::<C>))
        // Replica RPCs
        .route(ENDPOINT_REPLICATE, get(replicate::<C>).post(replicate::<C>))
        .route(ENDPOINT_REPLICA_READ, get(replica_read::<C>))
        .route("/replica_read", get(replica_read::<C>))
        .route("/local_read", get(local_read::<C>))
        // Runtime reconfiguration
        .route("/config", get(reconfigure::<C>).post(reconfigure::<C>))
        // Observability
        .route("/health", get(health::<C>))
        .route("/metrics", get(metrics))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(middleware::from_fn(request_tracing_middleware))
                .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES)),
        )
}

/// Coordinate a write; a missing value is the empty string
async fn put_value<C: ReplicaClient>(
    State(state): State<NodeState<C>>,
    Query(query): Query<WriteQuery>,
) -> Result<StatusCode> {
    let key = required_key(query.key)?;
    state
        .writes
        .write(&key, query.value.unwrap_or_default())
        .await?;
    Ok(StatusCode::CREATED)
}

async fn get_value<C: ReplicaClient>(
    State(state): State<NodeState<C>>,
    Query(query): Query<KeyQuery>,
) -> Result<Json<Entry>> {
    let key = required_key(query.key)?;
    Ok(Json(state.reads.read(&key).await?))
}

async fn replicate<C: ReplicaClient>(
    State(state): State<NodeState<C>>,
    Query(query): Query<ReplicateQuery>,
) -> Result<StatusCode> {
    state
        .replica
        .receive_replicate(
            query.key.as_deref().unwrap_or_default(),
            query.value.unwrap_or_default(),
            query.timestamp.as_deref().unwrap_or_default(),
        )
        .await?;
    Ok(StatusCode::OK)
}

async fn replica_read<C: ReplicaClient>(
    State(state): State<NodeState<C>>,
    Query(query): Query<KeyQuery>,
) -> Result<Json<Entry>> {
    let key = required_key(query.key)?;
    Ok(Json(state.replica.receive_replica_read(&key).await?))
}

async fn local_read<C: ReplicaClient>(
    State(state): State<NodeState<C>>,
    Query(query): Query<KeyQuery>,
) -> Result<Json<Entry>> {
    let key = required_key(query.key)?;
    Ok(Json(state.replica.receive_local_read(&key)?))
}

/// Values that are not non-negative integers keep the current setting.
async fn reconfigure<C: ReplicaClient>(
    State(state): State<NodeState<C>>,
    Query(query): Query<ConfigQuery>,
) -> impl IntoResponse {
    let update = QuorumUpdate::from_raw(query.n.as_deref(), query.w.as_deref(), query.r.as_deref());
    let view = state.config.reconfigure(update);
    tracing::info!(n = view.n, w = view.w, r = view.r, "Quorum reconfigured");
    format!("reconfigured to N={} W={} R={}\n", view.n, view.w, view.r)
}

async fn health<C: ReplicaClient>(State(state): State<NodeState<C>>) -> impl IntoResponse {
    let view = state.config.snapshot();
    Json(json!({
        "status": "ok",
        "role": view.role,
        "coordinator": view.is_write_coordinator(),
        "n": view.n,
        "r": view.r,
        "w": view.w,
        "peers": view.peers,
        "keys": state.replica.store().len(),
    }))
}

async fn metrics() -> impl IntoResponse {
    (
        [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        METRICS.to_prometheus(),
    )
}
