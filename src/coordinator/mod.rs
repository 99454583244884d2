//! Request coordination for a quorumkv node
//!
//! The coordinator is responsible for:
//! - Write orchestration (local apply, replicate fan-out, W acknowledgments)
//! - Read orchestration (first-R replica responses, last-write-wins merge)
//! - Outbound replica RPCs
//! - The HTTP surface and server lifecycle

pub mod http;
pub mod read;
pub mod replica_client;
pub mod server;
pub mod write;

#[cfg(test)]
pub(crate) mod mock;

pub use http::{create_router, NodeState};
pub use read::ReadCoordinator;
pub use replica_client::{HttpReplicaClient, ReplicaClient};
pub use server::Node;
pub use write::{BackgroundReplication, Replication, WriteCoordinator, WriteReceipt};
