//! Replica side of a node
//!
//! Holds the node's versioned entries and answers the inbound replication
//! RPCs (replicate, replica read, local read) issued by coordinators.

pub mod service;
pub mod store;

pub use service::ReplicaService;
pub use store::{Entry, EntryStore};
