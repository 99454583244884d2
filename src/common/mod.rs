//! Common utilities and types shared across quorumkv

pub mod config;
pub mod error;
pub mod metrics;
pub mod tracing_middleware;
pub mod utils;

pub use config::{ClusterView, NodeConfig, NodeRole, QuorumUpdate, RuntimeConfig};
pub use error::{Error, Result};
pub use metrics::METRICS;
pub use utils::{parse_duration, parse_peers, peer_base_url, timestamp_now_nanos};
