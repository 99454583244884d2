//! # quorumkv
//!
//! A tunable-consistency replicated key-value store with Dynamo-style
//! quorums:
//! - N nodes, a write quorum W and a read quorum R, changeable at runtime
//! - Designated-leader or leaderless (W == N) write coordination
//! - Last-write-wins reconciliation on coordinator timestamps
//! - Simulated replica latency to make replication windows observable
//!
//! ## Architecture

#![allow(clippy::result_large_err)]
//!
//! ```text
//!            client write / read
//!                    │
//!          ┌─────────▼──────────┐
//!          │  Node (leader or   │
//!          │  leaderless peer)  │
//!          │  Write/Read coord. │
//!          └──┬──────────────┬──┘
//!   /replicate│              │/getReplica
//!   ┌─────────▼──┐      ┌────▼───────┐
//!   │  Peer B    │      │  Peer C    │
//!   │ EntryStore │      │ EntryStore │
//!   └────────────┘      └────────────┘
//! ```
//!
//! ## Usage
//!
//! ### Start a three-node cluster with a leader
//! ```bash
//! quorumkv-node serve --port 8001 --leader -N 3 -W 3 -R 1 --peers localhost:8002,localhost:8003
//! quorumkv-node serve --port 8002 -N 3 -W 3 -R 1 --peers localhost:8001,localhost:8003
//! quorumkv-node serve --port 8003 -N 3 -W 3 -R 1 --peers localhost:8001,localhost:8002
//! ```
//!
//! ### Use the CLI
//! ```bash
//! quorumkv --node http://localhost:8001 put foo bar
//! quorumkv --node http://localhost:8002 get foo
//! quorumkv --node http://localhost:8003 local-read foo
//! quorumkv --node http://localhost:8001 config -W 1 -R 2
//! quorumkv --node http://localhost:8001 probe --nodes localhost:8002,localhost:8003
//! ```

pub mod common;
pub mod coordinator;
pub mod ops;
pub mod replica;

// Re-export commonly used types
pub use common::{Error, NodeConfig, Result};
pub use coordinator::Node;
pub use replica::Entry;

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
