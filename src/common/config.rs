//! Configuration for quorumkv nodes
//!
//! Startup parameters live in [`NodeConfig`]. The quorum parameters that can
//! change at runtime (N, R, W) together with the role and peer list form an
//! immutable [`ClusterView`]; [`RuntimeConfig`] hands out snapshots of the
//! current view and swaps in a new one on reconfiguration.

use crate::common::error::{Error, Result};
use crate::common::utils::parse_peers;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

/// Config file looked up in the working directory when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "quorumkv";

/// Prefix for environment overrides (`QUORUMKV_W=3`)
pub const ENV_PREFIX: &str = "QUORUMKV";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    /// Designated write coordinator
    Leader,
    /// Replica; coordinates writes only in leaderless mode (W == N)
    #[default]
    Peer,
}

impl std::fmt::Display for NodeRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeRole::Leader => write!(f, "leader"),
            NodeRole::Peer => write!(f, "peer"),
        }
    }
}

/// Node startup configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Bind address for the HTTP API
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,

    /// Leader or peer
    #[serde(default)]
    pub role: NodeRole,

    /// Other replicas (`host:port`), in fan-out order
    #[serde(default)]
    pub peers: Vec<String>,

    /// Nominal cluster size
    #[serde(default = "default_quorum")]
    pub n: usize,

    /// Read quorum
    #[serde(default = "default_quorum")]
    pub r: usize,

    /// Write quorum
    #[serde(default = "default_quorum")]
    pub w: usize,

    /// Simulated processing latency before a write touches the store
    #[serde(default = "default_write_delay")]
    pub write_delay_ms: u64,

    /// Simulated processing latency before a replica read touches the store
    #[serde(default = "default_read_delay")]
    pub read_delay_ms: u64,

    /// Upper bound on a single peer RPC. Unset means wait for the transport.
    #[serde(default)]
    pub peer_timeout_ms: Option<u64>,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8000))
}
fn default_quorum() -> usize {
    1
}
fn default_write_delay() -> u64 {
    10
}
fn default_read_delay() -> u64 {
    5
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            role: NodeRole::default(),
            peers: Vec::new(),
            n: default_quorum(),
            r: default_quorum(),
            w: default_quorum(),
            write_delay_ms: default_write_delay(),
            read_delay_ms: default_read_delay(),
            peer_timeout_ms: None,
            log_level: default_log_level(),
        }
    }
}

impl NodeConfig {
    /// Load configuration from an optional TOML file and `QUORUMKV_*`
    /// environment variables. Missing sources fall back to defaults; an
    /// explicitly named file must exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let settings = config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("peers"),
            )
            .build()?;

        let mut node: NodeConfig = settings.try_deserialize()?;
        node.peers = parse_peers(&node.peers.join(","));
        node.validate()?;
        Ok(node)
    }

    /// Sanity checks applied once at startup
    pub fn validate(&self) -> Result<()> {
        if self.n == 0 {
            return Err(Error::InvalidConfig("N must be at least 1".into()));
        }
        if let Some(own) = self
            .peers
            .iter()
            .find(|p| p.as_str() == self.bind_addr.to_string())
        {
            return Err(Error::InvalidConfig(format!(
                "peer list contains this node's own address {}",
                own
            )));
        }
        Ok(())
    }

    pub fn write_delay(&self) -> Duration {
        Duration::from_millis(self.write_delay_ms)
    }

    pub fn read_delay(&self) -> Duration {
        Duration::from_millis(self.read_delay_ms)
    }

    pub fn peer_timeout(&self) -> Option<Duration> {
        self.peer_timeout_ms.map(Duration::from_millis)
    }

    /// Initial cluster view for this node
    pub fn cluster_view(&self) -> ClusterView {
        ClusterView {
            role: self.role,
            peers: self.peers.clone(),
            n: self.n,
            r: self.r,
            w: self.w,
        }
    }
}

/// Immutable snapshot of the parameters every coordinator operation consults
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClusterView {
    pub role: NodeRole,
    pub peers: Vec<String>,
    pub n: usize,
    pub r: usize,
    pub w: usize,
}

impl ClusterView {
    /// Leaders always coordinate writes; peers only when W == N.
    pub fn is_write_coordinator(&self) -> bool {
        self.role == NodeRole::Leader || self.is_leaderless()
    }

    pub fn is_leaderless(&self) -> bool {
        self.role == NodeRole::Peer && self.w == self.n
    }

    /// Writes return after the local apply and replicate in the background.
    pub fn is_fire_and_forget(&self) -> bool {
        self.w <= 1
    }

    /// Reads are served from the local store without fan-out.
    pub fn reads_local_only(&self) -> bool {
        self.r <= 1
    }
}

/// Partial N/W/R override; `None` keeps the current value
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QuorumUpdate {
    pub n: Option<usize>,
    pub w: Option<usize>,
    pub r: Option<usize>,
}

impl QuorumUpdate {
    /// Build an update from raw query values. Anything that is not a
    /// non-negative integer is dropped.
    pub fn from_raw(n: Option<&str>, w: Option<&str>, r: Option<&str>) -> Self {
        let parse = |v: Option<&str>| v.and_then(|s| s.trim().parse::<usize>().ok());
        Self {
            n: parse(n),
            w: parse(w),
            r: parse(r),
        }
    }
}

/// Shared handle to the current [`ClusterView`]
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    current: Arc<RwLock<Arc<ClusterView>>>,
}

impl RuntimeConfig {
    pub fn new(view: ClusterView) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(view))),
        }
    }

    /// The view in force right now. Holders keep it for the whole operation.
    pub fn snapshot(&self) -> Arc<ClusterView> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Apply an override and publish the result for subsequent operations.
    pub fn reconfigure(&self, update: QuorumUpdate) -> Arc<ClusterView> {
        let mut current = self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let mut next = ClusterView::clone(&current);
        if let Some(n) = update.n {
            next.n = n;
        }
        if let Some(w) = update.w {
            next.w = w;
        }
        if let Some(r) = update.r {
            next.r = r;
        }
        let next = Arc::new(next);
        *current = next.clone();
        next
    }
}

impl From<&NodeConfig> for RuntimeConfig {
    fn from(config: &NodeConfig) -> Self {
        Self::new(config.cluster_view())
    }
}
