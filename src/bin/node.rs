//! Node binary

use clap::{Parser, Subcommand};
use quorumkv::common::{parse_duration, NodeConfig, NodeRole};
use quorumkv::Node;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "quorumkv-node")]
#[command(about = "quorumkv replica node with N/R/W quorum coordination")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a node
    Serve {
        /// TOML config file (defaults to ./quorumkv.toml when present)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Bind address for HTTP
        #[arg(long)]
        bind: Option<SocketAddr>,

        /// Listen port (overrides the port of --bind)
        #[arg(long)]
        port: Option<u16>,

        /// Peer addresses (comma-separated host:port)
        #[arg(long, value_delimiter = ',')]
        peers: Option<Vec<String>>,

        /// Act as the designated write coordinator
        #[arg(long)]
        leader: bool,

        /// Nominal cluster size
        #[arg(short = 'N', long = "cluster-size")]
        n: Option<usize>,

        /// Read quorum
        #[arg(short = 'R', long = "read-quorum")]
        r: Option<usize>,

        /// Write quorum
        #[arg(short = 'W', long = "write-quorum")]
        w: Option<usize>,

        /// Simulated delay before applying a write (e.g. 10ms)
        #[arg(long, value_parser = parse_duration)]
        write_delay: Option<Duration>,

        /// Simulated delay before serving a replica read (e.g. 5ms)
        #[arg(long, value_parser = parse_duration)]
        read_delay: Option<Duration>,

        /// Bound each peer RPC; a timed-out RPC counts as a non-ack
        #[arg(long, value_parser = parse_duration)]
        peer_timeout: Option<Duration>,

        /// Log level when RUST_LOG is unset
        #[arg(long)]
        log_level: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            config,
            bind,
            port,
            peers,
            leader,
            n,
            r,
            w,
            write_delay,
            read_delay,
            peer_timeout,
            log_level,
        } => {
            // File and environment first, command line has priority
            let mut node_config = NodeConfig::load(config.as_deref())?;
            if let Some(bind) = bind {
                node_config.bind_addr = bind;
            }
            if let Some(port) = port {
                node_config.bind_addr.set_port(port);
            }
            if let Some(peers) = peers {
                node_config.peers = quorumkv::common::parse_peers(&peers.join(","));
            }
            if leader {
                node_config.role = NodeRole::Leader;
            }
            if let Some(n) = n {
                node_config.n = n;
            }
            if let Some(r) = r {
                node_config.r = r;
            }
            if let Some(w) = w {
                node_config.w = w;
            }
            if let Some(delay) = write_delay {
                node_config.write_delay_ms = delay.as_millis() as u64;
            }
            if let Some(delay) = read_delay {
                node_config.read_delay_ms = delay.as_millis() as u64;
            }
            if let Some(timeout) = peer_timeout {
                node_config.peer_timeout_ms = Some(timeout.as_millis() as u64);
            }
            if let Some(level) = log_level {
                node_config.log_level = level;
            }
            node_config.validate()?;

            tracing_subscriber::registry()
                .with(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| node_config.log_level.clone().into()),
                )
                .with(tracing_subscriber::fmt::layer())
                .init();

            let node = Node::new(node_config)?;
            node.serve().await?;
        }
    }

    Ok(())
}
