//! CLI for cluster operations

use anyhow::Context;
use clap::{Parser, Subcommand};
use quorumkv::common::peer_base_url;
use quorumkv::ops::{run_probe, LatencySummary, ProbeConfig};
use quorumkv::Entry;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "quorumkv")]
#[command(about = "quorumkv replicated key-value store CLI")]
#[command(version)]
struct Cli {
    /// Node URL
    #[arg(long, global = true, default_value = "http://localhost:8000")]
    node: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a value through the node
    Put {
        /// Key
        key: String,

        /// Value
        #[arg(default_value = "")]
        value: String,
    },

    /// Read a value through the node's read quorum
    Get {
        /// Key
        key: String,
    },

    /// Show the node's raw local entry, bypassing quorum and delays
    LocalRead {
        /// Key
        key: String,
    },

    /// Override N, W or R on the node
    Config {
        #[arg(short = 'N', long = "cluster-size")]
        n: Option<usize>,

        #[arg(short = 'W', long = "write-quorum")]
        w: Option<usize>,

        #[arg(short = 'R', long = "read-quorum")]
        r: Option<usize>,
    },

    /// Show node role, quorum settings and key count
    Health,

    /// Run a mixed read/write workload and report stale reads
    Probe {
        /// Read nodes (comma-separated, defaults to --node)
        #[arg(long, value_delimiter = ',')]
        nodes: Vec<String>,

        /// Keyspace size
        #[arg(long, default_value = "100")]
        num_keys: usize,

        /// Operations after warm-up
        #[arg(long, default_value = "1000")]
        ops: usize,

        /// Probability of staying on the current key
        #[arg(long, default_value = "0.8")]
        cluster_prob: f64,

        #[arg(long, default_value = "1")]
        write_ratio: u32,

        #[arg(long, default_value = "99")]
        read_ratio: u32,

        /// Write staleness intervals to a CSV file
        #[arg(long)]
        intervals: Option<PathBuf>,

        /// RNG seed
        #[arg(long)]
        seed: Option<u64>,
    },
}

fn print_latency(label: &str, latency: &LatencySummary) {
    println!(
        "  {} latency: p50={:.2}ms p99={:.2}ms max={:.2}ms",
        label, latency.p50_ms, latency.p99_ms, latency.max_ms
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let base = peer_base_url(&cli.node);
    let client = reqwest::Client::new();

    match cli.command {
        Commands::Put { key, value } => {
            let resp = client
                .post(format!("{}/put", base))
                .query(&[("key", key.as_str()), ("value", value.as_str())])
                .send()
                .await
                .context("put request failed")?;
            let status = resp.status();
            if !status.is_success() {
                anyhow::bail!("put failed ({}): {}", status, resp.text().await?.trim());
            }
            println!("✓ {} written", key);
        }

        Commands::Get { key } => {
            let entry = fetch_entry(&client, &format!("{}/get", base), &key).await?;
            println!("{} = {:?} (timestamp {})", key, entry.value, entry.timestamp);
        }

        Commands::LocalRead { key } => {
            let entry = fetch_entry(&client, &format!("{}/local_read", base), &key).await?;
            println!("{} = {:?} (timestamp {})", key, entry.value, entry.timestamp);
        }

        Commands::Config { n, w, r } => {
            let mut query = Vec::new();
            if let Some(n) = n {
                query.push(("N", n.to_string()));
            }
            if let Some(w) = w {
                query.push(("W", w.to_string()));
            }
            if let Some(r) = r {
                query.push(("R", r.to_string()));
            }
            let text = client
                .post(format!("{}/config", base))
                .query(&query)
                .send()
                .await
                .context("config request failed")?
                .error_for_status()?
                .text()
                .await?;
            print!("{}", text);
        }

        Commands::Health => {
            let health: serde_json::Value = client
                .get(format!("{}/health", base))
                .send()
                .await
                .context("health request failed")?
                .error_for_status()?
                .json()
                .await?;
            println!("{}", serde_json::to_string_pretty(&health)?);
        }

        Commands::Probe {
            nodes,
            num_keys,
            ops,
            cluster_prob,
            write_ratio,
            read_ratio,
            intervals,
            seed,
        } => {
            let nodes = if nodes.is_empty() {
                vec![cli.node.clone()]
            } else {
                nodes
            };
            let config = ProbeConfig {
                write_node: cli.node.clone(),
                nodes,
                num_keys,
                ops,
                cluster_prob,
                write_ratio,
                read_ratio,
                intervals_path: intervals,
                seed,
                ..Default::default()
            };
            let report = run_probe(&config).await?;
            println!("Probe report:");
            println!("  Operations: {}", report.ops);
            println!(
                "  Writes: {} ok, {} failed",
                report.writes_ok, report.writes_failed
            );
            println!(
                "  Reads: {} ok, {} missed, {} failed",
                report.reads_ok, report.reads_missed, report.reads_failed
            );
            println!("  Stale reads: {}", report.stale_reads);
            print_latency("Write", &report.write_latency);
            print_latency("Read", &report.read_latency);
            println!(
                "  Staleness interval: mean={:.2}ms max={:.2}ms",
                report.interval_mean_ms, report.interval_max_ms
            );
        }
    }

    Ok(())
}

async fn fetch_entry(client: &reqwest::Client, url: &str, key: &str) -> anyhow::Result<Entry> {
    let resp = client
        .get(url)
        .query(&[("key", key)])
        .send()
        .await
        .with_context(|| format!("request to {} failed", url))?;
    let status = resp.status();
    if status == reqwest::StatusCode::NOT_FOUND {
        anyhow::bail!("{} not found", key);
    }
    if !status.is_success() {
        anyhow::bail!("read failed ({}): {}", status, resp.text().await?.trim());
    }
    Ok(resp.json().await?)
}
