//! Mixed read/write workload that measures observed staleness
//!
//! Writes go to one node, reads to a random node. A read is stale when the
//! returned version is older than the last version this probe wrote for the
//! key. The interval between a read and the version it observed is recorded
//! for every successful read.

use crate::common::{peer_base_url, timestamp_now_nanos, Error, Result};
use crate::replica::Entry;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use reqwest::StatusCode;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Node receiving warm-up and workload writes
    pub write_node: String,
    /// Nodes reads are spread across
    pub nodes: Vec<String>,
    /// Keyspace size (`key0` .. `key{n-1}`)
    pub num_keys: usize,
    /// Workload operations after warm-up
    pub ops: usize,
    /// Probability of staying on the current key
    pub cluster_prob: f64,
    pub write_ratio: u32,
    pub read_ratio: u32,
    /// Optional CSV destination for staleness intervals
    pub intervals_path: Option<PathBuf>,
    pub timeout: Option<Duration>,
    /// Fixed RNG seed for reproducible key and operation choices
    pub seed: Option<u64>,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            write_node: "http://localhost:8000".to_string(),
            nodes: vec!["http://localhost:8000".to_string()],
            num_keys: 100,
            ops: 1000,
            cluster_prob: 0.8,
            write_ratio: 1,
            read_ratio: 99,
            intervals_path: None,
            timeout: Some(Duration::from_secs(10)),
            seed: None,
        }
    }
}

impl ProbeConfig {
    /// Sum of the operation weights; never zero
    fn total_weight(&self) -> Result<u32> {
        match self.write_ratio.checked_add(self.read_ratio) {
            Some(0) => Err(Error::InvalidConfig("write and read ratios are both zero".into())),
            Some(total) => Ok(total),
            None => Err(Error::InvalidConfig("write and read ratios overflow".into())),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.nodes.is_empty() {
            return Err(Error::InvalidConfig("probe needs at least one read node".into()));
        }
        if self.num_keys == 0 {
            return Err(Error::InvalidConfig("probe needs at least one key".into()));
        }
        self.total_weight()?;
        if !(0.0..=1.0).contains(&self.cluster_prob) {
            return Err(Error::InvalidConfig("cluster probability must be within 0..=1".into()));
        }
        Ok(())
    }
}

/// Latency distribution in milliseconds
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LatencySummary {
    pub p50_ms: f64,
    pub p99_ms: f64,
    pub max_ms: f64,
}

impl LatencySummary {
    pub fn from_samples(samples: &[f64]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }
        let mut sorted = samples.to_vec();
        sorted.sort_by(f64::total_cmp);
        let rank = |p: f64| {
            let idx = (p * sorted.len() as f64).ceil() as usize;
            sorted[idx.saturating_sub(1).min(sorted.len() - 1)]
        };
        Self {
            p50_ms: rank(0.50),
            p99_ms: rank(0.99),
            max_ms: sorted[sorted.len() - 1],
        }
    }
}

#[derive(Debug, Default)]
pub struct ProbeReport {
    pub ops: usize,
    pub writes_ok: usize,
    pub writes_failed: usize,
    pub reads_ok: usize,
    /// 404 answers; the key had not reached the node yet
    pub reads_missed: usize,
    pub reads_failed: usize,
    pub stale_reads: usize,
    pub write_latency: LatencySummary,
    pub read_latency: LatencySummary,
    pub interval_mean_ms: f64,
    pub interval_max_ms: f64,
    pub intervals: Vec<f64>,
}

/// Key choice with locality: stay on the current key with `cluster_prob`,
/// otherwise jump to a uniformly random one.
#[derive(Debug)]
struct KeyPicker {
    current: usize,
    num_keys: usize,
    cluster_prob: f64,
}

impl KeyPicker {
    fn new(num_keys: usize, cluster_prob: f64, rng: &mut impl Rng) -> Self {
        Self {
            current: rng.gen_range(0..num_keys),
            num_keys,
            cluster_prob,
        }
    }

    fn next(&mut self, rng: &mut impl Rng) -> String {
        if rng.gen::<f64>() > self.cluster_prob {
            self.current = rng.gen_range(0..self.num_keys);
        }
        format!("key{}", self.current)
    }
}

fn now_ms() -> f64 {
    timestamp_now_nanos() as f64 / 1e6
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

pub async fn run_probe(config: &ProbeConfig) -> Result<ProbeReport> {
    config.validate()?;

    let mut builder = reqwest::Client::builder();
    if let Some(timeout) = config.timeout {
        builder = builder.timeout(timeout);
    }
    let client = builder.build()?;
    let write_node = peer_base_url(&config.write_node);
    let nodes: Vec<String> = config.nodes.iter().map(|n| peer_base_url(n)).collect();

    tracing::info!("Warm-up: writing {} keys to {}", config.num_keys, write_node);
    for i in 0..config.num_keys {
        let key = format!("key{}", i);
        let resp = client
            .post(format!("{}/put", write_node))
            .query(&[("key", key.as_str()), ("value", "0")])
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Error::Internal(format!(
                "warm-up write of {} failed: {}",
                key,
                resp.status()
            )));
        }
    }

    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let mut picker = KeyPicker::new(config.num_keys, config.cluster_prob, &mut rng);
    let mut versions: HashMap<String, f64> = HashMap::new();
    let mut report = ProbeReport::default();
    let mut write_samples = Vec::new();
    let mut read_samples = Vec::new();
    let total_weight = config.total_weight()?;

    tracing::info!("Running {} operations", config.ops);
    for _ in 0..config.ops {
        report.ops += 1;
        let key = picker.next(&mut rng);

        if rng.gen_range(0..total_weight) < config.write_ratio {
            let version = now_ms();
            versions.insert(key.clone(), version);
            let value = (version as u64).to_string();

            let start = Instant::now();
            let result = client
                .post(format!("{}/put", write_node))
                .query(&[("key", key.as_str()), ("value", value.as_str())])
                .send()
                .await;
            write_samples.push(elapsed_ms(start));

            match result {
                Ok(resp) if resp.status().is_success() => report.writes_ok += 1,
                Ok(resp) => {
                    tracing::debug!(key = %key, status = %resp.status(), "Probe write failed");
                    report.writes_failed += 1;
                }
                Err(e) => {
                    tracing::debug!(key = %key, error = %e, "Probe write failed");
                    report.writes_failed += 1;
                }
            }
        } else {
            let node = &nodes[rng.gen_range(0..nodes.len())];
            let read_at = now_ms();

            let start = Instant::now();
            let result = client
                .get(format!("{}/get", node))
                .query(&[("key", key.as_str())])
                .send()
                .await;
            let latency = elapsed_ms(start);

            let resp = match result {
                Ok(resp) => resp,
                Err(e) => {
                    tracing::debug!(node = %node, error = %e, "Probe read failed");
                    report.reads_failed += 1;
                    continue;
                }
            };
            read_samples.push(latency);

            match resp.status() {
                StatusCode::OK => match resp.json::<Entry>().await {
                    Ok(entry) => {
                        report.reads_ok += 1;
                        let observed = entry.timestamp as f64 / 1e6;
                        if observed < versions.get(&key).copied().unwrap_or(0.0) {
                            report.stale_reads += 1;
                        }
                        report.intervals.push(read_at - observed);
                    }
                    Err(_) => report.reads_failed += 1,
                },
                StatusCode::NOT_FOUND => report.reads_missed += 1,
                _ => report.reads_failed += 1,
            }
        }
    }

    report.write_latency = LatencySummary::from_samples(&write_samples);
    report.read_latency = LatencySummary::from_samples(&read_samples);
    if !report.intervals.is_empty() {
        report.interval_mean_ms =
            report.intervals.iter().sum::<f64>() / report.intervals.len() as f64;
        report.interval_max_ms = report
            .intervals
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);
    }

    if let Some(path) = &config.intervals_path {
        write_intervals(path, &report.intervals).await?;
        tracing::info!("Wrote interval data to {}", path.display());
    }

    tracing::info!(
        "✓ Probe complete: {} ops, {} stale reads",
        report.ops,
        report.stale_reads
    );
    Ok(report)
}

async fn write_intervals(path: &std::path::Path, intervals: &[f64]) -> Result<()> {
    let mut csv = String::from("interval_ms\n");
    for interval in intervals {
        csv.push_str(&interval.to_string());
        csv.push('\n');
    }
    tokio::fs::write(path, csv).await?;
    Ok(())
}
