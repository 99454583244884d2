//! Prometheus-compatible metrics
//!
//! Quorum outcome counters, peer RPC counters and per-endpoint request
//! latency histograms, rendered by `GET /metrics`.

use std::collections::HashMap;
use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Histogram bucket boundaries for latency measurements (in milliseconds)
const LATENCY_BUCKETS: [f64; 11] = [
    1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0,
];

/// A simple histogram implementation for latency tracking
#[derive(Debug)]
pub struct Histogram {
    buckets: Vec<AtomicU64>,
    boundaries: Vec<f64>,
    sum_micros: AtomicU64,
    count: AtomicU64,
}

impl Histogram {
    pub fn new() -> Self {
        Self::with_buckets(&LATENCY_BUCKETS)
    }

    pub fn with_buckets(boundaries: &[f64]) -> Self {
        Self {
            buckets: (0..=boundaries.len()).map(|_| AtomicU64::new(0)).collect(),
            boundaries: boundaries.to_vec(),
            sum_micros: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    /// Record a value (milliseconds)
    pub fn observe(&self, value: f64) {
        let idx = self
            .boundaries
            .iter()
            .position(|&boundary| value <= boundary)
            .unwrap_or(self.boundaries.len());

        self.buckets[idx].fetch_add(1, Ordering::Relaxed);
        self.sum_micros
            .fetch_add((value * 1000.0) as u64, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    /// Cumulative bucket counts, ending with the +Inf bucket
    pub fn get_buckets(&self) -> Vec<(f64, u64)> {
        let mut cumulative = 0u64;
        let mut result = Vec::with_capacity(self.buckets.len());
        for (i, &boundary) in self.boundaries.iter().enumerate() {
            cumulative += self.buckets[i].load(Ordering::Relaxed);
            result.push((boundary, cumulative));
        }
        cumulative += self.buckets[self.boundaries.len()].load(Ordering::Relaxed);
        result.push((f64::INFINITY, cumulative));
        result
    }

    pub fn sum(&self) -> f64 {
        self.sum_micros.load(Ordering::Relaxed) as f64 / 1000.0
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Default)]
pub struct Gauge {
    value: AtomicU64,
}

impl Gauge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec(&self) {
        self.value.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Endpoint metrics
#[derive(Debug, Default)]
pub struct EndpointMetrics {
    pub requests_total: Counter,
    pub requests_error: Counter,
    pub latency: Histogram,
}

/// Global metrics registry
#[derive(Debug)]
pub struct MetricsRegistry {
    endpoints: Mutex<HashMap<String, Arc<EndpointMetrics>>>,

    /// Write coordinator outcomes
    pub writes_accepted: Counter,
    pub writes_quorum_not_met: Counter,
    pub writes_rejected: Counter,

    /// Outbound replicate RPCs
    pub replicate_acks: Counter,
    pub replicate_nacks: Counter,

    /// Read coordinator outcomes
    pub reads_served: Counter,
    pub reads_not_found: Counter,
    pub replica_read_failures: Counter,

    /// Inbound replication
    pub replicas_applied: Counter,
    pub replicas_stale: Counter,

    /// Detached fire-and-forget replications still running
    pub background_replications: Gauge,

    start_time: Instant,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            endpoints: Mutex::new(HashMap::new()),
            writes_accepted: Counter::new(),
            writes_quorum_not_met: Counter::new(),
            writes_rejected: Counter::new(),
            replicate_acks: Counter::new(),
            replicate_nacks: Counter::new(),
            reads_served: Counter::new(),
            reads_not_found: Counter::new(),
            replica_read_failures: Counter::new(),
            replicas_applied: Counter::new(),
            replicas_stale: Counter::new(),
            background_replications: Gauge::new(),
            start_time: Instant::now(),
        }
    }

    /// Get or create metrics for an endpoint
    pub fn endpoint(&self, path: &str) -> Arc<EndpointMetrics> {
        let mut endpoints = self
            .endpoints
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        endpoints.entry(path.to_string()).or_default().clone()
    }

    /// Record a request
    pub fn record_request(&self, path: &str, duration: Duration, success: bool) {
        let endpoint = self.endpoint(path);
        endpoint.requests_total.inc();
        endpoint.latency.observe(duration.as_secs_f64() * 1000.0);
        if !success {
            endpoint.requests_error.inc();
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Generate Prometheus-compatible metrics output
    pub fn to_prometheus(&self) -> String {
        let mut out = String::new();

        let counters = [
            ("quorumkv_writes_accepted_total", "Writes that met the write quorum", &self.writes_accepted),
            ("quorumkv_writes_quorum_not_met_total", "Writes that fell short of the write quorum", &self.writes_quorum_not_met),
            ("quorumkv_writes_rejected_total", "Writes rejected by a non-coordinating node", &self.writes_rejected),
            ("quorumkv_replicate_acks_total", "Replicate RPCs acknowledged by a peer", &self.replicate_acks),
            ("quorumkv_replicate_nacks_total", "Replicate RPCs that failed or were refused", &self.replicate_nacks),
            ("quorumkv_reads_served_total", "Reads answered with an entry", &self.reads_served),
            ("quorumkv_reads_not_found_total", "Reads answered with not found", &self.reads_not_found),
            ("quorumkv_replica_read_failures_total", "Replica reads that failed or found nothing", &self.replica_read_failures),
            ("quorumkv_replicas_applied_total", "Inbound replications applied to the store", &self.replicas_applied),
            ("quorumkv_replicas_stale_total", "Inbound replications ignored as not newer", &self.replicas_stale),
        ];
        for (name, help, counter) in counters {
            let _ = writeln!(out, "# HELP {} {}", name, help);
            let _ = writeln!(out, "# TYPE {} counter", name);
            let _ = writeln!(out, "{} {}", name, counter.get());
        }

        out.push_str("# HELP quorumkv_background_replications In-flight fire-and-forget replications\n");
        out.push_str("# TYPE quorumkv_background_replications gauge\n");
        let _ = writeln!(
            out,
            "quorumkv_background_replications {}",
            self.background_replications.get()
        );

        out.push_str("# HELP quorumkv_uptime_seconds Server uptime in seconds\n");
        out.push_str("# TYPE quorumkv_uptime_seconds gauge\n");
        let _ = writeln!(out, "quorumkv_uptime_seconds {}", self.uptime_seconds());

        let endpoints = self
            .endpoints
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut paths: Vec<_> = endpoints.keys().cloned().collect();
        paths.sort();

        out.push_str("# HELP quorumkv_endpoint_requests_total Requests per endpoint\n");
        out.push_str("# TYPE quorumkv_endpoint_requests_total counter\n");
        for path in &paths {
            let _ = writeln!(
                out,
                "quorumkv_endpoint_requests_total{{path=\"{}\"}} {}",
                path,
                endpoints[path].requests_total.get()
            );
        }

        out.push_str("# HELP quorumkv_endpoint_errors_total Errors per endpoint\n");
        out.push_str("# TYPE quorumkv_endpoint_errors_total counter\n");
        for path in &paths {
            let _ = writeln!(
                out,
                "quorumkv_endpoint_errors_total{{path=\"{}\"}} {}",
                path,
                endpoints[path].requests_error.get()
            );
        }

        out.push_str("# HELP quorumkv_request_duration_ms Request duration in milliseconds\n");
        out.push_str("# TYPE quorumkv_request_duration_ms histogram\n");
        for path in &paths {
            let latency = &endpoints[path].latency;
            for (le, count) in latency.get_buckets() {
                let le = if le.is_infinite() {
                    "+Inf".to_string()
                } else {
                    le.to_string()
                };
                let _ = writeln!(
                    out,
                    "quorumkv_request_duration_ms_bucket{{path=\"{}\",le=\"{}\"}} {}",
                    path, le, count
                );
            }
            let _ = writeln!(
                out,
                "quorumkv_request_duration_ms_sum{{path=\"{}\"}} {}",
                path,
                latency.sum()
            );
            let _ = writeln!(
                out,
                "quorumkv_request_duration_ms_count{{path=\"{}\"}} {}",
                path,
                latency.count()
            );
        }

        out
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Global metrics instance
pub static METRICS: once_cell::sync::Lazy<MetricsRegistry> =
    once_cell::sync::Lazy::new(MetricsRegistry::new);
