//! Ops commands run against a live cluster

pub mod probe;

pub use probe::{run_probe, LatencySummary, ProbeConfig, ProbeReport};
