//! Utility functions for quorumkv

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Wall-clock time in nanoseconds since the Unix epoch, used as the write
/// version. A clock before the epoch yields 0.
pub fn timestamp_now_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or_default()
}

/// Split a comma-separated peer list, dropping blanks
pub fn parse_peers(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// Base URL for a peer given as `host:port` or a full `http(s)://` URL
pub fn peer_base_url(peer: &str) -> String {
    let peer = peer.trim_end_matches('/');
    if peer.starts_with("http://") || peer.starts_with("https://") {
        peer.to_string()
    } else {
        format!("http://{}", peer)
    }
}

/// Parse duration string (e.g., "250ms", "30s", "5m", "1h")
pub fn parse_duration(s: &str) -> crate::Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return Err(crate::Error::InvalidConfig("empty duration".into()));
    }

    let split = s
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(s.len());
    let (num_str, unit) = s.split_at(split);

    let num: u64 = num_str
        .parse()
        .map_err(|_| crate::Error::InvalidConfig(format!("invalid duration: {}", s)))?;

    let duration = match unit {
        "ms" => Duration::from_millis(num),
        "" | "s" => Duration::from_secs(num),
        "m" => Duration::from_secs(scale(num, 60, s)?),
        "h" => Duration::from_secs(scale(num, 3600, s)?),
        _ => {
            return Err(crate::Error::InvalidConfig(format!(
                "unknown duration unit: {}",
                unit
            )))
        }
    };

    Ok(duration)
}

fn scale(num: u64, factor: u64, input: &str) -> crate::Result<u64> {
    num.checked_mul(factor)
        .ok_or_else(|| crate::Error::InvalidConfig(format!("duration too large: {}", input)))
}
