use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

/// Samples older than this, relative to now, are dropped from the buffer.
pub const RETENTION_WINDOW_SECS: i64 = 3600;
/// Consecutive chart points further apart than this get a gap marker.
pub const GAP_THRESHOLD_SECS: i64 = 2;
/// Data older than this is flagged stale.
pub const STALENESS_THRESHOLD_SECS: i64 = 180;
/// Name of the persisted buffer slot.
pub const SNAPSHOT_SLOT: &str = "metrics-buffer";

/// Poll intervals offered to the user, in milliseconds.
pub const POLL_INTERVAL_CHOICES_MS: [u64; 6] = [1000, 2000, 5000, 10000, 30000, 60000];
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 10000;

#[derive(Debug, Clone, Parser)]
#[command(name = "pulseboard", about = "Live sensor dashboard backed by a polled metrics API")]
pub struct Config {
    /// Metrics endpoint to poll.
    #[arg(long, default_value = "http://127.0.0.1:8000/api/metrics")]
    pub api_url: String,

    /// Poll interval in milliseconds.
    #[arg(long, default_value_t = DEFAULT_POLL_INTERVAL_MS, value_parser = parse_poll_interval)]
    pub poll_interval_ms: u64,

    /// Directory holding the persisted buffer snapshot.
    #[arg(long, default_value = "data")]
    pub data_dir: PathBuf,

    /// Address the dashboard HTTP surface listens on.
    #[arg(long, default_value = "127.0.0.1:8080")]
    pub listen: SocketAddr,

    /// Per-request timeout for the metrics endpoint, in milliseconds.
    #[arg(long, default_value_t = 5000)]
    pub request_timeout_ms: u64,
}

impl Config {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms.max(1))
    }
}

fn parse_poll_interval(raw: &str) -> Result<u64, String> {
    let ms: u64 = raw
        .parse()
        .map_err(|_| format!("`{raw}` is not a number of milliseconds"))?;
    if POLL_INTERVAL_CHOICES_MS.contains(&ms) {
        Ok(ms)
    } else {
        Err(format!("poll interval must be one of {POLL_INTERVAL_CHOICES_MS:?}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = Config::try_parse_from(["pulseboard"]).unwrap();
        assert_eq!(cfg.poll_interval(), Duration::from_secs(10));
        assert_eq!(cfg.data_dir, PathBuf::from("data"));
        assert_eq!(cfg.listen.port(), 8080);
    }

    #[test]
    fn interval_must_be_an_offered_choice() {
        let cfg = Config::try_parse_from(["pulseboard", "--poll-interval-ms", "1000"]).unwrap();
        assert_eq!(cfg.poll_interval_ms, 1000);
        assert!(Config::try_parse_from(["pulseboard", "--poll-interval-ms", "1500"]).is_err());
        assert!(Config::try_parse_from(["pulseboard", "--poll-interval-ms", "soon"]).is_err());
    }
}
