use std::time::Duration;

use crate::model::Ms;

/// Runtime knobs, overridable from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// TTL applied when a lock request names none. 15 minutes.
    pub default_ttl_ms: Ms,
    /// Cadence of the expiry reconciliation sweep.
    pub sweep_interval: Duration,
    /// Expiry-index entries processed per sweep iteration.
    pub sweep_batch: usize,
    /// Ledger WAL appends that trigger a compaction pass.
    pub compact_threshold: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_ttl_ms: 900_000,
            sweep_interval: Duration::from_secs(5),
            sweep_batch: 200,
            compact_threshold: 1000,
        }
    }
}

impl Config {
    /// Read `SEATLOCK_*` environment overrides on top of the defaults.
    /// Unparsable values fall back silently.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            default_ttl_ms: env_parse("SEATLOCK_LOCK_TTL_MS").unwrap_or(defaults.default_ttl_ms),
            sweep_interval: env_parse("SEATLOCK_SWEEP_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.sweep_interval),
            sweep_batch: env_parse("SEATLOCK_SWEEP_BATCH").unwrap_or(defaults.sweep_batch),
            compact_threshold: env_parse("SEATLOCK_COMPACT_THRESHOLD")
                .unwrap_or(defaults.compact_threshold),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sane_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.default_ttl_ms, 15 * 60 * 1000);
        assert_eq!(cfg.sweep_batch, 200);
    }
}
