//! Engine tunables.
//!
//! All timing and sizing knobs for the upload/import pipeline live here so
//! callers can override the production defaults (the backend contract fixes
//! none of these values; they are client policy).

use std::time::Duration;

use serde::Deserialize;

/// Default chunk size for the production upload path (1 MiB).
pub const DEFAULT_CHUNK_SIZE: u64 = 1024 * 1024;

/// Default number of simultaneously in-flight chunk uploads.
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

/// Default attempts per chunk before the whole upload is aborted.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Configuration for the upload/import engine.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Bytes per upload chunk.
    pub chunk_size: u64,
    /// Maximum simultaneously in-flight chunk uploads.
    pub max_concurrency: usize,
    /// Attempts per chunk (first try included) before aborting the upload.
    pub max_attempts: u32,
    /// Base delay between retries of a failed chunk; doubles per attempt.
    #[serde(with = "duration_millis")]
    pub retry_backoff: Duration,
    /// Interval between job status polls.
    #[serde(with = "duration_millis")]
    pub poll_interval: Duration,
    /// Ceiling on total polling time before the job is treated as stuck.
    #[serde(with = "duration_millis")]
    pub poll_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_backoff: Duration::from_millis(250),
            poll_interval: Duration::from_millis(3000),
            poll_timeout: Duration::from_secs(10 * 60),
        }
    }
}

impl EngineConfig {
    /// Sets the chunk size in bytes.
    pub fn chunk_size(mut self, bytes: u64) -> Self {
        self.chunk_size = bytes;
        self
    }

    /// Sets the maximum number of in-flight chunk uploads.
    pub fn max_concurrency(mut self, n: usize) -> Self {
        self.max_concurrency = n;
        self
    }

    /// Sets the attempts per chunk before the upload aborts.
    pub fn max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n;
        self
    }

    /// Sets the base retry backoff.
    pub fn retry_backoff(mut self, d: Duration) -> Self {
        self.retry_backoff = d;
        self
    }

    /// Sets the job polling interval.
    pub fn poll_interval(mut self, d: Duration) -> Self {
        self.poll_interval = d;
        self
    }

    /// Sets the polling timeout ceiling.
    pub fn poll_timeout(mut self, d: Duration) -> Self {
        self.poll_timeout = d;
        self
    }
}

/// Serde helper: durations as integer milliseconds.
mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_production_policy() {
        let config = EngineConfig::default();
        assert_eq!(config.chunk_size, 1024 * 1024);
        assert_eq!(config.max_concurrency, 4);
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.poll_interval, Duration::from_millis(3000));
    }

    #[test]
    fn builder_overrides_defaults() {
        let config = EngineConfig::default()
            .chunk_size(1024)
            .max_concurrency(2)
            .max_attempts(5)
            .poll_interval(Duration::from_millis(10));

        assert_eq!(config.chunk_size, 1024);
        assert_eq!(config.max_concurrency, 2);
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.poll_interval, Duration::from_millis(10));
    }

    #[test]
    fn deserializes_from_json_with_millis() {
        let json = r#"{
            "chunk_size": 2048,
            "poll_interval": 500
        }"#;

        let config: EngineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.chunk_size, 2048);
        assert_eq!(config.poll_interval, Duration::from_millis(500));
        // Unspecified fields keep defaults
        assert_eq!(config.max_concurrency, 4);
    }
}
