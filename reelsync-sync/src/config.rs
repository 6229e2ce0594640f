//! Engine configuration: batch size and retry policy.
//!
//! Both structs deserialize from YAML or JSON with every field optional;
//! durations are written in milliseconds:
//!
//! ```yaml
//! batch_size: 25
//! retry:
//!   max_attempts: 5
//!   base_delay_ms: 100
//!   max_delay_ms: 1000
//!   jitter_ms: 20
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{io_err, SyncError};

pub const DEFAULT_BATCH_SIZE: usize = 50;

// ---------------------------------------------------------------------------
// RetryPolicy
// ---------------------------------------------------------------------------

/// Attempt count and backoff shape for the retry executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles for each further attempt.
    #[serde(rename = "base_delay_ms", with = "duration_ms")]
    pub base_delay: Duration,
    /// Upper bound on the exponential part of the delay.
    #[serde(rename = "max_delay_ms", with = "duration_ms")]
    pub max_delay: Duration,
    /// Upper bound of the uniform random delay added on top.
    #[serde(rename = "jitter_ms", with = "duration_ms")]
    pub jitter: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(2),
            jitter: Duration::from_millis(50),
        }
    }

    /// One attempt, no waiting.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: Duration::ZERO,
        }
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// Backoff after the `attempt`-th failure (1-indexed), without jitter:
    /// `min(base_delay * 2^(attempt-1), max_delay)`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }

    pub fn validate(&self) -> Result<(), SyncError> {
        if self.max_attempts == 0 {
            return Err(SyncError::Validation(
                "retry max_attempts must be at least 1".to_owned(),
            ));
        }
        Ok(())
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}

// ---------------------------------------------------------------------------
// SyncConfig
// ---------------------------------------------------------------------------

/// Settings shared by every bulk operation of one client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Items per chunk; a chunk is the unit of retry and rollback.
    pub batch_size: usize,
    pub retry: RetryPolicy,
}

impl SyncConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn validate(&self) -> Result<(), SyncError> {
        if self.batch_size == 0 {
            return Err(SyncError::Validation(
                "batch_size must be at least 1".to_owned(),
            ));
        }
        self.retry.validate()
    }

    /// Load and validate a config file. `.json` files are read as JSON,
    /// everything else as YAML.
    pub fn load(path: &Path) -> Result<Self, SyncError> {
        let raw = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));
        let config: SyncConfig = if is_json {
            serde_json::from_str(&raw)?
        } else {
            Self::from_yaml_str(&raw)?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self, SyncError> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(raw)?)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            retry: RetryPolicy::default(),
        }
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = SyncConfig::default();
        assert_eq!(config.batch_size, 50);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.base_delay, Duration::from_millis(250));
        assert_eq!(config.retry.max_delay, Duration::from_secs(2));
        assert_eq!(config.retry.jitter, Duration::from_millis(50));
    }

    #[test]
    fn backoff_doubles_then_caps() {
        let policy = RetryPolicy::new(10)
            .with_base_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_millis(500));
        let delays: Vec<_> = (1..=5).map(|a| policy.backoff(a).as_millis()).collect();
        assert_eq!(delays, vec![100, 200, 400, 500, 500]);
        assert_eq!(policy.backoff(200), Duration::from_millis(500));
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let config = SyncConfig::from_yaml_str("retry:\n  max_attempts: 5\n  jitter_ms: 0\n")
            .expect("parse");
        assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.jitter, Duration::ZERO);
        assert_eq!(config.retry.base_delay, Duration::from_millis(250));
    }

    #[test]
    fn empty_yaml_is_default() {
        assert_eq!(SyncConfig::from_yaml_str("").expect("parse"), SyncConfig::default());
    }

    #[test]
    fn validation_rejects_zeroes() {
        assert!(SyncConfig::new().with_batch_size(0).validate().is_err());
        let zero_attempts = RetryPolicy {
            max_attempts: 0,
            ..RetryPolicy::default()
        };
        assert!(SyncConfig::new().with_retry(zero_attempts).validate().is_err());
        assert!(SyncConfig::new().validate().is_ok());
    }

    #[test]
    fn yaml_roundtrip_uses_millisecond_keys() {
        let yaml = serde_yaml::to_string(&SyncConfig::default()).expect("serialize");
        assert!(yaml.contains("base_delay_ms: 250"), "got:\n{yaml}");
        let back = SyncConfig::from_yaml_str(&yaml).expect("parse");
        assert_eq!(back, SyncConfig::default());
    }
}
