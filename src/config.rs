//! Configuration types for playlist-dl

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

/// Batching and worker-pool configuration
///
/// Groups settings for how a track list is split and fanned out.
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Number of tracks per batch (default: 10)
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Maximum batches downloading in parallel (default: 4)
    ///
    /// Bounds the worker pool, not the batch count: a job with more batches
    /// than this queues the rest behind the pool.
    #[serde(default = "default_max_concurrent_batches")]
    pub max_concurrent_batches: usize,

    /// Track-count cutoff for the direct in-memory path (default: 20)
    ///
    /// Lists at or below this size are resolved sequentially straight into an
    /// in-memory zip with no job directory; larger lists take the batch path.
    #[serde(default = "default_direct_threshold")]
    pub direct_threshold: usize,

    /// How long a job directory lives before the caller's expiry system may
    /// collect it (default: 30 minutes). Recorded with the job, not enforced
    /// here.
    #[serde(default = "default_job_expiry", with = "duration_serde")]
    pub job_expiry: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_concurrent_batches: default_max_concurrent_batches(),
            direct_threshold: default_direct_threshold(),
            job_expiry: default_job_expiry(),
        }
    }
}

/// Completion-tracker poll configuration
///
/// The tracker starts slow and speeds up once progress is visible. All knobs
/// are injectable so tests can run with millisecond intervals.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PollConfig {
    /// Interval between polls before any batch has completed (default: 15s)
    #[serde(default = "default_initial_interval", with = "duration_serde")]
    pub initial_interval: Duration,

    /// Interval once at least one batch has completed (default: 6s)
    #[serde(default = "default_progress_interval", with = "duration_serde")]
    pub progress_interval: Duration,

    /// Consecutive unchanged polls tolerated before giving up (default: 15)
    #[serde(default = "default_stall_limit")]
    pub stall_limit: u32,

    /// Optional wall-clock ceiling on the whole wait (default: none)
    ///
    /// The stall rule alone never fires against a feed that advances by one
    /// every poll; set this when that matters.
    #[serde(default, with = "optional_duration_serde")]
    pub max_wait: Option<Duration>,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            initial_interval: default_initial_interval(),
            progress_interval: default_progress_interval(),
            stall_limit: default_stall_limit(),
            max_wait: None,
        }
    }
}

/// Main configuration for [`BatchDownloader`](crate::engine::BatchDownloader)
///
/// Sub-config fields are flattened for serialization, so the JSON format
/// stays flat (no nesting).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Root directory under which job directories are created
    /// (default: "./files")
    #[serde(default = "default_work_root")]
    pub work_root: PathBuf,

    /// Batching and worker-pool settings
    #[serde(flatten)]
    pub batch: BatchConfig,

    /// Completion-tracker poll settings
    #[serde(flatten)]
    pub poll: PollConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            work_root: default_work_root(),
            batch: BatchConfig::default(),
            poll: PollConfig::default(),
        }
    }
}

impl Config {
    /// Parse a configuration from a JSON string.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate invariants that serde defaults alone cannot guarantee.
    ///
    /// Fails fast with [`Error::Config`] so a bad value never reaches
    /// dispatch.
    pub fn validate(&self) -> Result<()> {
        if self.batch.batch_size == 0 {
            return Err(Error::Config {
                message: "batch_size must be at least 1".to_string(),
                key: Some("batch_size".to_string()),
            });
        }
        if self.batch.max_concurrent_batches == 0 {
            return Err(Error::Config {
                message: "max_concurrent_batches must be at least 1".to_string(),
                key: Some("max_concurrent_batches".to_string()),
            });
        }
        if self.poll.stall_limit == 0 {
            return Err(Error::Config {
                message: "stall_limit must be at least 1".to_string(),
                key: Some("stall_limit".to_string()),
            });
        }
        Ok(())
    }
}

fn default_work_root() -> PathBuf {
    PathBuf::from("./files")
}

fn default_batch_size() -> usize {
    10
}

fn default_max_concurrent_batches() -> usize {
    4
}

fn default_direct_threshold() -> usize {
    20
}

fn default_job_expiry() -> Duration {
    Duration::from_secs(30 * 60)
}

fn default_initial_interval() -> Duration {
    Duration::from_secs(15)
}

fn default_progress_interval() -> Duration {
    Duration::from_secs(6)
}

fn default_stall_limit() -> u32 {
    15
}

// Duration serialization helper (seconds as u64)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Optional Duration serialization helper
mod optional_duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs: Option<u64> = Option::deserialize(deserializer)?;
        Ok(secs.map(Duration::from_secs))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.batch.batch_size, 10);
        assert_eq!(config.batch.max_concurrent_batches, 4);
        assert_eq!(config.batch.direct_threshold, 20);
        assert_eq!(config.batch.job_expiry, Duration::from_secs(1800));
        assert_eq!(config.poll.initial_interval, Duration::from_secs(15));
        assert_eq!(config.poll.progress_interval, Duration::from_secs(6));
        assert_eq!(config.poll.stall_limit, 15);
        assert!(config.poll.max_wait.is_none());
        config.validate().unwrap();
    }

    #[test]
    fn from_json_str_applies_defaults_for_missing_fields() {
        let config = Config::from_json_str(r#"{"batch_size": 5}"#).unwrap();
        assert_eq!(config.batch.batch_size, 5);
        assert_eq!(config.poll.stall_limit, 15);
    }

    #[test]
    fn from_json_str_rejects_zero_batch_size() {
        let err = Config::from_json_str(r#"{"batch_size": 0}"#).unwrap_err();
        assert!(matches!(err, Error::Config { key: Some(k), .. } if k == "batch_size"));
    }

    #[test]
    fn durations_round_trip_as_seconds() {
        let config = Config {
            poll: PollConfig {
                max_wait: Some(Duration::from_secs(120)),
                ..PollConfig::default()
            },
            ..Config::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let parsed = Config::from_json_str(&json).unwrap();
        assert_eq!(parsed.poll.max_wait, Some(Duration::from_secs(120)));
        assert_eq!(parsed.poll.initial_interval, Duration::from_secs(15));
    }
}
