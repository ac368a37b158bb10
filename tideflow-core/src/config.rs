//! Task configuration. The knobs here are the ones the engine itself
//! recognizes; collaborator construction (which consumer, which producer,
//! which extractor) happens in code at build time, not in the config file.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::Result;

const DEFAULT_BUFFERED_RECORDS_PER_PARTITION: usize = 1000;
const DEFAULT_COMMIT_INTERVAL_MS: u64 = 30_000;

/// What to do when a raw record fails key/value deserialization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeserializationPolicy {
    /// Fail the task (the default).
    #[default]
    Fail,
    /// Log the poison record, record its offset as consumed, and move on.
    SkipAndLog,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Per-partition buffer watermark: `pause` is issued when a queue grows
    /// strictly beyond this, `resume` when it drains back to exactly this.
    #[serde(default = "default_buffered_records")]
    pub buffered_records_per_partition: usize,

    /// Cadence at which the owning worker requests a commit.
    #[serde(default = "default_commit_interval_ms")]
    pub commit_interval_ms: u64,

    #[serde(default)]
    pub deserialization_policy: DeserializationPolicy,
}

fn default_buffered_records() -> usize {
    DEFAULT_BUFFERED_RECORDS_PER_PARTITION
}

fn default_commit_interval_ms() -> u64 {
    DEFAULT_COMMIT_INTERVAL_MS
}

impl Default for TaskConfig {
    fn default() -> Self {
        TaskConfig {
            buffered_records_per_partition: DEFAULT_BUFFERED_RECORDS_PER_PARTITION,
            commit_interval_ms: DEFAULT_COMMIT_INTERVAL_MS,
            deserialization_policy: DeserializationPolicy::default(),
        }
    }
}

impl TaskConfig {
    /// Load the settings from a serialized JSON spec.
    pub fn load(spec: &str) -> Result<Self> {
        let config: TaskConfig = serde_json::from_str(spec)
            .map_err(|e| Error::Config(format!("Failed to parse task config: {e:?}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.buffered_records_per_partition == 0 {
            return Err(Error::Config(
                "buffered.records.per.partition must be at least 1".to_string(),
            ));
        }
        if self.commit_interval_ms == 0 {
            return Err(Error::Config(
                "commit.interval.ms must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn commit_interval(&self) -> Duration {
        Duration::from_millis(self.commit_interval_ms)
    }
}
