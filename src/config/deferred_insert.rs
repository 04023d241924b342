use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Deferred insert queue configuration.
///
/// ```toml
/// [deferred_insert]
/// max_batch_records = 500
/// flush_interval_ms = 5000
/// max_pending_entries = 10000
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeferredInsertConfig {
    /// Maximum number of records written in one flush pass.
    #[serde(default = "default_max_batch_records")]
    pub max_batch_records: usize,

    /// Time between flush passes, in milliseconds.
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,

    /// Maximum queued payloads before new ones are dropped.
    /// Set to 0 for a very large (but still bounded) queue.
    #[serde(default = "default_max_pending_entries")]
    pub max_pending_entries: usize,
}

impl Default for DeferredInsertConfig {
    fn default() -> Self {
        Self {
            max_batch_records: default_max_batch_records(),
            flush_interval_ms: default_flush_interval_ms(),
            max_pending_entries: default_max_pending_entries(),
        }
    }
}

impl DeferredInsertConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_batch_records == 0 {
            return Err(ConfigError::Validation(
                "deferred_insert.max_batch_records must be greater than 0".into(),
            ));
        }
        if self.flush_interval_ms == 0 {
            return Err(ConfigError::Validation(
                "deferred_insert.flush_interval_ms must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

fn default_max_batch_records() -> usize {
    500
}

fn default_flush_interval_ms() -> u64 {
    5000
}

fn default_max_pending_entries() -> usize {
    10_000
}
