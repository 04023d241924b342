//! Route history retention configuration.
//!
//! Configures the background job that trims each user's route history to
//! the most recent records.
//!
//! # Example
//!
//! ```toml
//! [retention]
//! enabled = true
//! interval_hours = 24
//! keep_per_user = 500
//! dry_run = false
//! ```

use serde::{Deserialize, Serialize};

/// Route history retention configuration.
///
/// When enabled, a background worker periodically deletes route history
/// records beyond the newest `keep_per_user` for every user.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetentionConfig {
    /// Whether retention pruning runs in the background.
    /// Default: false (must be explicitly enabled)
    #[serde(default)]
    pub enabled: bool,

    /// How often to run the retention worker (in hours).
    /// Default: 24 (once per day)
    #[serde(default = "default_interval_hours")]
    pub interval_hours: u64,

    /// Number of newest route history records kept per user.
    /// Default: 500
    #[serde(default = "default_keep_per_user")]
    pub keep_per_user: u32,

    /// If true, log what would be deleted without deleting anything.
    /// Default: false
    #[serde(default)]
    pub dry_run: bool,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_hours: default_interval_hours(),
            keep_per_user: default_keep_per_user(),
            dry_run: false,
        }
    }
}

fn default_interval_hours() -> u64 {
    24
}

fn default_keep_per_user() -> u32 {
    500
}

impl RetentionConfig {
    /// Get the interval as a Duration.
    pub fn interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.interval_hours * 3600)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RetentionConfig::default();
        assert!(!config.enabled);
        assert_eq!(config.interval_hours, 24);
        assert_eq!(config.keep_per_user, 500);
        assert!(!config.dry_run);
    }

    #[test]
    fn test_parse_minimal_config() {
        let config: RetentionConfig = toml::from_str("enabled = true").unwrap();
        assert!(config.enabled);
        assert_eq!(config.keep_per_user, 500);
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
            enabled = true
            interval_hours = 6
            keep_per_user = 100
            dry_run = true
        "#;
        let config: RetentionConfig = toml::from_str(toml).unwrap();
        assert!(config.enabled);
        assert_eq!(config.interval_hours, 6);
        assert_eq!(config.keep_per_user, 100);
        assert!(config.dry_run);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result: Result<RetentionConfig, _> = toml::from_str("usage_records_days = 3");
        assert!(result.is_err());
    }

    #[test]
    fn test_interval_duration() {
        let mut config = RetentionConfig::default();
        assert_eq!(config.interval(), std::time::Duration::from_secs(24 * 3600));

        config.interval_hours = 6;
        assert_eq!(config.interval(), std::time::Duration::from_secs(6 * 3600));
    }
}
