//! Engine configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Retry behaviour for delivering one notification to one contact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Attempts per contact, including the first.
    pub max_attempts: u32,
    /// Wait before the first retry (milliseconds).
    pub initial_backoff_ms: u64,
    /// Upper bound on any single wait (milliseconds).
    pub max_backoff_ms: u64,
    /// Multiplier applied to the wait after each failed attempt.
    pub backoff_multiplier: u32,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 10_000,
            backoff_multiplier: 2,
        }
    }
}

impl DeliveryConfig {
    /// Returns the wait after the given failed attempt (1-based).
    #[must_use]
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let factor = u64::from(self.backoff_multiplier.max(1))
            .saturating_pow(attempt.saturating_sub(1));
        let ms = self
            .initial_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }
}

/// Configuration for the escalation engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Delivery retry settings.
    pub delivery: DeliveryConfig,
    /// Floor on the top-level repeat interval (seconds).
    pub min_repeat_interval_secs: u64,
    /// Repeat interval of the generic fallback ladder (seconds).
    pub generic_repeat_secs: u64,
    /// Capacity of the change-event broadcast channel.
    pub event_buffer_size: usize,
    /// How long resolved and expired alerts stay readable (seconds).
    pub archive_retention_secs: u64,
    /// Maximum number of archived alerts to keep.
    pub max_archived: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            delivery: DeliveryConfig::default(),
            min_repeat_interval_secs: 30,
            generic_repeat_secs: 300,
            event_buffer_size: 1024,
            archive_retention_secs: 3600, // 1 hour
            max_archived: 10_000,
        }
    }
}

impl EngineConfig {
    /// Parses a configuration from JSON. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns `EscalationError::Serialization` if the JSON is malformed.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Loads a configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    /// Sets the delivery retry settings.
    #[must_use]
    pub fn with_delivery(mut self, delivery: DeliveryConfig) -> Self {
        self.delivery = delivery;
        self
    }

    /// Sets the repeat interval floor.
    #[must_use]
    pub const fn with_min_repeat_interval_secs(mut self, secs: u64) -> Self {
        self.min_repeat_interval_secs = secs;
        self
    }

    /// Sets the generic ladder's repeat interval.
    #[must_use]
    pub const fn with_generic_repeat_secs(mut self, secs: u64) -> Self {
        self.generic_repeat_secs = secs;
        self
    }

    /// Sets the event channel capacity.
    #[must_use]
    pub const fn with_event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = size;
        self
    }

    /// Sets the archive retention.
    #[must_use]
    pub const fn with_archive_retention_secs(mut self, secs: u64) -> Self {
        self.archive_retention_secs = secs;
        self
    }

    /// Sets the archive cap.
    #[must_use]
    pub const fn with_max_archived(mut self, max: usize) -> Self {
        self.max_archived = max;
        self
    }

    /// Returns the repeat interval floor as a [`Duration`].
    #[must_use]
    pub const fn min_repeat_interval(&self) -> Duration {
        Duration::from_secs(self.min_repeat_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.delivery.max_attempts, 3);
        assert_eq!(config.min_repeat_interval_secs, 30);
        assert_eq!(config.generic_repeat_secs, 300);
        assert_eq!(config.event_buffer_size, 1024);
        assert_eq!(config.archive_retention_secs, 3600);
        assert_eq!(config.max_archived, 10_000);
    }

    #[test]
    fn builder_methods() {
        let config = EngineConfig::default()
            .with_min_repeat_interval_secs(5)
            .with_event_buffer_size(16)
            .with_max_archived(10);
        assert_eq!(config.min_repeat_interval(), Duration::from_secs(5));
        assert_eq!(config.event_buffer_size, 16);
        assert_eq!(config.max_archived, 10);
    }

    #[test]
    fn partial_json_uses_defaults() {
        let config =
            EngineConfig::from_json(r#"{"min_repeat_interval_secs": 60, "delivery": {"max_attempts": 5}}"#)
                .unwrap();
        assert_eq!(config.min_repeat_interval_secs, 60);
        assert_eq!(config.delivery.max_attempts, 5);
        assert_eq!(config.delivery.initial_backoff_ms, 500);
        assert_eq!(config.event_buffer_size, 1024);
    }

    #[test]
    fn malformed_json_fails() {
        assert!(EngineConfig::from_json("{not json").is_err());
    }

    #[test]
    fn missing_file_fails() {
        assert!(EngineConfig::load_file("/nonexistent/ward-escalation.json").is_err());
    }

    #[test_case(1, 500 ; "first retry")]
    #[test_case(2, 1000 ; "second retry doubles")]
    #[test_case(3, 2000 ; "third retry doubles again")]
    #[test_case(10, 10_000 ; "capped")]
    fn backoff_grows_and_caps(attempt: u32, expected_ms: u64) {
        let delivery = DeliveryConfig::default();
        assert_eq!(delivery.backoff_after(attempt), Duration::from_millis(expected_ms));
    }
}
