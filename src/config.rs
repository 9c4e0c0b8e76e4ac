//! Configuration for the coalescer, the executor and the sync helpers.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};

/// Provider-imposed ceiling on sub-requests per batch envelope.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 200;

/// How the executor bounds the number of in-flight items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConcurrencyMode {
    /// A semaphore with `max_workers` permits gates dispatch
    #[default]
    Bounded,
    /// Chunks only shape the work; every item is dispatched at once
    Advisory,
}

/// Configuration for a sync session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Maximum number of sub-requests in one batch envelope
    pub max_batch_size: usize,

    /// Concurrency limit for fan-out calls
    pub max_workers: usize,

    /// Deadline for each fan-out item in milliseconds
    pub item_timeout_ms: u64,

    /// Timeout handed to the HTTP client for each network call in milliseconds
    pub request_timeout_ms: u64,

    /// Whether fan-out calls report progress
    pub show_progress: bool,

    /// Minimum gap between two rendered progress lines in milliseconds
    pub progress_interval_ms: u64,

    /// `api-version` query parameter sent to the provider
    pub api_version: String,

    pub concurrency_mode: ConcurrencyMode,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            max_workers: 10,
            item_timeout_ms: 30_000,
            request_timeout_ms: 60_000,
            show_progress: false,
            progress_interval_ms: 500,
            api_version: "7.1".to_string(),
            concurrency_mode: ConcurrencyMode::Bounded,
        }
    }
}

impl SyncConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_batch_size == 0 {
            return Err(SyncError::Validation(
                "max_batch_size must be at least 1".to_string(),
            ));
        }
        if self.max_workers == 0 {
            return Err(SyncError::Validation(
                "max_workers must be at least 1".to_string(),
            ));
        }
        if self.item_timeout_ms == 0 || self.request_timeout_ms == 0 {
            return Err(SyncError::Validation(
                "timeouts must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn item_timeout(&self) -> Duration {
        Duration::from_millis(self.item_timeout_ms)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = SyncConfig::default();
        assert_eq!(config.max_batch_size, 200);
        assert_eq!(config.concurrency_mode, ConcurrencyMode::Bounded);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: SyncConfig =
            serde_json::from_str(r#"{"max_workers": 4, "concurrency_mode": "advisory"}"#).unwrap();
        assert_eq!(config.max_workers, 4);
        assert_eq!(config.concurrency_mode, ConcurrencyMode::Advisory);
        assert_eq!(config.max_batch_size, DEFAULT_MAX_BATCH_SIZE);
        assert_eq!(config.api_version, "7.1");
    }

    #[test]
    fn test_zero_values_rejected() {
        for config in [
            SyncConfig {
                max_batch_size: 0,
                ..Default::default()
            },
            SyncConfig {
                max_workers: 0,
                ..Default::default()
            },
            SyncConfig {
                item_timeout_ms: 0,
                ..Default::default()
            },
        ] {
            assert!(matches!(config.validate(), Err(SyncError::Validation(_))));
        }
    }
}
