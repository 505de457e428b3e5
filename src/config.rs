//! Transfer configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Number of batches that may wait between the scanner and the restorer.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Expiration given to every restored key (24 hours). Not derived from the
/// source key's own expiration.
pub const RESTORE_TTL: Duration = Duration::from_secs(86_400);

/// What the scanner does when a key disappears between SCAN and DUMP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingKeyPolicy {
    /// Abort the transfer with [`Error::KeyNotFound`].
    #[default]
    Fail,
    /// Log the key, count it as skipped and carry on.
    Skip,
}

/// Settings for one transfer run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Queue depth between the two tasks.
    pub queue_capacity: usize,
    /// Expiration for every restored key.
    pub restore_ttl: Duration,
    /// Optional `COUNT` hint sent with each SCAN step.
    pub scan_count: Option<u64>,
    /// Handling of keys that vanish mid-transfer.
    pub missing_keys: MissingKeyPolicy,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            restore_ttl: RESTORE_TTL,
            scan_count: None,
            missing_keys: MissingKeyPolicy::Fail,
        }
    }
}

impl TransferConfig {
    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(Error::Config("queue_capacity must be at least 1".into()));
        }
        // RESTORE treats 0 as "no expiry"; sub-millisecond values would round to it.
        if self.restore_ttl.as_millis() == 0 {
            return Err(Error::Config("restore_ttl must be at least 1ms".into()));
        }
        if self.scan_count == Some(0) {
            return Err(Error::Config("scan_count must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TransferConfig::default();
        assert_eq!(config.queue_capacity, 100);
        assert_eq!(config.restore_ttl, Duration::from_secs(86_400));
        assert_eq!(config.missing_keys, MissingKeyPolicy::Fail);
        assert!(config.scan_count.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects() {
        let config = TransferConfig {
            queue_capacity: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = TransferConfig {
            restore_ttl: Duration::from_micros(10),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = TransferConfig {
            scan_count: Some(0),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_serde_partial() {
        let config: TransferConfig =
            serde_json::from_str(r#"{"missing_keys":"skip","scan_count":500}"#).unwrap();
        assert_eq!(config.missing_keys, MissingKeyPolicy::Skip);
        assert_eq!(config.scan_count, Some(500));
        assert_eq!(config.queue_capacity, DEFAULT_QUEUE_CAPACITY);
    }
}
