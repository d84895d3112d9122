//! Error types for store lookups.

use sentinel_common::Severity;
use thiserror::Error;

/// Errors surfaced by [`crate::Store`] implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No threshold row exists for the (device, sensor) pair.
    #[error("no thresholds configured for {device_id}/{sensor_id}")]
    ThresholdsMissing {
        device_id: String,
        sensor_id: String,
    },

    /// No recipients are configured for the device at the given severity.
    #[error("no {severity} recipients configured for {device_id}")]
    RecipientsMissing {
        device_id: String,
        severity: Severity,
    },

    /// The store itself failed (connection, query, decode).
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    /// `true` for the configuration gaps the pipeline skips over, as opposed
    /// to transient store failures.
    #[must_use]
    pub const fn is_missing_reference(&self) -> bool {
        matches!(
            self,
            Self::ThresholdsMissing { .. } | Self::RecipientsMissing { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        let err = StoreError::ThresholdsMissing {
            device_id: "d1".into(),
            sensor_id: "s1".into(),
        };
        assert!(err.is_missing_reference());
        assert_eq!(err.to_string(), "no thresholds configured for d1/s1");

        let err = StoreError::RecipientsMissing {
            device_id: "d1".into(),
            severity: Severity::Red,
        };
        assert!(err.is_missing_reference());
        assert_eq!(err.to_string(), "no red recipients configured for d1");

        let err = StoreError::Database(sqlx::Error::PoolClosed);
        assert!(!err.is_missing_reference());
    }
}
