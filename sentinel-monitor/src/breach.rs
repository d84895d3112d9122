//! The breach record that flows from the classifier to the notifier.

use sentinel_common::Severity;

/// A sensor reading that crossed a threshold, snapshotted with everything
/// the notification needs. Immutable once enqueued; lives for a single
/// pipeline traversal.
#[derive(Debug, Clone, PartialEq)]
pub struct Breach {
    pub device_id: String,
    pub sensor_id: String,
    pub factory_name: String,
    pub zone_name: String,
    pub machine_name: String,
    pub sensor_type: String,
    pub sensor_value: f64,
    pub timestamp: String,
    pub severity: Severity,
    pub threshold_value: f64,
}

impl Breach {
    /// Lexicographic rendering order for email rows.
    #[must_use]
    pub fn sort_key(&self) -> (&str, &str, &str, &str, &str) {
        (
            &self.timestamp,
            &self.factory_name,
            &self.zone_name,
            &self.device_id,
            &self.sensor_id,
        )
    }
}
