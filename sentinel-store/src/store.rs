//! The `Store` seam and the row types it returns.

use async_trait::async_trait;
use sentinel_common::Severity;

use crate::error::StoreError;

/// Threshold triple for a (device, sensor) pair, `yellow <= orange <= red`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub yellow: f64,
    pub orange: f64,
    pub red: f64,
}

/// Naming chain a device hangs off: factory, zone, machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityNames {
    pub factory: String,
    pub zone: String,
    pub machine: String,
}

impl Default for EntityNames {
    fn default() -> Self {
        Self {
            factory: "Unknown Factory".to_string(),
            zone: "Unknown Zone".to_string(),
            machine: "Unknown Machine".to_string(),
        }
    }
}

/// Read-only access to the relational schema.
///
/// Implementations must be cheap to share behind an `Arc<dyn Store>`; the
/// cached facade in [`crate::DataAccess`] fronts the slow lookups.
#[async_trait]
pub trait Store: Send + Sync {
    /// Threshold triple for a sensor. Absence of the row is
    /// [`StoreError::ThresholdsMissing`].
    async fn thresholds(&self, device_id: &str, sensor_id: &str)
    -> Result<Thresholds, StoreError>;

    /// Naming chain for a device. An unknown device yields the
    /// `Unknown …` placeholders rather than an error.
    async fn entity_names(&self, device_id: &str) -> Result<EntityNames, StoreError>;

    /// Recipients for a device filtered by severity tier: yellow gets tier 1,
    /// orange tiers 1+2, red all three. Trimmed, non-empty addresses only;
    /// an empty result is [`StoreError::RecipientsMissing`].
    async fn emails(&self, device_id: &str, severity: Severity)
    -> Result<Vec<String>, StoreError>;

    /// Every company id; the transport subscribes to one channel per entry.
    async fn company_ids(&self) -> Result<Vec<String>, StoreError>;

    /// Resolves the owning company of a device by walking the entity tree.
    async fn company_for_device(&self, device_id: &str) -> Result<Option<String>, StoreError>;
}

/// Applies the severity tier filter shared by every `Store` implementation:
/// yellow notifies tier 1, orange tiers 1+2, red all three.
pub(crate) fn select_tiers(
    yellow: &[String],
    orange: &[String],
    red: &[String],
    severity: Severity,
) -> Vec<String> {
    let tiers: &[&[String]] = match severity {
        Severity::Yellow => &[yellow],
        Severity::Orange => &[yellow, orange],
        Severity::Red => &[yellow, orange, red],
    };

    tiers
        .iter()
        .flat_map(|tier| tier.iter())
        .map(|email| email.trim())
        .filter(|email| !email.is_empty())
        .map(str::to_string)
        .collect()
}
