//! In-memory `Store` implementation.
//!
//! Primarily a test double for the pipeline crates, but usable anywhere a
//! transient, pre-seeded store is enough.

use std::sync::atomic::{AtomicUsize, Ordering};

use ahash::AHashMap;
use async_trait::async_trait;
use parking_lot::Mutex;
use sentinel_common::Severity;

use crate::{
    error::StoreError,
    store::{EntityNames, Store, Thresholds, select_tiers},
};

/// Recipient lists per severity tier.
#[derive(Debug, Clone, Default)]
pub struct RecipientTiers {
    pub yellow: Vec<String>,
    pub orange: Vec<String>,
    pub red: Vec<String>,
}

/// Pre-seeded in-memory store with lookup counters.
#[derive(Debug, Default)]
pub struct MemoryStore {
    thresholds: Mutex<AHashMap<(String, String), Thresholds>>,
    names: Mutex<AHashMap<String, EntityNames>>,
    recipients: Mutex<AHashMap<String, RecipientTiers>>,
    companies: Mutex<Vec<String>>,
    device_companies: Mutex<AHashMap<String, String>>,
    threshold_lookups: AtomicUsize,
    email_lookups: AtomicUsize,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_thresholds(&self, device_id: &str, sensor_id: &str, thresholds: Thresholds) {
        self.thresholds
            .lock()
            .insert((device_id.to_string(), sensor_id.to_string()), thresholds);
    }

    pub fn set_entity_names(&self, device_id: &str, names: EntityNames) {
        self.names.lock().insert(device_id.to_string(), names);
    }

    pub fn set_recipients(&self, device_id: &str, tiers: RecipientTiers) {
        self.recipients.lock().insert(device_id.to_string(), tiers);
    }

    pub fn set_companies(&self, ids: Vec<String>) {
        *self.companies.lock() = ids;
    }

    pub fn set_company_for_device(&self, device_id: &str, company_id: &str) {
        self.device_companies
            .lock()
            .insert(device_id.to_string(), company_id.to_string());
    }

    /// How many threshold lookups reached the store (as opposed to a cache).
    #[must_use]
    pub fn threshold_lookups(&self) -> usize {
        self.threshold_lookups.load(Ordering::SeqCst)
    }

    /// How many recipient lookups reached the store.
    #[must_use]
    pub fn email_lookups(&self) -> usize {
        self.email_lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn thresholds(
        &self,
        device_id: &str,
        sensor_id: &str,
    ) -> Result<Thresholds, StoreError> {
        self.threshold_lookups.fetch_add(1, Ordering::SeqCst);
        self.thresholds
            .lock()
            .get(&(device_id.to_string(), sensor_id.to_string()))
            .copied()
            .ok_or_else(|| StoreError::ThresholdsMissing {
                device_id: device_id.to_string(),
                sensor_id: sensor_id.to_string(),
            })
    }

    async fn entity_names(&self, device_id: &str) -> Result<EntityNames, StoreError> {
        Ok(self
            .names
            .lock()
            .get(device_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn emails(
        &self,
        device_id: &str,
        severity: Severity,
    ) -> Result<Vec<String>, StoreError> {
        self.email_lookups.fetch_add(1, Ordering::SeqCst);
        let tiers = self.recipients.lock().get(device_id).cloned();
        let recipients = tiers
            .map(|t| select_tiers(&t.yellow, &t.orange, &t.red, severity))
            .unwrap_or_default();

        if recipients.is_empty() {
            Err(StoreError::RecipientsMissing {
                device_id: device_id.to_string(),
                severity,
            })
        } else {
            Ok(recipients)
        }
    }

    async fn company_ids(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.companies.lock().clone())
    }

    async fn company_for_device(&self, device_id: &str) -> Result<Option<String>, StoreError> {
        Ok(self.device_companies.lock().get(device_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[tokio::test]
    async fn missing_rows_map_to_the_right_errors() {
        let store = MemoryStore::new();

        let err = store.thresholds("d1", "s1").await.unwrap_err();
        assert!(matches!(err, StoreError::ThresholdsMissing { .. }));

        let err = store.emails("d1", Severity::Red).await.unwrap_err();
        assert!(matches!(err, StoreError::RecipientsMissing { .. }));

        // Entity names never fail; unknown devices get placeholders.
        let names = store.entity_names("d1").await.unwrap();
        assert_eq!(names, EntityNames::default());
    }

    #[tokio::test]
    async fn tier_filtering_applies() {
        let store = MemoryStore::new();
        store.set_recipients(
            "d1",
            RecipientTiers {
                yellow: vec!["t1@x.com".to_string()],
                orange: vec!["t2@x.com".to_string()],
                red: vec!["t3@x.com".to_string()],
            },
        );

        assert_eq!(
            store.emails("d1", Severity::Yellow).await.unwrap(),
            vec!["t1@x.com"]
        );
        assert_eq!(
            store.emails("d1", Severity::Red).await.unwrap(),
            vec!["t1@x.com", "t2@x.com", "t3@x.com"]
        );
    }

    #[tokio::test]
    async fn company_resolution() {
        let store = MemoryStore::new();
        store.set_companies(vec!["c1".to_string(), "c2".to_string()]);
        store.set_company_for_device("d1", "c2");

        assert_eq!(store.company_ids().await.unwrap(), vec!["c1", "c2"]);
        assert_eq!(
            store.company_for_device("d1").await.unwrap(),
            Some("c2".to_string())
        );
        assert_eq!(store.company_for_device("d9").await.unwrap(), None);
    }
}
