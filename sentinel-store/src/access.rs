//! Cached facade over the store: the one object the pipeline reads through.

use std::{sync::Arc, time::Duration};

use sentinel_common::{Severity, Signal};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::{
    cache::TtlCache,
    error::StoreError,
    store::{EntityNames, Store, Thresholds},
};

/// Fronts an [`Store`] with TTL caches over the two slow per-reading
/// lookups (thresholds and recipients). Entity names and company queries
/// pass straight through.
pub struct DataAccess {
    store: Arc<dyn Store>,
    thresholds: TtlCache<(String, String), Thresholds>,
    recipients: TtlCache<(String, Severity), Vec<String>>,
}

impl DataAccess {
    #[must_use]
    pub fn new(store: Arc<dyn Store>, threshold_ttl: Duration, recipient_ttl: Duration) -> Self {
        Self {
            store,
            thresholds: TtlCache::new(threshold_ttl),
            recipients: TtlCache::new(recipient_ttl),
        }
    }

    pub async fn thresholds(
        &self,
        device_id: &str,
        sensor_id: &str,
    ) -> Result<Thresholds, StoreError> {
        let key = (device_id.to_string(), sensor_id.to_string());
        self.thresholds
            .get_or_load(key, || {
                debug!(device = %device_id, sensor = %sensor_id, "threshold cache miss");
                self.store.thresholds(device_id, sensor_id)
            })
            .await
    }

    pub async fn emails(
        &self,
        device_id: &str,
        severity: Severity,
    ) -> Result<Vec<String>, StoreError> {
        let key = (device_id.to_string(), severity);
        self.recipients
            .get_or_load(key, || {
                debug!(device = %device_id, %severity, "recipient cache miss");
                self.store.emails(device_id, severity)
            })
            .await
    }

    pub async fn entity_names(&self, device_id: &str) -> Result<EntityNames, StoreError> {
        self.store.entity_names(device_id).await
    }

    pub async fn company_ids(&self) -> Result<Vec<String>, StoreError> {
        self.store.company_ids().await
    }

    pub async fn company_for_device(
        &self,
        device_id: &str,
    ) -> Result<Option<String>, StoreError> {
        self.store.company_for_device(device_id).await
    }

    /// Drops expired entries from both caches; returns the removed counts.
    pub fn cleanup_caches(&self) -> (usize, usize) {
        (self.thresholds.cleanup(), self.recipients.cleanup())
    }

    pub fn clear_caches(&self) {
        self.thresholds.clear();
        self.recipients.clear();
        info!("caches cleared");
    }

    /// Periodic cache sweep, run as a background worker.
    pub async fn serve(&self, interval: Duration, mut shutdown: broadcast::Receiver<Signal>) {
        let mut timer = tokio::time::interval(interval);
        timer.tick().await;

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    let (thresholds, recipients) = self.cleanup_caches();
                    if thresholds + recipients > 0 {
                        debug!(thresholds, recipients, "swept expired cache entries");
                    }
                }
                _ = shutdown.recv() => {
                    debug!("cache sweeper stopping");
                    break;
                }
            }
        }
    }
}
