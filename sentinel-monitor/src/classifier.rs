//! Threshold classification: the entry point for every reading coming off
//! the transport.

use std::{sync::Arc, time::Duration};

use sentinel_common::Severity;
use sentinel_store::{DataAccess, Thresholds};
use tracing::{debug, error, info};

use crate::{
    breach::Breach,
    queue::{BreachQueue, BreachQueues},
    reading::{Reading, ReadingsEvent},
    state::DeviceStateManager,
};

/// Minimum continuous time above a warning threshold before it fires.
#[derive(Debug, Clone, Copy)]
pub struct DwellConfig {
    pub yellow: Duration,
    pub orange: Duration,
}

impl Default for DwellConfig {
    fn default() -> Self {
        Self {
            yellow: Duration::from_secs(10),
            orange: Duration::from_secs(5),
        }
    }
}

/// Classifies readings against per-sensor thresholds and feeds the breach
/// queues. Safe to call concurrently; the state manager serializes the
/// per-sensor bookkeeping.
pub struct ThresholdClassifier {
    access: Arc<DataAccess>,
    states: Arc<DeviceStateManager>,
    queues: Arc<BreachQueues>,
    dwell: DwellConfig,
}

impl ThresholdClassifier {
    #[must_use]
    pub fn new(
        access: Arc<DataAccess>,
        states: Arc<DeviceStateManager>,
        queues: Arc<BreachQueues>,
        dwell: DwellConfig,
    ) -> Self {
        Self {
            access,
            states,
            queues,
            dwell,
        }
    }

    /// Runs every reading in the event through the severity ladder.
    ///
    /// Failures are contained per reading: a malformed value or a missing
    /// threshold row drops that reading and the rest of the event still
    /// processes.
    pub async fn classify(&self, event: &ReadingsEvent) {
        let readings = event.readings.as_slice();
        debug!(
            device = %event.device_id,
            readings = readings.len(),
            "checking thresholds"
        );

        for reading in readings {
            self.classify_reading(event, reading).await;
        }
    }

    async fn classify_reading(&self, event: &ReadingsEvent, reading: &Reading) {
        let device_id = &event.device_id;
        let sensor_id = &reading.sensor_id;

        let Some(value) = reading.value_as_f64() else {
            debug!(
                device = %device_id,
                sensor = %sensor_id,
                raw = %reading.value,
                "non-numeric sensor value, reading skipped"
            );
            return;
        };

        let thresholds = match self.access.thresholds(device_id, sensor_id).await {
            Ok(thresholds) => thresholds,
            Err(e) => {
                error!(
                    device = %device_id,
                    sensor = %sensor_id,
                    error = %e,
                    "failed to get thresholds, reading skipped"
                );
                return;
            }
        };

        // First-match ladder: a reading observes at most one level. An
        // orange-tier value does not refresh the yellow dwell this tick.
        if value >= thresholds.red {
            self.emit_red(event, reading, value, thresholds).await;
        } else if value >= thresholds.orange {
            self.observe_and_probe(event, reading, value, Severity::Orange, thresholds.orange)
                .await;
        } else if value >= thresholds.yellow {
            self.observe_and_probe(event, reading, value, Severity::Yellow, thresholds.yellow)
                .await;
        } else {
            self.states
                .observe(device_id, sensor_id, Severity::Yellow, false, None);
            self.states
                .observe(device_id, sensor_id, Severity::Orange, false, None);
        }
    }

    /// Red fires immediately and leaves the dwell state untouched.
    async fn emit_red(
        &self,
        event: &ReadingsEvent,
        reading: &Reading,
        value: f64,
        thresholds: Thresholds,
    ) {
        let breach = self
            .snapshot(event, reading, value, Severity::Red, thresholds.red)
            .await;
        info!(
            device = %event.device_id,
            sensor = %reading.sensor_id,
            value,
            "red threshold breach detected"
        );
        enqueue(&self.queues.critical, breach);
    }

    /// Warning tiers: record the crossing, then probe the dwell. On the very
    /// first above-reading `since` was just set, so the probe cannot fire.
    async fn observe_and_probe(
        &self,
        event: &ReadingsEvent,
        reading: &Reading,
        value: f64,
        level: Severity,
        threshold_value: f64,
    ) {
        let breach = self
            .snapshot(event, reading, value, level, threshold_value)
            .await;
        let device_id = &event.device_id;
        let sensor_id = &reading.sensor_id;

        self.states
            .observe(device_id, sensor_id, level, true, Some(breach));

        let dwell = match level {
            Severity::Yellow => self.dwell.yellow,
            Severity::Orange => self.dwell.orange,
            Severity::Red => return,
        };

        if let Some(sustained) = self.states.take_if_sustained(device_id, sensor_id, level, dwell)
        {
            info!(
                device = %device_id,
                sensor = %sensor_id,
                severity = %level,
                "sustained breach detected"
            );
            enqueue(&self.queues.warning, sustained);
        }
    }

    async fn snapshot(
        &self,
        event: &ReadingsEvent,
        reading: &Reading,
        value: f64,
        severity: Severity,
        threshold_value: f64,
    ) -> Breach {
        // Entity naming is best-effort: a store hiccup falls back to the
        // placeholder names rather than dropping the breach.
        let names = self
            .access
            .entity_names(&event.device_id)
            .await
            .unwrap_or_default();

        Breach {
            device_id: event.device_id.clone(),
            sensor_id: reading.sensor_id.clone(),
            factory_name: names.factory,
            zone_name: names.zone,
            machine_name: names.machine,
            sensor_type: reading.sensor_type.clone(),
            sensor_value: value,
            timestamp: event.time.to_string(),
            severity,
            threshold_value,
        }
    }
}

fn enqueue(queue: &BreachQueue, breach: Breach) {
    if let Err(e) = queue.push(breach) {
        error!(error = %e, "failed to queue breach");
    }
}
