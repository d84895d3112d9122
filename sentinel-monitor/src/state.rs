//! Per-(device, sensor) sustained-breach state.
//!
//! Yellow and Orange breaches only fire after the value has stayed above the
//! threshold for a dwell period; this module holds that state. Red is
//! stateless and never touches it. Consuming a sustained breach resets the
//! level, so the value must drop below the threshold and cross again before
//! the same level can fire another sustained breach.

use std::time::{Duration, Instant};

use ahash::AHashMap;
use parking_lot::Mutex;
use sentinel_common::{Severity, Signal};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::breach::Breach;

/// Dwell state for one severity level of one sensor.
///
/// Invariant: `above == since.is_some() == pending.is_some()`.
#[derive(Debug, Default)]
struct LevelState {
    above: bool,
    since: Option<Instant>,
    pending: Option<Breach>,
}

#[derive(Debug, Default)]
struct SensorState {
    yellow: LevelState,
    orange: LevelState,
}

impl SensorState {
    fn level_mut(&mut self, level: Severity) -> Option<&mut LevelState> {
        match level {
            Severity::Yellow => Some(&mut self.yellow),
            Severity::Orange => Some(&mut self.orange),
            Severity::Red => None,
        }
    }
}

#[derive(Debug, Default)]
struct Maps {
    states: AHashMap<(String, String), SensorState>,
    last_access: AHashMap<String, Instant>,
}

/// Concurrency-safe sustained-breach tracker with idle eviction.
///
/// One mutex guards both maps so observe / take / sweep are each atomic.
#[derive(Debug)]
pub struct DeviceStateManager {
    inner: Mutex<Maps>,
    max_idle: Duration,
}

impl DeviceStateManager {
    #[must_use]
    pub fn new(max_idle: Duration) -> Self {
        Self {
            inner: Mutex::new(Maps::default()),
            max_idle,
        }
    }

    /// Records whether the sensor is above `level`'s threshold.
    ///
    /// A fresh crossing stores `now` and the breach snapshot; re-observation
    /// while already above is a no-op so the original crossing instant keeps
    /// measuring the dwell. `above = false` clears the level entirely.
    pub fn observe(
        &self,
        device_id: &str,
        sensor_id: &str,
        level: Severity,
        above: bool,
        pending: Option<Breach>,
    ) {
        self.observe_at(Instant::now(), device_id, sensor_id, level, above, pending);
    }

    fn observe_at(
        &self,
        now: Instant,
        device_id: &str,
        sensor_id: &str,
        level: Severity,
        above: bool,
        pending: Option<Breach>,
    ) {
        let mut maps = self.inner.lock();
        maps.last_access.insert(device_id.to_string(), now);

        let state = maps
            .states
            .entry((device_id.to_string(), sensor_id.to_string()))
            .or_default();
        let Some(slot) = state.level_mut(level) else {
            warn!(device = %device_id, sensor = %sensor_id, "red severity has no dwell state");
            return;
        };

        if above {
            if !slot.above {
                slot.above = true;
                slot.since = Some(now);
                slot.pending = pending;
            }
        } else {
            *slot = LevelState::default();
        }
    }

    /// Atomically consumes and returns the pending breach if the level has
    /// been above its threshold for at least `dwell`.
    #[must_use]
    pub fn take_if_sustained(
        &self,
        device_id: &str,
        sensor_id: &str,
        level: Severity,
        dwell: Duration,
    ) -> Option<Breach> {
        self.take_if_sustained_at(Instant::now(), device_id, sensor_id, level, dwell)
    }

    fn take_if_sustained_at(
        &self,
        now: Instant,
        device_id: &str,
        sensor_id: &str,
        level: Severity,
        dwell: Duration,
    ) -> Option<Breach> {
        let mut maps = self.inner.lock();
        maps.last_access.insert(device_id.to_string(), now);

        let state = maps
            .states
            .get_mut(&(device_id.to_string(), sensor_id.to_string()))?;
        let slot = state.level_mut(level)?;

        if slot.above
            && slot
                .since
                .is_some_and(|since| now.duration_since(since) >= dwell)
        {
            let breach = slot.pending.take();
            *slot = LevelState::default();
            breach
        } else {
            None
        }
    }

    /// Removes every device whose state has not been touched within
    /// `max_idle`; returns how many devices were evicted.
    pub fn evict_idle(&self) -> usize {
        self.evict_idle_at(Instant::now())
    }

    fn evict_idle_at(&self, now: Instant) -> usize {
        let mut maps = self.inner.lock();
        let max_idle = self.max_idle;

        let stale: Vec<String> = maps
            .last_access
            .iter()
            .filter(|(_, last)| now.duration_since(**last) > max_idle)
            .map(|(device, _)| device.clone())
            .collect();

        for device in &stale {
            maps.last_access.remove(device);
        }
        maps.states.retain(|(device, _), _| !stale.contains(device));

        stale.len()
    }

    #[must_use]
    pub fn tracked_devices(&self) -> usize {
        self.inner.lock().last_access.len()
    }

    /// Periodic idle-eviction sweep, run as a background worker.
    pub async fn serve(&self, interval: Duration, mut shutdown: broadcast::Receiver<Signal>) {
        let mut timer = tokio::time::interval(interval);
        timer.tick().await;

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    let evicted = self.evict_idle();
                    if evicted > 0 {
                        debug!(evicted, "evicted idle device states");
                    }
                }
                _ = shutdown.recv() => {
                    debug!("device state sweeper stopping");
                    break;
                }
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn backdate_since(
        &self,
        device_id: &str,
        sensor_id: &str,
        level: Severity,
        by: Duration,
    ) {
        let mut maps = self.inner.lock();
        let state = maps
            .states
            .get_mut(&(device_id.to_string(), sensor_id.to_string()))
            .expect("state should exist");
        let slot = state.level_mut(level).expect("warning level expected");
        let since = slot.since.expect("level should be above");
        slot.since = Some(since.checked_sub(by).unwrap());
    }
}
