//! Duplicate-notification suppression per (device, sensor, severity).

use std::{
    collections::hash_map::Entry,
    time::{Duration, Instant},
};

use ahash::AHashMap;
use parking_lot::Mutex;
use sentinel_common::{Severity, Signal, config::EmailTimeouts};
use tokio::sync::broadcast;
use tracing::debug;

/// Suppression window per severity.
#[derive(Debug, Clone, Copy)]
pub struct SeverityWindows {
    pub red: Duration,
    pub orange: Duration,
    pub yellow: Duration,
}

impl SeverityWindows {
    #[must_use]
    pub const fn window_for(&self, severity: Severity) -> Duration {
        match severity {
            Severity::Red => self.red,
            Severity::Orange => self.orange,
            Severity::Yellow => self.yellow,
        }
    }
}

impl Default for SeverityWindows {
    fn default() -> Self {
        Self {
            red: Duration::from_secs(300),
            orange: Duration::from_secs(1800),
            yellow: Duration::from_secs(3600),
        }
    }
}

impl From<EmailTimeouts> for SeverityWindows {
    fn from(timeouts: EmailTimeouts) -> Self {
        Self {
            red: timeouts.red,
            orange: timeouts.orange,
            yellow: timeouts.yellow,
        }
    }
}

type Key = (String, String, Severity);

/// At most one notification per window per (device, sensor, severity).
///
/// The timestamp is only refreshed on an allow; denials leave the window
/// anchored at the last delivered notification.
#[derive(Debug)]
pub struct RateLimiter {
    windows: SeverityWindows,
    history: Mutex<AHashMap<Key, Instant>>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(windows: SeverityWindows) -> Self {
        Self {
            windows,
            history: Mutex::new(AHashMap::new()),
        }
    }

    /// Decides whether a notification for this key may go out now, and if
    /// so, opens a fresh suppression window.
    #[must_use]
    pub fn should_send(&self, device_id: &str, sensor_id: &str, severity: Severity) -> bool {
        self.should_send_at(Instant::now(), device_id, sensor_id, severity)
    }

    fn should_send_at(
        &self,
        now: Instant,
        device_id: &str,
        sensor_id: &str,
        severity: Severity,
    ) -> bool {
        let key = (device_id.to_string(), sensor_id.to_string(), severity);
        let window = self.windows.window_for(severity);
        let mut history = self.history.lock();

        match history.entry(key) {
            Entry::Occupied(mut entry) => {
                if now.duration_since(*entry.get()) >= window {
                    entry.insert(now);
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(now);
                true
            }
        }
    }

    /// Drops entries whose window has lapsed twice over; returns the count.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    fn sweep_at(&self, now: Instant) -> usize {
        let mut history = self.history.lock();
        let before = history.len();
        history.retain(|(_, _, severity), last_sent| {
            now.duration_since(*last_sent) <= self.windows.window_for(*severity) * 2
        });
        before - history.len()
    }

    #[must_use]
    pub fn tracked(&self) -> usize {
        self.history.lock().len()
    }

    /// Periodic history sweep, run as a background worker.
    pub async fn serve(&self, interval: Duration, mut shutdown: broadcast::Receiver<Signal>) {
        let mut timer = tokio::time::interval(interval);
        timer.tick().await;

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    let swept = self.sweep();
                    if swept > 0 {
                        debug!(swept, "swept stale rate limiter entries");
                    }
                }
                _ = shutdown.recv() => {
                    debug!("rate limiter sweeper stopping");
                    break;
                }
            }
        }
    }

    #[cfg(test)]
    fn backdate(&self, device_id: &str, sensor_id: &str, severity: Severity, by: Duration) {
        let key = (device_id.to_string(), sensor_id.to_string(), severity);
        let mut history = self.history.lock();
        let last_sent = history.get_mut(&key).expect("entry should exist");
        *last_sent = last_sent.checked_sub(by).unwrap();
    }
}
