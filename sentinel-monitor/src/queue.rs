//! Bounded breach queues between the classifier and the drainers.
//!
//! Multi-producer, single-consumer. Producers never block: a full queue
//! rejects the push and the breach is dropped (backpressure by shedding,
//! never by stalling ingress). The consumer takes an atomic snapshot of
//! everything enqueued so far; later arrivals land in the next batch.

use std::{
    collections::VecDeque,
    sync::atomic::{AtomicUsize, Ordering},
};

use parking_lot::Mutex;
use sentinel_common::Channel;
use thiserror::Error;
use tracing::warn;

use crate::breach::Breach;

/// Push failed because the queue is at capacity; the breach is discarded.
#[derive(Debug, Error)]
#[error("{channel} breach queue is full ({capacity}), breach discarded")]
pub struct QueueFull {
    pub channel: Channel,
    pub capacity: usize,
}

/// One severity channel's FIFO queue, capped at `capacity`.
#[derive(Debug)]
pub struct BreachQueue {
    channel: Channel,
    capacity: usize,
    items: Mutex<VecDeque<Breach>>,
    high_water: AtomicUsize,
}

impl BreachQueue {
    #[must_use]
    pub fn new(channel: Channel, capacity: usize) -> Self {
        Self {
            channel,
            capacity,
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            high_water: AtomicUsize::new(0),
        }
    }

    /// Non-blocking enqueue.
    pub fn push(&self, breach: Breach) -> Result<(), QueueFull> {
        let occupancy = {
            let mut items = self.items.lock();
            if items.len() >= self.capacity {
                return Err(QueueFull {
                    channel: self.channel,
                    capacity: self.capacity,
                });
            }
            items.push_back(breach);
            items.len()
        };

        if occupancy > self.high_water.load(Ordering::Relaxed) {
            self.high_water.store(occupancy, Ordering::Relaxed);
            if occupancy * 5 > self.capacity * 4 {
                warn!(
                    channel = %self.channel,
                    occupancy,
                    capacity = self.capacity,
                    "breach queue above 80% capacity"
                );
            }
        }

        Ok(())
    }

    /// Atomically takes everything currently queued. Breaches pushed after
    /// the swap go to the next drain cycle.
    #[must_use]
    pub fn drain(&self) -> Vec<Breach> {
        std::mem::take(&mut *self.items.lock()).into()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    #[must_use]
    pub fn high_water_mark(&self) -> usize {
        self.high_water.load(Ordering::Relaxed)
    }

    #[must_use]
    pub const fn channel(&self) -> Channel {
        self.channel
    }
}

/// The critical/warning queue pair.
#[derive(Debug)]
pub struct BreachQueues {
    pub critical: BreachQueue,
    pub warning: BreachQueue,
}

impl BreachQueues {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            critical: BreachQueue::new(Channel::Critical, capacity),
            warning: BreachQueue::new(Channel::Warning, capacity),
        }
    }

    #[must_use]
    pub const fn queue_for(&self, channel: Channel) -> &BreachQueue {
        match channel {
            Channel::Critical => &self.critical,
            Channel::Warning => &self.warning,
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use sentinel_common::Severity;

    use super::*;

    fn breach(sensor: &str) -> Breach {
        Breach {
            device_id: "d1".to_string(),
            sensor_id: sensor.to_string(),
            factory_name: "F".to_string(),
            zone_name: "Z".to_string(),
            machine_name: "M".to_string(),
            sensor_type: "temperature".to_string(),
            sensor_value: 42.0,
            timestamp: "t0".to_string(),
            severity: Severity::Red,
            threshold_value: 30.0,
        }
    }

    #[test]
    fn fifo_order_is_preserved() {
        let queue = BreachQueue::new(Channel::Critical, 10);
        queue.push(breach("s1")).unwrap();
        queue.push(breach("s2")).unwrap();

        let batch = queue.drain();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].sensor_id, "s1");
        assert_eq!(batch[1].sensor_id, "s2");
    }

    #[test]
    fn full_queue_rejects_without_blocking() {
        let queue = BreachQueue::new(Channel::Warning, 2);
        queue.push(breach("s1")).unwrap();
        queue.push(breach("s2")).unwrap();

        let err = queue.push(breach("s3")).unwrap_err();
        assert_eq!(err.capacity, 2);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn drain_takes_a_snapshot() {
        let queue = BreachQueue::new(Channel::Critical, 10);
        queue.push(breach("s1")).unwrap();

        let batch = queue.drain();
        assert_eq!(batch.len(), 1);
        assert!(queue.is_empty());

        // A later push belongs to the next cycle.
        queue.push(breach("s2")).unwrap();
        assert_eq!(queue.drain().len(), 1);
    }

    #[test]
    fn high_water_mark_tracks_peak_occupancy() {
        let queue = BreachQueue::new(Channel::Critical, 10);
        for i in 0..4 {
            queue.push(breach(&format!("s{i}"))).unwrap();
        }
        let _ = queue.drain();
        queue.push(breach("s9")).unwrap();

        assert_eq!(queue.high_water_mark(), 4);
    }
}
