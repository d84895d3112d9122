//! Periodic queue drainers, one per channel.

use std::{path::Path, sync::Arc, time::Duration};

use sentinel_common::{Channel, Signal, breachlog::BreachLog};
use sentinel_monitor::{Breach, BreachQueue, BreachQueues};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::notifier::Notifier;

/// The two breach audit files, keyed by channel.
#[derive(Debug)]
pub struct ChannelLogs {
    red: BreachLog,
    non_red: BreachLog,
}

impl ChannelLogs {
    /// Logs in the working directory, the production layout.
    #[must_use]
    pub fn new() -> Self {
        Self::in_dir(Path::new("."))
    }

    #[must_use]
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            red: BreachLog::new(dir.join(Channel::Critical.log_file())),
            non_red: BreachLog::new(dir.join(Channel::Warning.log_file())),
        }
    }

    #[must_use]
    pub const fn for_channel(&self, channel: Channel) -> &BreachLog {
        match channel {
            Channel::Critical => &self.red,
            Channel::Warning => &self.non_red,
        }
    }
}

impl Default for ChannelLogs {
    fn default() -> Self {
        Self::new()
    }
}

/// Single consumer of one breach queue, on a fixed cadence.
///
/// Each cycle takes an atomic snapshot of the queue and hands a non-empty
/// batch to the notifier. The notifier contains its own failures, so a bad
/// batch cannot stop the cadence.
pub struct QueueDrainer {
    queues: Arc<BreachQueues>,
    notifier: Arc<Notifier>,
    logs: Arc<ChannelLogs>,
}

impl QueueDrainer {
    #[must_use]
    pub fn new(queues: Arc<BreachQueues>, notifier: Arc<Notifier>, logs: Arc<ChannelLogs>) -> Self {
        Self {
            queues,
            notifier,
            logs,
        }
    }

    /// Drain loop for one channel, run as a background worker. On shutdown
    /// the queue is flushed one final time.
    pub async fn serve(
        &self,
        channel: Channel,
        interval: Duration,
        mut shutdown: broadcast::Receiver<Signal>,
    ) {
        let queue = self.queues.queue_for(channel);
        let mut timer = tokio::time::interval(interval);

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    self.drain_cycle(queue, channel).await;
                }
                _ = shutdown.recv() => {
                    debug!(%channel, "drainer stopping, flushing final batch");
                    self.drain_cycle(queue, channel).await;
                    break;
                }
            }
        }
    }

    /// One snapshot-and-process cycle.
    pub async fn drain_cycle(&self, queue: &BreachQueue, channel: Channel) {
        let batch = queue.drain();
        if batch.is_empty() {
            return;
        }

        info!(count = batch.len(), %channel, "processing drained breaches");
        self.append_audit_lines(&batch, channel);
        self.notifier.process_breaches(&batch, channel).await;
    }

    fn append_audit_lines(&self, batch: &[Breach], channel: Channel) {
        let log = self.logs.for_channel(channel);

        let header = format!("Processing {} {channel} breaches", batch.len());
        if let Err(e) = log.append(&header) {
            warn!(error = %e, file = %log.path().display(), "could not append to breach log");
            return;
        }

        for (i, breach) in batch.iter().enumerate() {
            let line = format!(
                "Breach {}: Device={}, Sensor={}, Severity={}",
                i + 1,
                breach.device_id,
                breach.sensor_id,
                breach.severity
            );
            if let Err(e) = log.append(&line) {
                warn!(error = %e, "could not append to breach log");
                break;
            }
        }
    }
}
