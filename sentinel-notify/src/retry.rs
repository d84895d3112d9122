//! Bounded re-delivery of emails the relay refused.

use std::{
    cmp::Ordering,
    collections::BinaryHeap,
    sync::Arc,
    time::{Duration, Instant},
};

use parking_lot::Mutex;
use sentinel_common::Signal;
use tokio::sync::broadcast;
use tracing::{debug, error, info};

use crate::mailer::{Mailer, OutboundEmail};

/// How many times a message may be re-attempted and how far apart.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub const fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

/// One scheduled re-delivery.
#[derive(Debug, Clone)]
pub struct RetryRecord {
    pub email: OutboundEmail,
    pub attempt: u32,
    pub next_try: Instant,
}

// Min-heap on `next_try`: the soonest retry sits at the top.
struct HeapEntry(RetryRecord);

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.0.next_try == other.0.next_try
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other.0.next_try.cmp(&self.0.next_try)
    }
}

/// Unbounded queue of scheduled re-deliveries, ordered by `next_try`.
#[derive(Default)]
pub struct RetryQueue {
    entries: Mutex<BinaryHeap<HeapEntry>>,
}

impl RetryQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&self, email: OutboundEmail, attempt: u32, next_try: Instant) {
        self.entries
            .lock()
            .push(HeapEntry(RetryRecord {
                email,
                attempt,
                next_try,
            }));
    }

    /// Pops the soonest record if its time has come.
    #[must_use]
    pub fn pop_ready(&self, now: Instant) -> Option<RetryRecord> {
        let mut entries = self.entries.lock();
        if entries.peek().is_some_and(|entry| entry.0.next_try <= now) {
            entries.pop().map(|entry| entry.0)
        } else {
            None
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

/// Single consumer of the retry queue.
pub struct RetryWorker {
    queue: Arc<RetryQueue>,
    mailer: Arc<dyn Mailer>,
    policy: RetryPolicy,
    poll_interval: Duration,
}

impl RetryWorker {
    #[must_use]
    pub fn new(
        queue: Arc<RetryQueue>,
        mailer: Arc<dyn Mailer>,
        policy: RetryPolicy,
        poll_interval: Duration,
    ) -> Self {
        Self {
            queue,
            mailer,
            policy,
            poll_interval,
        }
    }

    /// Drains everything currently due, attempting each once.
    pub async fn run_once(&self) {
        while let Some(record) = self.queue.pop_ready(Instant::now()) {
            self.attempt(record).await;
        }
    }

    async fn attempt(&self, record: RetryRecord) {
        let RetryRecord { email, attempt, .. } = record;

        match self.mailer.send(&email).await {
            Ok(()) => {
                info!(attempt, "email retry succeeded");
            }
            Err(e) if self.policy.should_retry(attempt) => {
                let next = attempt + 1;
                info!(
                    error = %e,
                    attempt = next,
                    max = self.policy.max_attempts,
                    "email queued for retry"
                );
                self.queue
                    .schedule(email, next, Instant::now() + self.policy.delay);
            }
            Err(e) => {
                error!(
                    error = %e,
                    attempts = attempt,
                    recipients = ?email.recipients,
                    subject = %email.subject,
                    "email permanently failed"
                );
            }
        }
    }

    /// Retry loop, run as a background worker.
    pub async fn serve(&self, mut shutdown: broadcast::Receiver<Signal>) {
        loop {
            tokio::select! {
                () = tokio::time::sleep(self.poll_interval) => {
                    self.run_once().await;
                }
                _ = shutdown.recv() => {
                    debug!(pending = self.queue.len(), "retry worker stopping");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering as AtomicOrdering},
    };

    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::mailer::SendError;

    struct FlakyMailer {
        attempts: AtomicUsize,
        fail_first: usize,
    }

    impl FlakyMailer {
        fn failing(fail_first: usize) -> Self {
            Self {
                attempts: AtomicUsize::new(0),
                fail_first,
            }
        }
    }

    #[async_trait]
    impl Mailer for FlakyMailer {
        async fn send(&self, _email: &OutboundEmail) -> Result<(), SendError> {
            let n = self.attempts.fetch_add(1, AtomicOrdering::SeqCst);
            if n < self.fail_first {
                Err(SendError::EmptyEnvelope)
            } else {
                Ok(())
            }
        }
    }

    fn email() -> OutboundEmail {
        OutboundEmail {
            recipients: vec!["a@x.com".to_string()],
            subject: "s".to_string(),
            html_body: "b".to_string(),
        }
    }

    #[test]
    fn queue_orders_by_next_try() {
        let queue = RetryQueue::new();
        let now = Instant::now();
        queue.schedule(email(), 1, now + Duration::from_secs(60));
        queue.schedule(email(), 2, now);

        let first = queue.pop_ready(now).expect("due record");
        assert_eq!(first.attempt, 2);
        // The other record is not due yet.
        assert!(queue.pop_ready(now).is_none());
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn reschedules_until_success() {
        let queue = Arc::new(RetryQueue::new());
        let mailer = Arc::new(FlakyMailer::failing(1));
        let policy = RetryPolicy {
            max_attempts: 3,
            delay: Duration::from_millis(5),
        };
        let worker = RetryWorker::new(
            Arc::clone(&queue),
            Arc::clone(&mailer) as Arc<dyn Mailer>,
            policy,
            Duration::from_millis(5),
        );

        queue.schedule(email(), 1, Instant::now());
        worker.run_once().await; // fails, rescheduled as attempt 2
        assert_eq!(queue.len(), 1);

        tokio::time::sleep(Duration::from_millis(10)).await;
        worker.run_once().await; // succeeds
        assert!(queue.is_empty());
        assert_eq!(mailer.attempts.load(AtomicOrdering::SeqCst), 2);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let queue = Arc::new(RetryQueue::new());
        let mailer = Arc::new(FlakyMailer::failing(usize::MAX));
        let policy = RetryPolicy {
            max_attempts: 3,
            delay: Duration::from_millis(2),
        };
        let worker = RetryWorker::new(
            Arc::clone(&queue),
            Arc::clone(&mailer) as Arc<dyn Mailer>,
            policy,
            Duration::from_millis(2),
        );

        queue.schedule(email(), 1, Instant::now());
        for _ in 0..5 {
            worker.run_once().await;
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        // Attempts 1, 2, 3 ran; the bound stopped anything further.
        assert!(queue.is_empty());
        assert_eq!(mailer.attempts.load(AtomicOrdering::SeqCst), 3);
    }
}
