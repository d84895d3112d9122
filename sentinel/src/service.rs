//! Construction and supervision of the alerting pipeline.

use std::{sync::Arc, time::Duration};

use sentinel_common::{Channel, Signal, config::Config};
use sentinel_monitor::{
    BreachQueues, DeviceStateManager, DwellConfig, ThresholdClassifier,
};
use sentinel_notify::{
    Mailer, Notifier, NotifierConfig, QueueDrainer, RateLimiter, RetryPolicy, RetryQueue,
    RetryWorker, SmtpConfig, SmtpMailer, drain::ChannelLogs,
};
use sentinel_store::{DataAccess, Store};
use tokio::{sync::broadcast, task::JoinHandle};
use tracing::{error, info, warn};

use crate::transport::Transport;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Owns every pipeline component and its background workers.
pub struct Service {
    config: Config,
    access: Arc<DataAccess>,
    states: Arc<DeviceStateManager>,
    queues: Arc<BreachQueues>,
    limiter: Arc<RateLimiter>,
    classifier: Arc<ThresholdClassifier>,
    drainer: Arc<QueueDrainer>,
    retry_worker: Arc<RetryWorker>,
    shutdown: broadcast::Sender<Signal>,
}

impl Service {
    /// Wires the full pipeline against the given store.
    #[must_use]
    pub fn new(config: Config, store: Arc<dyn Store>) -> Self {
        let access = Arc::new(DataAccess::new(
            store,
            config.threshold_cache_ttl,
            config.email_cache_ttl,
        ));
        let states = Arc::new(DeviceStateManager::new(config.state_max_idle));
        let queues = Arc::new(BreachQueues::new(config.queue_size));
        let limiter = Arc::new(RateLimiter::new(config.email_timeouts.into()));
        let retries = Arc::new(RetryQueue::new());

        let mailer: Arc<dyn Mailer> = Arc::new(SmtpMailer::new(SmtpConfig {
            server: config.smtp_server.clone(),
            port: config.smtp_port,
            sender: config.sender_email.clone(),
            password: config.email_password.clone(),
            starttls: true,
        }));

        let retry_policy = RetryPolicy {
            max_attempts: config.max_email_retry_attempts,
            delay: config.retry_delay,
        };

        let notifier = Arc::new(Notifier::new(
            Arc::clone(&access),
            Arc::clone(&limiter),
            Arc::clone(&mailer),
            Arc::clone(&retries),
            retry_policy,
            NotifierConfig {
                use_test_email: config.use_test_email,
                test_recipient: config.test_email_recipient.clone(),
                logger_emails: config.logger_emails.clone(),
            },
        ));

        let classifier = Arc::new(ThresholdClassifier::new(
            Arc::clone(&access),
            Arc::clone(&states),
            Arc::clone(&queues),
            DwellConfig {
                yellow: config.yellow_sustenance,
                orange: config.orange_sustenance,
            },
        ));

        let drainer = Arc::new(QueueDrainer::new(
            Arc::clone(&queues),
            notifier,
            Arc::new(ChannelLogs::new()),
        ));

        let retry_worker = Arc::new(RetryWorker::new(
            retries,
            mailer,
            retry_policy,
            config.retry_poll_interval,
        ));

        let (shutdown, _) = broadcast::channel(8);

        Self {
            config,
            access,
            states,
            queues,
            limiter,
            classifier,
            drainer,
            retry_worker,
            shutdown,
        }
    }

    /// Runs the service until SIGINT.
    pub async fn run(self) -> anyhow::Result<()> {
        info!("starting threshold alert service");
        let mut workers = self.spawn_workers();

        let companies = match self.access.company_ids().await {
            Ok(ids) if ids.is_empty() => {
                warn!("no companies configured, transport has nothing to subscribe to");
                ids
            }
            Ok(ids) => {
                info!(channels = ids.len(), "subscribing to company channels");
                ids
            }
            Err(e) => {
                error!(error = %e, "could not list companies, transport idle");
                Vec::new()
            }
        };

        let transport = Transport::new(
            self.config.transport_addr(),
            companies,
            Arc::clone(&self.classifier),
        );
        workers.push(tokio::spawn({
            let shutdown = self.shutdown.subscribe();
            async move { transport.serve(shutdown).await }
        }));

        info!("service running, press Ctrl+C to exit");
        tokio::signal::ctrl_c().await?;

        info!("shutting down");
        let _ = self.shutdown.send(Signal::Shutdown);
        for worker in workers {
            if tokio::time::timeout(SHUTDOWN_GRACE, worker).await.is_err() {
                warn!("worker did not stop within the shutdown grace period");
            }
        }

        Ok(())
    }

    /// Starts the background workers: both drainers, the retry worker, the
    /// three sweepers, and the status monitor.
    fn spawn_workers(&self) -> Vec<JoinHandle<()>> {
        let mut workers = Vec::new();

        for (channel, interval) in [
            (Channel::Critical, self.config.critical_check_interval),
            (Channel::Warning, self.config.warning_check_interval),
        ] {
            let drainer = Arc::clone(&self.drainer);
            let shutdown = self.shutdown.subscribe();
            workers.push(tokio::spawn(async move {
                drainer.serve(channel, interval, shutdown).await;
            }));
        }

        let retry_worker = Arc::clone(&self.retry_worker);
        let shutdown = self.shutdown.subscribe();
        workers.push(tokio::spawn(async move {
            retry_worker.serve(shutdown).await;
        }));

        let states = Arc::clone(&self.states);
        let interval = self.config.state_cleanup_interval;
        let shutdown = self.shutdown.subscribe();
        workers.push(tokio::spawn(async move {
            states.serve(interval, shutdown).await;
        }));

        let limiter = Arc::clone(&self.limiter);
        let interval = self.config.rate_limiter_cleanup_interval;
        let shutdown = self.shutdown.subscribe();
        workers.push(tokio::spawn(async move {
            limiter.serve(interval, shutdown).await;
        }));

        let access = Arc::clone(&self.access);
        let interval = self.config.rate_limiter_cleanup_interval;
        let shutdown = self.shutdown.subscribe();
        workers.push(tokio::spawn(async move {
            access.serve(interval, shutdown).await;
        }));

        let queues = Arc::clone(&self.queues);
        let states = Arc::clone(&self.states);
        let limiter = Arc::clone(&self.limiter);
        let interval = self.config.status_interval;
        let shutdown = self.shutdown.subscribe();
        workers.push(tokio::spawn(async move {
            serve_status(queues, states, limiter, interval, shutdown).await;
        }));

        workers
    }
}

/// Periodic service health line: queue depths, peaks, tracked state.
async fn serve_status(
    queues: Arc<BreachQueues>,
    states: Arc<DeviceStateManager>,
    limiter: Arc<RateLimiter>,
    interval: Duration,
    mut shutdown: broadcast::Receiver<Signal>,
) {
    let mut timer = tokio::time::interval(interval);
    timer.tick().await;

    loop {
        tokio::select! {
            _ = timer.tick() => {
                info!(
                    red_queue = queues.critical.len(),
                    warning_queue = queues.warning.len(),
                    red_high_water = queues.critical.high_water_mark(),
                    warning_high_water = queues.warning.high_water_mark(),
                    tracked_devices = states.tracked_devices(),
                    rate_limited_keys = limiter.tracked(),
                    "service status"
                );
            }
            _ = shutdown.recv() => break,
        }
    }
}
