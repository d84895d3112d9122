//! Recipient fan-in and email dispatch for drained breach batches.

use std::{collections::BTreeMap, sync::Arc, time::Instant};

use sentinel_common::Channel;
use sentinel_monitor::Breach;
use sentinel_store::DataAccess;
use tracing::{error, info, warn};

use crate::{
    formatter,
    mailer::{Mailer, OutboundEmail},
    rate_limiter::RateLimiter,
    retry::{RetryPolicy, RetryQueue},
};

/// Envelope policy knobs.
#[derive(Debug, Clone)]
pub struct NotifierConfig {
    /// Test mode: skip recipient resolution entirely and send everything to
    /// `test_recipient`, without the logger copies.
    pub use_test_email: bool,
    pub test_recipient: String,
    /// Audit copies appended to every real envelope.
    pub logger_emails: Vec<String>,
}

/// Turns a breach batch into at most one composite email per recipient.
pub struct Notifier {
    access: Arc<DataAccess>,
    limiter: Arc<RateLimiter>,
    mailer: Arc<dyn Mailer>,
    retries: Arc<RetryQueue>,
    policy: RetryPolicy,
    config: NotifierConfig,
}

impl Notifier {
    #[must_use]
    pub fn new(
        access: Arc<DataAccess>,
        limiter: Arc<RateLimiter>,
        mailer: Arc<dyn Mailer>,
        retries: Arc<RetryQueue>,
        policy: RetryPolicy,
        config: NotifierConfig,
    ) -> Self {
        Self {
            access,
            limiter,
            mailer,
            retries,
            policy,
            config,
        }
    }

    /// Rate-limits the batch, resolves recipients, and sends one composite
    /// email per recipient. Send failures are handed to the retry queue;
    /// nothing here can fail the drainer.
    pub async fn process_breaches(&self, batch: &[Breach], channel: Channel) {
        info!(count = batch.len(), %channel, "processing breaches for email notifications");

        let survivors: Vec<&Breach> = batch
            .iter()
            .filter(|breach| {
                self.limiter
                    .should_send(&breach.device_id, &breach.sensor_id, breach.severity)
            })
            .collect();

        if survivors.is_empty() {
            info!(%channel, "no breaches passed rate limiting");
            return;
        }

        if self.config.use_test_email {
            // Test mode short-circuits before any real address is resolved.
            let breaches: Vec<Breach> = survivors.into_iter().cloned().collect();
            self.dispatch(vec![self.config.test_recipient.clone()], &breaches)
                .await;
            return;
        }

        let mut per_recipient: BTreeMap<String, Vec<Breach>> = BTreeMap::new();
        for breach in survivors {
            match self
                .access
                .emails(&breach.device_id, breach.severity)
                .await
            {
                Ok(recipients) => {
                    for recipient in recipients {
                        per_recipient
                            .entry(recipient)
                            .or_default()
                            .push(breach.clone());
                    }
                }
                Err(e) => {
                    error!(
                        device = %breach.device_id,
                        sensor = %breach.sensor_id,
                        error = %e,
                        "failed to resolve recipients, breach dropped"
                    );
                }
            }
        }

        if per_recipient.is_empty() {
            warn!("no emails to send after processing breaches");
            return;
        }

        info!(recipients = per_recipient.len(), "sending breach emails");
        for (recipient, breaches) in per_recipient {
            let mut envelope = Vec::with_capacity(1 + self.config.logger_emails.len());
            envelope.push(recipient);
            envelope.extend(self.config.logger_emails.iter().cloned());
            self.dispatch(envelope, &breaches).await;
        }
    }

    async fn dispatch(&self, recipients: Vec<String>, breaches: &[Breach]) {
        let email = OutboundEmail {
            recipients,
            subject: formatter::subject(breaches),
            html_body: formatter::html_body(breaches),
        };

        if let Err(e) = self.mailer.send(&email).await {
            error!(
                error = %e,
                recipients = ?email.recipients,
                "failed to send email, scheduling retry"
            );
            info!(attempt = 1, max = self.policy.max_attempts, "email queued for retry");
            self.retries
                .schedule(email, 1, Instant::now() + self.policy.delay);
        }
    }
}
