//! The notification back half: queue drainers, the per-sensor rate limiter,
//! recipient fan-in and HTML rendering, SMTP submission, and the bounded
//! retry scheduler.

pub mod drain;
pub mod formatter;
pub mod mailer;
pub mod notifier;
pub mod rate_limiter;
pub mod retry;
pub mod smtp;

pub use drain::QueueDrainer;
pub use mailer::{Mailer, OutboundEmail, SendError, SmtpConfig, SmtpMailer};
pub use notifier::{Notifier, NotifierConfig};
pub use rate_limiter::{RateLimiter, SeverityWindows};
pub use retry::{RetryPolicy, RetryQueue, RetryWorker};
