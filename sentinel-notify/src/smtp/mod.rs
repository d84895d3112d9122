//! Minimal asynchronous SMTP submission client.
//!
//! Supports exactly what the notifier needs to talk to an authenticated
//! relay: plain TCP with STARTTLS upgrade, `AUTH LOGIN`, and the
//! MAIL/RCPT/DATA transaction.

mod client;
mod error;
mod response;

pub use client::SmtpClient;
pub use error::{ClientError, Result};
pub use response::Response;
