//! Shared plumbing for the sentinel alerting service: configuration,
//! logging setup, the breach audit files, and the severity vocabulary
//! every other crate speaks.

pub mod breachlog;
pub mod config;
pub mod logging;
pub mod severity;

pub use severity::{Channel, Severity};
pub use tracing;

/// Broadcast value used to stop background workers.
#[derive(Debug, Clone, Copy)]
pub enum Signal {
    Shutdown,
}
