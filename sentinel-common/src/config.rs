//! Runtime configuration resolved from environment variables.
//!
//! Every tunable the service recognizes is read once at startup; a missing
//! required key or an unparseable number is fatal (the process exits with a
//! non-zero code before any worker starts).

use std::{env, str::FromStr, time::Duration};

use thiserror::Error;

/// Connection parameters for the relational store.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub user: String,
    pub password: String,
}

/// Per-severity notification suppression windows.
#[derive(Debug, Clone, Copy)]
pub struct EmailTimeouts {
    pub red: Duration,
    pub orange: Duration,
    pub yellow: Duration,
}

impl Default for EmailTimeouts {
    fn default() -> Self {
        Self {
            red: Duration::from_secs(300),
            orange: Duration::from_secs(1800),
            yellow: Duration::from_secs(3600),
        }
    }
}

/// Full service configuration.
///
/// Fields without a recognized environment key carry fixed defaults but stay
/// public so tests and embedding code can construct tailored instances.
#[derive(Debug, Clone)]
pub struct Config {
    /// Event transport endpoint (`SERVER_URL` + `SERVER_PORT`).
    pub server_url: String,
    pub server_port: u16,

    pub database: DatabaseConfig,

    /// SMTP relay; defaults to Gmail submission.
    pub smtp_server: String,
    pub smtp_port: u16,
    pub sender_email: String,
    pub email_password: String,

    /// Audit-copy recipients appended to every outgoing alert.
    pub logger_emails: Vec<String>,

    pub email_timeouts: EmailTimeouts,

    /// Minimum continuous time above a warning threshold before a breach fires.
    pub yellow_sustenance: Duration,
    pub orange_sustenance: Duration,

    /// Drain cadence for the two breach queues.
    pub warning_check_interval: Duration,
    pub critical_check_interval: Duration,

    pub queue_size: usize,

    pub max_email_retry_attempts: u32,
    pub retry_delay: Duration,
    pub retry_poll_interval: Duration,

    pub threshold_cache_ttl: Duration,
    pub email_cache_ttl: Duration,

    pub state_max_idle: Duration,
    pub state_cleanup_interval: Duration,
    pub rate_limiter_cleanup_interval: Duration,
    pub status_interval: Duration,

    /// When set, every alert goes to `test_email_recipient` instead of the
    /// configured device recipients, and the logger copies are suppressed.
    pub use_test_email: bool,
    pub test_email_recipient: String,
}

impl Config {
    /// Constructs the configuration by reading and validating environment
    /// variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            server_url: required("SERVER_URL")?,
            server_port: parse_or("SERVER_PORT", None)?,
            database: DatabaseConfig {
                host: required("DATABASE_HOST")?,
                port: parse_or("DATABASE_PORT", Some(5432))?,
                name: required("DATABASE_NAME")?,
                user: required("DATABASE_USER")?,
                password: required("DATABASE_PASSWORD")?,
            },
            smtp_server: optional("SMTP_SERVER", "smtp.gmail.com"),
            smtp_port: parse_or("SMTP_PORT", Some(587))?,
            sender_email: required("SENDER_EMAIL")?,
            email_password: required("EMAIL_PASSWORD")?,
            logger_emails: split_emails(&optional("LOGGER_EMAILS", "connect@klvin.ai")),
            email_timeouts: EmailTimeouts {
                red: secs_or("RED_EMAIL_TIMEOUT_IN_SECONDS", 300)?,
                orange: secs_or("ORANGE_EMAIL_TIMEOUT_IN_SECONDS", 1800)?,
                yellow: secs_or("YELLOW_EMAIL_TIMEOUT_IN_SECONDS", 3600)?,
            },
            yellow_sustenance: secs_or("YELLOW_SUSTENANCE_PERIOD", 10)?,
            orange_sustenance: secs_or("ORANGE_SUSTENANCE_PERIOD", 5)?,
            warning_check_interval: secs_or("WARNING_BREACH_CHECK_INTERVAL", 60)?,
            critical_check_interval: secs_or("CRITICAL_BREACH_CHECK_INTERVAL", 30)?,
            queue_size: parse_or("QUEUE_SIZE", Some(100))?,
            max_email_retry_attempts: 3,
            retry_delay: Duration::from_secs(30),
            retry_poll_interval: Duration::from_secs(5),
            threshold_cache_ttl: Duration::from_secs(3600),
            email_cache_ttl: Duration::from_secs(86400),
            state_max_idle: Duration::from_secs(3600),
            state_cleanup_interval: Duration::from_secs(1800),
            rate_limiter_cleanup_interval: Duration::from_secs(3600),
            status_interval: Duration::from_secs(60),
            use_test_email: flag("USE_TEST_EMAIL"),
            test_email_recipient: optional("TEST_EMAIL_RECIPIENT", "test@example.com"),
        })
    }

    /// `host:port` of the event transport.
    #[must_use]
    pub fn transport_addr(&self) -> String {
        format!("{}:{}", self.server_url, self.server_port)
    }
}

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is required")]
    MissingVar(&'static str),

    #[error("{var} must be a valid number (got {value})")]
    InvalidNumber { var: &'static str, value: String },
}

fn required(var: &'static str) -> Result<String, ConfigError> {
    match env::var(var) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(ConfigError::MissingVar(var)),
    }
}

fn optional(var: &str, default: &str) -> String {
    env::var(var)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Parses `var` as `T`; `default = None` makes the key required.
fn parse_or<T: FromStr>(var: &'static str, default: Option<T>) -> Result<T, ConfigError> {
    match env::var(var) {
        Ok(value) if !value.is_empty() => value
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidNumber { var, value }),
        _ => default.ok_or(ConfigError::MissingVar(var)),
    }
}

fn secs_or(var: &'static str, default: u64) -> Result<Duration, ConfigError> {
    parse_or(var, Some(default)).map(Duration::from_secs)
}

fn flag(var: &str) -> bool {
    env::var(var).is_ok_and(|v| v.eq_ignore_ascii_case("true"))
}

fn split_emails(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
