//! Tracing subscriber setup for the service binary.

use chrono::Utc;
use tracing::metadata::LevelFilter;
use tracing_subscriber::{
    Layer, filter::FilterFn, fmt::time::FormatTime, layer::SubscriberExt,
    util::SubscriberInitExt,
};

struct Time;

impl FormatTime for Time {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        w.write_fmt(format_args!("{}", Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ")))
    }
}

/// Initialise the global subscriber.
///
/// `LOG_LEVEL` selects the filter (`warn` / `info` / `debug` / `trace`);
/// unset builds default to `INFO` in release and `TRACE` in debug builds.
/// Only events from the service's own crates are emitted.
///
/// # Panics
///
/// Panics if a global subscriber has already been installed.
pub fn init() {
    let level = if let Ok(level) = std::env::var("LOG_LEVEL") {
        match level.to_ascii_lowercase().as_str() {
            "warn" => LevelFilter::WARN,
            "info" => LevelFilter::INFO,
            "debug" => LevelFilter::DEBUG,
            "trace" => LevelFilter::TRACE,
            _ => LevelFilter::ERROR,
        }
    } else if cfg!(debug_assertions) {
        LevelFilter::TRACE
    } else {
        LevelFilter::INFO
    };

    tracing_subscriber::Registry::default()
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_ansi(true)
                .with_timer(Time)
                .with_filter(level)
                .with_filter(FilterFn::new(|metadata| {
                    metadata.target().starts_with("sentinel")
                })),
        )
        .init();
}
