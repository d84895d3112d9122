//! Event-bus transport client.
//!
//! A long-lived TCP connection carrying newline-delimited JSON. On connect
//! the client subscribes to one channel per company id; the bus then
//! streams `NewReadingsEvent` frames which are handed to the classifier.
//! The client owns its reconnection policy: capped exponential backoff.

use std::{sync::Arc, time::Duration};

use ahash::AHashSet;
use sentinel_common::Signal;
use sentinel_monitor::{ReadingsEvent, ThresholdClassifier};
use serde::{Deserialize, Serialize};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::TcpStream,
    sync::broadcast,
};
use tracing::{debug, error, info, warn};

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

const READINGS_EVENT: &str = "NewReadingsEvent";

#[derive(Debug, Serialize)]
struct Subscribe<'a> {
    subscribe: &'a [String],
}

#[derive(Debug, Deserialize)]
struct Frame {
    channel: String,
    event: String,
    #[serde(default)]
    data: serde_json::Value,
}

enum SessionEnd {
    Disconnected,
    Shutdown,
}

/// Subscribes to the tenant channels and feeds decoded events into the
/// classifier.
pub struct Transport {
    addr: String,
    companies: Vec<String>,
    channels: AHashSet<String>,
    classifier: Arc<ThresholdClassifier>,
}

impl Transport {
    #[must_use]
    pub fn new(addr: String, companies: Vec<String>, classifier: Arc<ThresholdClassifier>) -> Self {
        let channels = companies.iter().cloned().collect();
        Self {
            addr,
            companies,
            channels,
            classifier,
        }
    }

    /// Connect-and-read loop, run until shutdown. Reconnects with capped
    /// exponential backoff on any connection failure.
    pub async fn serve(&self, mut shutdown: broadcast::Receiver<Signal>) {
        let mut backoff = INITIAL_BACKOFF;

        loop {
            tokio::select! {
                connected = TcpStream::connect(&self.addr) => {
                    match connected {
                        Ok(stream) => {
                            info!(addr = %self.addr, channels = self.companies.len(), "connected to event bus");
                            backoff = INITIAL_BACKOFF;
                            match self.session(stream, &mut shutdown).await {
                                Ok(SessionEnd::Shutdown) => break,
                                Ok(SessionEnd::Disconnected) => {
                                    warn!(addr = %self.addr, "event bus disconnected");
                                }
                                Err(e) => {
                                    warn!(addr = %self.addr, error = %e, "event bus session failed");
                                }
                            }
                        }
                        Err(e) => {
                            warn!(addr = %self.addr, error = %e, "event bus connection failed");
                        }
                    }
                }
                _ = shutdown.recv() => break,
            }

            tokio::select! {
                () = tokio::time::sleep(backoff) => {}
                _ = shutdown.recv() => break,
            }
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }

        debug!("transport stopping");
    }

    async fn session(
        &self,
        stream: TcpStream,
        shutdown: &mut broadcast::Receiver<Signal>,
    ) -> std::io::Result<SessionEnd> {
        let (reader, mut writer) = stream.into_split();

        let mut subscription = serde_json::to_vec(&Subscribe {
            subscribe: &self.companies,
        })
        .map_err(std::io::Error::other)?;
        subscription.push(b'\n');
        writer.write_all(&subscription).await?;

        let mut lines = BufReader::new(reader).lines();
        loop {
            tokio::select! {
                line = lines.next_line() => {
                    match line? {
                        Some(line) => self.handle_line(&line).await,
                        None => return Ok(SessionEnd::Disconnected),
                    }
                }
                _ = shutdown.recv() => return Ok(SessionEnd::Shutdown),
            }
        }
    }

    async fn handle_line(&self, line: &str) {
        if line.trim().is_empty() {
            return;
        }

        let frame: Frame = match serde_json::from_str(line) {
            Ok(frame) => frame,
            Err(e) => {
                debug!(error = %e, "malformed frame dropped");
                return;
            }
        };

        if !self.channels.contains(&frame.channel) {
            debug!(channel = %frame.channel, "frame for unknown channel ignored");
            return;
        }
        if frame.event != READINGS_EVENT {
            debug!(event = %frame.event, "unhandled event type ignored");
            return;
        }

        let event: ReadingsEvent = match serde_json::from_value(frame.data) {
            Ok(event) => event,
            Err(e) => {
                error!(channel = %frame.channel, error = %e, "malformed readings event dropped");
                return;
            }
        };

        debug!(device = %event.device_id, channel = %frame.channel, "received new readings");
        self.classifier.classify(&event).await;
    }
}
