//! Error types for the SMTP client.

use std::io;

use thiserror::Error;

/// Errors that can occur while talking to the relay.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The server's bytes did not parse as an SMTP response.
    #[error("failed to parse SMTP response: {0}")]
    Parse(String),

    /// The server answered with an error or unexpected status code.
    #[error("SMTP error: {code} - {message}")]
    Smtp { code: u16, message: String },

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("connection closed unexpectedly")]
    ConnectionClosed,
}

impl ClientError {
    /// 4xx responses are worth retrying; everything else is not obviously.
    #[must_use]
    pub const fn is_temporary(&self) -> bool {
        matches!(self, Self::Smtp { code, .. } if *code >= 400 && *code < 500)
    }
}

/// Specialized `Result` for SMTP client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
