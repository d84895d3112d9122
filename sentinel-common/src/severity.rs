//! Breach severity levels and the notification channels they map onto.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Severity of a threshold breach.
///
/// The derived ordering follows criticality: `Red > Orange > Yellow`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Yellow,
    Orange,
    Red,
}

impl Severity {
    pub const ALL: [Self; 3] = [Self::Yellow, Self::Orange, Self::Red];

    /// Lowercase name as it appears in logs and store rows.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Yellow => "yellow",
            Self::Orange => "orange",
            Self::Red => "red",
        }
    }

    /// Red breaches bypass dwell tracking and go to the critical channel.
    #[must_use]
    pub const fn is_critical(self) -> bool {
        matches!(self, Self::Red)
    }

    /// The channel breaches of this severity are queued on.
    #[must_use]
    pub const fn channel(self) -> Channel {
        match self {
            Self::Red => Channel::Critical,
            Self::Orange | Self::Yellow => Channel::Warning,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The two notification channels, each with its own queue and drain cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Critical,
    Warning,
}

impl Channel {
    /// Name used in batch log lines ("red" / "warning").
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Critical => "red",
            Self::Warning => "warning",
        }
    }

    /// The audit file this channel's batches are appended to.
    #[must_use]
    pub const fn log_file(self) -> &'static str {
        match self {
            Self::Critical => "red.log",
            Self::Warning => "non_red.log",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
