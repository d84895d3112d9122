//! Payload types for `NewReadingsEvent` frames.

use std::fmt;

use serde::Deserialize;

/// One decoded transport event: a device's readings at a point in time.
#[derive(Debug, Clone, Deserialize)]
pub struct ReadingsEvent {
    pub device_id: String,
    pub time: EventTime,
    #[serde(default)]
    pub readings: OneOrMany<Reading>,
}

/// A single sensor sample. `value` stays raw JSON until classification so a
/// malformed value drops only its own reading.
#[derive(Debug, Clone, Deserialize)]
pub struct Reading {
    pub sensor_id: String,
    #[serde(default)]
    pub sensor_type: String,
    pub value: serde_json::Value,
}

impl Reading {
    /// Coerces the raw value to a float; numbers and numeric strings both
    /// count, anything else is malformed.
    #[must_use]
    pub fn value_as_f64(&self) -> Option<f64> {
        match &self.value {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

/// Publisher-supplied wall-clock instant; some publishers send epoch
/// integers, others preformatted strings. Carried through verbatim.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum EventTime {
    Text(String),
    Number(i64),
}

impl fmt::Display for EventTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Number(n) => write!(f, "{n}"),
        }
    }
}

/// The `readings` field arrives as either a single object or an array.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        match self {
            Self::One(item) => std::slice::from_ref(item),
            Self::Many(items) => items,
        }
    }
}

impl<T> Default for OneOrMany<T> {
    fn default() -> Self {
        Self::Many(Vec::new())
    }
}
