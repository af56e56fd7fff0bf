//! Sensor record types
//!
//! A [`SensorReading`] is what the upstream decoder hands to the hub: a set of
//! rig channel values (e.g. `ROP`, `WOB`, `SLIPS`) and optionally the raw frame
//! they were decoded from. The hub stamps each reading into an immutable
//! [`SensorRecord`] which is shared by reference between the latest-record
//! cache and every subscriber queue.
//!
//! Cloning an `Arc<SensorRecord>` never copies the field map, and the raw frame
//! is a `Bytes` handle, so one record costs one allocation however many
//! dashboards are connected.

pub mod envelope;

use std::collections::BTreeMap;
use std::time::Instant;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Value of a single sensor channel
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Numeric measurement (depth, pressure, rate, ...)
    Number(f64),
    /// Short status string (e.g. slips "IN"/"OUT")
    Status(String),
}

impl FieldValue {
    /// Numeric value, if this is a number
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            FieldValue::Status(_) => None,
        }
    }

    /// Status text, if this is a status
    pub fn as_status(&self) -> Option<&str> {
        match self {
            FieldValue::Status(s) => Some(s.as_str()),
            FieldValue::Number(_) => None,
        }
    }
}

impl From<f64> for FieldValue {
    fn from(n: f64) -> Self {
        FieldValue::Number(n)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Status(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Status(s)
    }
}

/// Decoded upstream frame, before the hub stamps it
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SensorReading {
    /// Channel code to value
    pub fields: BTreeMap<String, FieldValue>,
    /// Undecoded upstream frame, if the decoder kept it
    pub raw: Option<Bytes>,
}

impl SensorReading {
    /// Create an empty reading
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a channel value
    pub fn field(mut self, code: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(code.into(), value.into());
        self
    }

    /// Set a numeric channel
    pub fn number(self, code: impl Into<String>, value: f64) -> Self {
        self.field(code, FieldValue::Number(value))
    }

    /// Set a status channel
    pub fn status(self, code: impl Into<String>, value: impl Into<String>) -> Self {
        self.field(code, FieldValue::Status(value.into()))
    }

    /// Attach the raw upstream frame
    pub fn raw(mut self, raw: impl Into<Bytes>) -> Self {
        self.raw = Some(raw.into());
        self
    }

    /// Check if the reading carries no channels
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Immutable, hub-stamped telemetry snapshot
#[derive(Debug)]
pub struct SensorRecord {
    seq: u64,
    received_at: Instant,
    timestamp: DateTime<Utc>,
    fields: BTreeMap<String, FieldValue>,
    raw: Option<Bytes>,
}

impl SensorRecord {
    /// Stamp a reading. Only the hub assigns sequence numbers and receive times.
    pub(crate) fn stamp(seq: u64, reading: SensorReading) -> Self {
        Self {
            seq,
            received_at: Instant::now(),
            timestamp: Utc::now(),
            fields: reading.fields,
            raw: reading.raw,
        }
    }

    /// Hub-assigned sequence number, strictly increasing per hub
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Monotonic receive time
    pub fn received_at(&self) -> Instant {
        self.received_at
    }

    /// Wall-clock receive time
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// All channel values
    pub fn fields(&self) -> &BTreeMap<String, FieldValue> {
        &self.fields
    }

    /// Look up one channel
    pub fn get(&self, code: &str) -> Option<&FieldValue> {
        self.fields.get(code)
    }

    /// Look up a numeric channel
    pub fn number(&self, code: &str) -> Option<f64> {
        self.get(code).and_then(FieldValue::as_number)
    }

    /// Raw upstream frame
    pub fn raw(&self) -> Option<&Bytes> {
        self.raw.as_ref()
    }
}
