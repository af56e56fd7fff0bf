//! JSON event envelope
//!
//! Dashboards listen for a single `sensorData` event carrying one record per
//! message:
//!
//! ```text
//! {"event":"sensorData","data":{"seq":3,"timestamp":"...","fields":{"ROP":12.5},"raw":"..."}}
//! ```
//!
//! A refused connection gets one `rejected` event before the socket closes.

use std::borrow::Cow;
use std::collections::BTreeMap;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{FieldValue, SensorRecord};
use crate::error::Result;
use crate::hub::RejectReason;

/// Event name used for telemetry messages
pub const SENSOR_DATA_EVENT: &str = "sensorData";

#[derive(Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
enum Envelope<'a> {
    SensorData(RecordBody<'a>),
    Rejected { reason: &'static str },
}

#[derive(Serialize)]
struct RecordBody<'a> {
    seq: u64,
    timestamp: DateTime<Utc>,
    fields: &'a BTreeMap<String, FieldValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    raw: Option<Cow<'a, str>>,
}

/// Serialize a record as a `sensorData` event
pub fn encode_record(record: &SensorRecord) -> Result<Bytes> {
    let envelope = Envelope::SensorData(RecordBody {
        seq: record.seq(),
        timestamp: record.timestamp(),
        fields: record.fields(),
        raw: record.raw().map(|raw| String::from_utf8_lossy(raw)),
    });

    Ok(Bytes::from(serde_json::to_vec(&envelope)?))
}

/// Serialize a rejection notice
pub fn encode_rejection(reason: RejectReason) -> Result<Bytes> {
    let envelope = Envelope::Rejected {
        reason: reason.code(),
    };

    Ok(Bytes::from(serde_json::to_vec(&envelope)?))
}
