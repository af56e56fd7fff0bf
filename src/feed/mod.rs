//! Upstream feed ingestion
//!
//! The rig data feed is decoded outside this crate. A decoder plugs in as a
//! [`RecordSource`], created on demand by a [`SourceConnector`]; the
//! [`FeedPump`] pulls readings from it into the hub and reconnects with
//! backoff when the upstream drops.

pub mod config;
pub mod pump;

use std::future::Future;

use crate::error::Result;
use crate::record::SensorReading;

pub use config::FeedConfig;
pub use pump::{FeedEvent, FeedPump};

/// A connected, decoding upstream feed
pub trait RecordSource: Send {
    /// Next decoded reading
    ///
    /// `Ok(None)` means the upstream closed cleanly.
    fn next_reading(&mut self) -> impl Future<Output = Result<Option<SensorReading>>> + Send;
}

/// Opens a fresh [`RecordSource`] each time the feed (re)connects
pub trait SourceConnector: Send + Sync {
    /// Source produced by this connector
    type Source: RecordSource;

    /// Connect to the upstream feed
    fn connect(&self) -> impl Future<Output = Result<Self::Source>> + Send;
}
