//! Client channel adapters
//!
//! An adapter owns the transport to one physical client. The session's drain
//! loop hands it records one at a time; how they are framed and written is the
//! adapter's business.

pub mod json_lines;

use std::future::Future;
use std::sync::Arc;

use crate::record::SensorRecord;

pub use json_lines::JsonLinesAdapter;

/// Why a send to a client failed
///
/// Every variant is fatal for the session: it is closed and unregistered,
/// never retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendFailure {
    /// The peer went away
    Disconnected,
    /// The send did not complete within the configured timeout
    Timeout,
    /// Other transport error
    Io(String),
    /// The record could not be serialized
    Encode(String),
}

impl std::fmt::Display for SendFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SendFailure::Disconnected => write!(f, "Client disconnected"),
            SendFailure::Timeout => write!(f, "Send timed out"),
            SendFailure::Io(msg) => write!(f, "Transport error: {}", msg),
            SendFailure::Encode(msg) => write!(f, "Encoding error: {}", msg),
        }
    }
}

impl std::error::Error for SendFailure {}

impl From<std::io::Error> for SendFailure {
    fn from(e: std::io::Error) -> Self {
        use std::io::ErrorKind;

        match e.kind() {
            ErrorKind::BrokenPipe
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::NotConnected
            | ErrorKind::UnexpectedEof => SendFailure::Disconnected,
            ErrorKind::TimedOut => SendFailure::Timeout,
            _ => SendFailure::Io(e.to_string()),
        }
    }
}

/// Transport for one subscriber
pub trait ChannelAdapter: Send {
    /// Deliver one record to the client
    fn send(
        &mut self,
        record: Arc<SensorRecord>,
    ) -> impl Future<Output = Result<(), SendFailure>> + Send;

    /// Release the transport once the drain loop is done with it
    fn close(&mut self) -> impl Future<Output = ()> + Send {
        async {}
    }
}
