//! Error types
//!
//! Crate-level error for operations that cross an I/O boundary (the TCP
//! server, the feed pump, envelope encoding). Per-session delivery failures
//! use [`SendFailure`](crate::adapter::SendFailure) and never surface here.

use crate::hub::RejectReason;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug)]
pub enum Error {
    /// Socket or stream I/O failed
    Io(std::io::Error),
    /// A record could not be serialized into an envelope
    Encode(serde_json::Error),
    /// The hub refused to attach a session
    Rejected(RejectReason),
    /// The upstream record source failed
    Source(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Encode(e) => write!(f, "Envelope encoding failed: {}", e),
            Error::Rejected(reason) => write!(f, "Session rejected: {}", reason),
            Error::Source(msg) => write!(f, "Record source failed: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Encode(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Encode(e)
    }
}

impl From<RejectReason> for Error {
    fn from(reason: RejectReason) -> Self {
        Error::Rejected(reason)
    }
}
