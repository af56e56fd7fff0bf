//! Attach outcomes
//!
//! Registration never fails with an error; it returns an [`AttachResult`]
//! that the transport layer must honor.

/// Why the hub refused a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The subscriber set is at `max_subscribers`
    CapacityExceeded,
    /// The session was closed before it could be registered
    SessionClosed,
    /// The session is already registered (or was registered once before)
    AlreadyRegistered,
}

impl RejectReason {
    /// Stable machine-readable code, used on the wire
    pub fn code(&self) -> &'static str {
        match self {
            RejectReason::CapacityExceeded => "capacity_exceeded",
            RejectReason::SessionClosed => "session_closed",
            RejectReason::AlreadyRegistered => "already_registered",
        }
    }
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::CapacityExceeded => write!(f, "subscriber capacity exceeded"),
            RejectReason::SessionClosed => write!(f, "session already closed"),
            RejectReason::AlreadyRegistered => write!(f, "session already registered"),
        }
    }
}

impl std::error::Error for RejectReason {}

/// Outcome of [`BroadcastHub::register`](super::BroadcastHub::register)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "a rejected session must not be attached to its transport"]
pub enum AttachResult {
    /// Session is live and will receive records
    Accepted,
    /// Session was not added
    Rejected(RejectReason),
}

impl AttachResult {
    /// Check if the session was accepted
    pub fn is_accepted(&self) -> bool {
        matches!(self, AttachResult::Accepted)
    }

    /// Convert into a `Result`, for callers that prefer `?`
    pub fn into_result(self) -> Result<(), RejectReason> {
        match self {
            AttachResult::Accepted => Ok(()),
            AttachResult::Rejected(reason) => Err(reason),
        }
    }
}
