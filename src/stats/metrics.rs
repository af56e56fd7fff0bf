//! Statistics snapshots for the hub and its sessions

use std::time::Duration;

use crate::session::SessionPhase;

/// Per-session counters
#[derive(Debug, Clone)]
pub struct SessionStats {
    /// Session ID
    pub session_id: u64,
    /// Lifecycle phase at snapshot time
    pub phase: SessionPhase,
    /// Records waiting in the queue
    pub pending: usize,
    /// Records handed to the adapter
    pub delivered: u64,
    /// Records evicted by drop-oldest
    pub dropped: u64,
    /// Time since the transport connected
    pub connected_for: Duration,
    /// Time since the hub accepted the session
    pub registered_for: Option<Duration>,
}

impl SessionStats {
    /// Fraction of offered records that were evicted, 0.0 to 1.0
    pub fn drop_ratio(&self) -> f64 {
        let offered = self.delivered + self.dropped + self.pending as u64;
        if offered > 0 {
            self.dropped as f64 / offered as f64
        } else {
            0.0
        }
    }
}

/// Hub-wide counters
#[derive(Debug, Clone, Default)]
pub struct HubStats {
    /// Currently registered sessions
    pub subscribers: usize,
    /// Sessions ever accepted
    pub total_registrations: u64,
    /// Sessions refused
    pub rejected_registrations: u64,
    /// Records broadcast since start
    pub records_broadcast: u64,
    /// Sequence number of the cached latest record
    pub latest_seq: Option<u64>,
    /// Records queued across all live sessions
    pub pending_records: usize,
    /// Records evicted across all live sessions
    pub dropped_records: u64,
}
