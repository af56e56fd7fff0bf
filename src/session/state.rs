//! Session state machine
//!
//! Tracks a subscriber session from connection to teardown:
//!
//! ```text
//! Connecting ──register──► Active ──close/send error──► Closing ──drain exit──► Closed
//!      │                                                   ▲
//!      └────────────────── close before register ──────────┘
//! ```

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Transport connected, not yet registered with the hub
    Connecting,
    /// Registered and receiving records
    Active,
    /// Terminated; waiting for the drain loop to exit
    Closing,
    /// Drain loop exited and session unregistered
    Closed,
}

impl SessionPhase {
    /// Check whether `next` is a legal successor of this phase
    pub fn can_transition_to(self, next: SessionPhase) -> bool {
        use SessionPhase::*;

        matches!(
            (self, next),
            (Connecting, Active) | (Connecting, Closing) | (Active, Closing) | (Closing, Closed)
        )
    }

    /// Check if the session is still accepting records
    pub fn is_live(self) -> bool {
        matches!(self, SessionPhase::Connecting | SessionPhase::Active)
    }

    /// Short lowercase label for logs
    pub fn as_str(self) -> &'static str {
        match self {
            SessionPhase::Connecting => "connecting",
            SessionPhase::Active => "active",
            SessionPhase::Closing => "closing",
            SessionPhase::Closed => "closed",
        }
    }
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::SessionPhase::*;

    #[test]
    fn test_forward_transitions() {
        assert!(Connecting.can_transition_to(Active));
        assert!(Active.can_transition_to(Closing));
        assert!(Closing.can_transition_to(Closed));
        assert!(Connecting.can_transition_to(Closing));
    }

    #[test]
    fn test_no_way_back() {
        assert!(!Active.can_transition_to(Connecting));
        assert!(!Closing.can_transition_to(Active));
        assert!(!Connecting.can_transition_to(Closed));
        for next in [Connecting, Active, Closing, Closed] {
            assert!(!Closed.can_transition_to(next));
        }
    }

    #[test]
    fn test_liveness() {
        assert!(Connecting.is_live());
        assert!(Active.is_live());
        assert!(!Closing.is_live());
        assert!(!Closed.is_live());
    }
}
