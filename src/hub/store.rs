//! Broadcast hub implementation
//!
//! The central fan-out point: owns the subscriber set and the latest-record
//! cache, and pushes every record into each live session's queue.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use super::config::HubConfig;
use super::error::{AttachResult, RejectReason};
use crate::record::{SensorReading, SensorRecord};
use crate::session::{PushOutcome, SessionPhase, SubscriberSession};
use crate::stats::{HubStats, SessionStats};

/// Membership and cache, guarded together
#[derive(Default)]
struct HubState {
    /// Live sessions, iterated in id order
    sessions: BTreeMap<u64, Arc<SubscriberSession>>,
    /// Most recent record, handed to late joiners
    latest: Option<Arc<SensorRecord>>,
    /// Last assigned sequence number
    last_seq: u64,
}

/// Fan-out hub for sensor records
///
/// Membership changes and the broadcast snapshot share one short critical
/// section. Queue pushes happen outside it and never wait on a consumer.
pub struct BroadcastHub {
    /// Subscriber set and latest record
    state: Mutex<HubState>,

    /// Serializes producers so every queue sees records in sequence order
    producer: Mutex<()>,

    /// Mirror of `state.sessions.len()` for lock-free reads
    subscriber_count: AtomicUsize,

    /// Next session ID to hand out
    next_session_id: AtomicU64,

    /// Sessions ever accepted
    total_registrations: AtomicU64,

    /// Sessions refused
    rejected_registrations: AtomicU64,

    /// Configuration
    config: HubConfig,
}

impl BroadcastHub {
    /// Create a hub with default configuration
    pub fn new() -> Self {
        Self::with_config(HubConfig::default())
    }

    /// Create a hub with custom configuration
    pub fn with_config(config: HubConfig) -> Self {
        Self {
            state: Mutex::new(HubState::default()),
            producer: Mutex::new(()),
            subscriber_count: AtomicUsize::new(0),
            next_session_id: AtomicU64::new(1),
            total_registrations: AtomicU64::new(0),
            rejected_registrations: AtomicU64::new(0),
            config,
        }
    }

    /// Get the hub configuration
    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    fn lock_state(&self) -> MutexGuard<'_, HubState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Create a session sized by this hub's queue capacity
    ///
    /// The session starts in `Connecting` and must be passed to
    /// [`register`](Self::register) before it receives anything.
    pub fn create_session(&self) -> Arc<SubscriberSession> {
        let id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        Arc::new(SubscriberSession::new(id, self.config.queue_capacity))
    }

    /// Add a session to the live set
    ///
    /// If a latest record exists it becomes the session's first queued item,
    /// atomically with the insertion, so the session neither misses nor
    /// duplicates the record being broadcast concurrently.
    pub fn register(&self, session: &Arc<SubscriberSession>) -> AttachResult {
        let session_id = session.id();
        let mut state = self.lock_state();

        let refusal = match session.phase() {
            _ if state.sessions.contains_key(&session_id) => Some(RejectReason::AlreadyRegistered),
            SessionPhase::Active => Some(RejectReason::AlreadyRegistered),
            SessionPhase::Closing | SessionPhase::Closed => Some(RejectReason::SessionClosed),
            SessionPhase::Connecting if self.config.is_full(state.sessions.len()) => {
                Some(RejectReason::CapacityExceeded)
            }
            SessionPhase::Connecting => None,
        };

        // A close racing this call fails activation
        let refusal = refusal.or_else(|| {
            if let Some(latest) = &state.latest {
                session.enqueue(Arc::clone(latest));
            }
            (!session.activate()).then_some(RejectReason::SessionClosed)
        });

        if let Some(reason) = refusal {
            drop(state);
            self.rejected_registrations.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                session_id = session_id,
                reason = %reason,
                subscribers = self.subscriber_count(),
                max_subscribers = self.config.max_subscribers,
                "Subscriber rejected"
            );
            return AttachResult::Rejected(reason);
        }

        state.sessions.insert(session_id, Arc::clone(session));
        let subscribers = state.sessions.len();
        self.subscriber_count.store(subscribers, Ordering::Relaxed);
        let catchup_seq = state.latest.as_ref().map(|r| r.seq());
        drop(state);

        self.total_registrations.fetch_add(1, Ordering::Relaxed);
        tracing::info!(
            session_id = session_id,
            subscribers = subscribers,
            catchup_seq = ?catchup_seq,
            "Subscriber registered"
        );

        AttachResult::Accepted
    }

    /// Remove a session from the live set
    ///
    /// Closes the session and discards its queue. Idempotent: returns `false`
    /// and changes nothing if the id is not registered.
    pub fn unregister(&self, session_id: u64) -> bool {
        let removed = {
            let mut state = self.lock_state();
            let removed = state.sessions.remove(&session_id);
            self.subscriber_count
                .store(state.sessions.len(), Ordering::Relaxed);
            removed
        };

        let Some(session) = removed else {
            return false;
        };

        session.close();
        tracing::info!(
            session_id = session_id,
            subscribers = self.subscriber_count(),
            delivered = session.delivered(),
            dropped = session.dropped(),
            "Subscriber unregistered"
        );
        true
    }

    /// Unregister and close every session
    ///
    /// Used on shutdown. The latest record is kept. Returns the number of
    /// sessions removed.
    pub fn close_all(&self) -> usize {
        let sessions = {
            let mut state = self.lock_state();
            let sessions = std::mem::take(&mut state.sessions);
            self.subscriber_count.store(0, Ordering::Relaxed);
            sessions
        };

        for session in sessions.values() {
            session.close();
        }

        if !sessions.is_empty() {
            tracing::info!(closed = sessions.len(), "All subscribers closed");
        }
        sessions.len()
    }

    /// Stamp a reading and fan it out to every live session
    ///
    /// Updates the latest-record cache even when nobody is subscribed. Never
    /// blocks on a consumer: full queues evict their oldest record.
    pub fn broadcast(&self, reading: SensorReading) -> Arc<SensorRecord> {
        let _producer = self.producer.lock().unwrap_or_else(|e| e.into_inner());

        let (record, targets) = {
            let mut state = self.lock_state();
            state.last_seq += 1;
            let record = Arc::new(SensorRecord::stamp(state.last_seq, reading));
            state.latest = Some(Arc::clone(&record));
            let targets: Vec<_> = state.sessions.values().cloned().collect();
            (record, targets)
        };

        let mut evictions = 0usize;
        for session in &targets {
            if session.enqueue(Arc::clone(&record)) == PushOutcome::Evicted {
                evictions += 1;
            }
        }

        tracing::trace!(
            seq = record.seq(),
            fields = record.fields().len(),
            subscribers = targets.len(),
            evictions = evictions,
            "Record broadcast"
        );

        record
    }

    /// Number of registered sessions
    pub fn subscriber_count(&self) -> usize {
        self.subscriber_count.load(Ordering::Relaxed)
    }

    /// Most recent record, if any
    pub fn latest(&self) -> Option<Arc<SensorRecord>> {
        self.lock_state().latest.clone()
    }

    /// Look up a registered session
    pub fn session(&self, session_id: u64) -> Option<Arc<SubscriberSession>> {
        self.lock_state().sessions.get(&session_id).cloned()
    }

    /// Stats for one registered session
    pub fn session_stats(&self, session_id: u64) -> Option<SessionStats> {
        self.session(session_id).map(|s| s.stats())
    }

    /// Hub-wide stats
    pub fn stats(&self) -> HubStats {
        let state = self.lock_state();
        HubStats {
            subscribers: state.sessions.len(),
            total_registrations: self.total_registrations.load(Ordering::Relaxed),
            rejected_registrations: self.rejected_registrations.load(Ordering::Relaxed),
            records_broadcast: state.last_seq,
            latest_seq: state.latest.as_ref().map(|r| r.seq()),
            pending_records: state.sessions.values().map(|s| s.pending()).sum(),
            dropped_records: state.sessions.values().map(|s| s.dropped()).sum(),
        }
    }

    /// Remove sessions that have not made progress within `stall_timeout`
    ///
    /// Covers clients that vanished without a clean disconnect and whose
    /// transport never reports a failure. Returns the number removed.
    pub fn sweep_stalled(&self) -> usize {
        let now = Instant::now();
        let timeout = self.config.stall_timeout;

        let stalled: Vec<u64> = self
            .lock_state()
            .sessions
            .values()
            .filter(|session| session.stalled_for(now).is_some_and(|idle| idle > timeout))
            .map(|session| session.id())
            .collect();

        for &session_id in &stalled {
            tracing::warn!(
                session_id = session_id,
                stall_timeout_ms = timeout.as_millis() as u64,
                "Subscriber stalled, removing"
            );
            self.unregister(session_id);
        }

        stalled.len()
    }

    /// Spawn background stall sweeper
    ///
    /// Returns a handle that can be used to abort the task.
    pub fn spawn_sweeper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let hub = Arc::clone(self);
        let interval = hub.config.sweep_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                hub.sweep_stalled();
            }
        })
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn rop(value: f64) -> SensorReading {
        SensorReading::new().number("ROP", value)
    }

    fn pending_rop(session: &SubscriberSession) -> Vec<f64> {
        session
            .pending_records()
            .iter()
            .filter_map(|r| r.number("ROP"))
            .collect()
    }

    #[test]
    fn test_broadcast_without_subscribers() {
        let hub = BroadcastHub::new();

        for value in [1.0, 2.0, 3.0] {
            hub.broadcast(rop(value));
            assert_eq!(hub.subscriber_count(), 0);
        }

        let latest = hub.latest().unwrap();
        assert_eq!(latest.seq(), 3);
        assert_eq!(latest.number("ROP"), Some(3.0));
    }

    #[test]
    fn test_register_unregister() {
        let hub = BroadcastHub::new();
        let session = hub.create_session();

        assert_eq!(hub.register(&session), AttachResult::Accepted);
        assert_eq!(hub.subscriber_count(), 1);
        assert!(session.is_active());
        assert_eq!(session.pending(), 0); // Nothing broadcast yet

        assert!(hub.unregister(session.id()));
        assert_eq!(hub.subscriber_count(), 0);
        assert_eq!(session.phase(), SessionPhase::Closing);
    }

    #[test]
    fn test_unregister_idempotent() {
        let hub = BroadcastHub::new();
        let a = hub.create_session();
        let b = hub.create_session();
        assert!(hub.register(&a).is_accepted());
        assert!(hub.register(&b).is_accepted());

        assert!(hub.unregister(a.id()));
        assert!(!hub.unregister(a.id()));
        assert!(!hub.unregister(9999));
        assert_eq!(hub.subscriber_count(), 1);
    }

    #[test]
    fn test_late_joiner_gets_only_latest() {
        let hub = BroadcastHub::new();
        for value in [10.0, 11.0, 12.0, 13.0] {
            hub.broadcast(rop(value));
        }

        let session = hub.create_session();
        assert!(hub.register(&session).is_accepted());

        assert_eq!(pending_rop(&session), vec![13.0]);
        assert!(Arc::ptr_eq(
            &session.pending_records()[0],
            &hub.latest().unwrap()
        ));
    }

    #[test]
    fn test_capacity_exceeded() {
        let hub = BroadcastHub::with_config(HubConfig::default().max_subscribers(1));
        let a = hub.create_session();
        let b = hub.create_session();

        assert!(hub.register(&a).is_accepted());
        assert_eq!(
            hub.register(&b),
            AttachResult::Rejected(RejectReason::CapacityExceeded)
        );
        assert_eq!(b.phase(), SessionPhase::Connecting);
        assert_eq!(hub.subscriber_count(), 1);
        assert_eq!(hub.stats().rejected_registrations, 1);
    }

    #[test]
    fn test_register_twice_rejected() {
        let hub = BroadcastHub::new();
        let session = hub.create_session();

        assert!(hub.register(&session).is_accepted());
        assert_eq!(
            hub.register(&session),
            AttachResult::Rejected(RejectReason::AlreadyRegistered)
        );
        assert_eq!(hub.subscriber_count(), 1);
    }

    #[test]
    fn test_closed_session_rejected() {
        let hub = BroadcastHub::new();
        let session = hub.create_session();
        session.close();

        assert_eq!(
            hub.register(&session),
            AttachResult::Rejected(RejectReason::SessionClosed)
        );
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[test]
    fn test_drop_oldest_per_session() {
        // K = 3, M = 2
        let hub = BroadcastHub::with_config(HubConfig::default().queue_capacity(3));
        let session = hub.create_session();
        assert!(hub.register(&session).is_accepted());

        let sent: Vec<_> = (1..=5).map(|i| hub.broadcast(rop(i as f64))).collect();

        let retained = session.pending_records();
        assert_eq!(retained.len(), 3);
        for (kept, original) in retained.iter().zip(&sent[2..]) {
            assert!(Arc::ptr_eq(kept, original));
        }
        assert_eq!(session.dropped(), 2);
    }

    #[tokio::test]
    async fn test_full_queue_does_not_affect_others() {
        let hub = BroadcastHub::with_config(HubConfig::default().queue_capacity(2));
        let slow = hub.create_session();
        let fast = hub.create_session();
        assert!(hub.register(&slow).is_accepted());
        assert!(hub.register(&fast).is_accepted());

        for seq in 1..=4 {
            hub.broadcast(rop(seq as f64));
            let record = fast.recv().await.unwrap();
            assert_eq!(record.seq(), seq);
        }

        assert_eq!(slow.dropped(), 2);
        assert_eq!(fast.dropped(), 0);
        assert_eq!(pending_rop(&slow), vec![3.0, 4.0]);
    }

    #[test]
    fn test_stats() {
        let hub = BroadcastHub::with_config(HubConfig::default().queue_capacity(1));
        let session = hub.create_session();
        assert!(hub.register(&session).is_accepted());
        hub.broadcast(rop(1.0));
        hub.broadcast(rop(2.0));

        let stats = hub.stats();
        assert_eq!(stats.subscribers, 1);
        assert_eq!(stats.total_registrations, 1);
        assert_eq!(stats.records_broadcast, 2);
        assert_eq!(stats.latest_seq, Some(2));
        assert_eq!(stats.pending_records, 1);
        assert_eq!(stats.dropped_records, 1);

        let session_stats = hub.session_stats(session.id()).unwrap();
        assert_eq!(session_stats.dropped, 1);
        assert!(hub.session_stats(424242).is_none());
    }

    fn pending_seqs(session: &SubscriberSession) -> Vec<u64> {
        session.pending_records().iter().map(|r| r.seq()).collect()
    }

    #[test]
    fn test_concurrent_register_gets_each_record_once() {
        const RECORDS: u64 = 500;
        const SESSIONS: usize = 50;

        let hub = BroadcastHub::with_config(HubConfig::default().queue_capacity(1024));
        let sessions: Vec<_> = (0..SESSIONS).map(|_| hub.create_session()).collect();

        std::thread::scope(|scope| {
            scope.spawn(|| {
                for i in 1..=RECORDS {
                    hub.broadcast(rop(i as f64));
                }
            });

            for session in &sessions {
                assert!(hub.register(session).is_accepted());
                std::thread::yield_now();
            }
        });

        for session in &sessions {
            let seqs = pending_seqs(session);
            assert_eq!(session.dropped(), 0);
            assert_eq!(seqs.last(), Some(&RECORDS), "session {}", session.id());
            assert!(
                seqs.windows(2).all(|pair| pair[1] == pair[0] + 1),
                "session {} saw a gap or duplicate: {:?}",
                session.id(),
                seqs
            );
        }
    }

    #[test]
    fn test_concurrent_producers_keep_order() {
        const PER_PRODUCER: u64 = 200;

        let hub = BroadcastHub::with_config(HubConfig::default().queue_capacity(1024));
        let sessions: Vec<_> = (0..4).map(|_| hub.create_session()).collect();
        for session in &sessions {
            assert!(hub.register(session).is_accepted());
        }

        std::thread::scope(|scope| {
            for _ in 0..2 {
                scope.spawn(|| {
                    for i in 0..PER_PRODUCER {
                        hub.broadcast(rop(i as f64));
                    }
                });
            }
        });

        let expected: Vec<u64> = (1..=2 * PER_PRODUCER).collect();
        for session in &sessions {
            assert_eq!(pending_seqs(session), expected);
        }
        assert_eq!(hub.latest().unwrap().seq(), 2 * PER_PRODUCER);
    }

    #[test]
    fn test_register_racing_close_counts_every_attempt() {
        const SESSIONS: usize = 200;

        let hub = BroadcastHub::with_config(HubConfig::default().max_subscribers(0));
        hub.broadcast(rop(1.0));
        let sessions: Vec<_> = (0..SESSIONS).map(|_| hub.create_session()).collect();

        let outcomes: Vec<AttachResult> = std::thread::scope(|scope| {
            scope.spawn(|| {
                for session in &sessions {
                    session.close();
                }
            });
            sessions.iter().map(|session| hub.register(session)).collect()
        });

        let accepted = outcomes.iter().filter(|o| o.is_accepted()).count();
        let stats = hub.stats();
        assert_eq!(stats.total_registrations as usize, accepted);
        assert_eq!(stats.rejected_registrations as usize, SESSIONS - accepted);
        assert_eq!(hub.subscriber_count(), accepted);

        for (session, outcome) in sessions.iter().zip(&outcomes) {
            if !outcome.is_accepted() {
                assert_eq!(*outcome, AttachResult::Rejected(RejectReason::SessionClosed));
                assert!(hub.session(session.id()).is_none());
                assert_eq!(session.pending(), 0);
            }
        }
    }

    #[test]
    fn test_close_all() {
        let hub = BroadcastHub::new();
        let a = hub.create_session();
        let b = hub.create_session();
        assert!(hub.register(&a).is_accepted());
        assert!(hub.register(&b).is_accepted());
        hub.broadcast(rop(1.0));

        assert_eq!(hub.close_all(), 2);
        assert_eq!(hub.subscriber_count(), 0);
        assert_eq!(a.phase(), SessionPhase::Closing);
        assert_eq!(b.pending(), 0);
        assert_eq!(hub.latest().unwrap().seq(), 1);

        // Nothing left to close; later joiners still work
        assert_eq!(hub.close_all(), 0);
        let c = hub.create_session();
        assert!(hub.register(&c).is_accepted());
        assert_eq!(c.pending(), 1);
    }

    #[tokio::test]
    async fn test_sweep_removes_stalled() {
        let config = HubConfig::default().stall_timeout(Duration::from_millis(20));
        let hub = BroadcastHub::with_config(config);
        let stalled = hub.create_session();
        let idle = hub.create_session();
        assert!(hub.register(&stalled).is_accepted());

        hub.broadcast(rop(1.0));
        // idle joins later; its only record is the catchup copy, but its
        // registration counts as progress
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(hub.register(&idle).is_accepted());

        assert_eq!(hub.sweep_stalled(), 1);
        assert_eq!(hub.subscriber_count(), 1);
        assert_eq!(stalled.phase(), SessionPhase::Closing);
        assert!(idle.is_active());
    }

    #[tokio::test]
    async fn test_sweeper_task() {
        let config = HubConfig::default()
            .stall_timeout(Duration::from_millis(10))
            .sweep_interval(Duration::from_millis(5));
        let hub = Arc::new(BroadcastHub::with_config(config));
        let session = hub.create_session();
        assert!(hub.register(&session).is_accepted());
        hub.broadcast(rop(1.0));

        let handle = hub.spawn_sweeper();
        tokio::time::timeout(Duration::from_secs(2), session.closed())
            .await
            .unwrap();
        handle.abort();

        assert_eq!(hub.subscriber_count(), 0);
    }
}
