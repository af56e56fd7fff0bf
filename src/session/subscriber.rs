//! Subscriber session
//!
//! Per-client delivery state. The hub is the only writer to the queue
//! (`enqueue`), the session's drain loop the only reader (`recv`).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::{Duration, Instant};

use tokio::sync::Notify;

use super::queue::{DeliveryQueue, PushOutcome};
use super::state::SessionPhase;
use crate::record::SensorRecord;
use crate::stats::SessionStats;

/// One connected dashboard client
pub struct SubscriberSession {
    /// Unique session ID
    id: u64,

    /// Pending records, drop-oldest when full
    queue: DeliveryQueue,

    /// Current lifecycle phase
    phase: Mutex<SessionPhase>,

    /// Woken when the session leaves the live phases
    closed_notify: Notify,

    /// When the transport connected
    created_at: Instant,

    /// When the hub accepted the session
    registered_at: OnceLock<Instant>,

    /// Last registration or successful delivery
    last_progress: Mutex<Instant>,

    /// Records handed to the adapter successfully
    delivered: AtomicU64,
}

impl SubscriberSession {
    /// Create a session in the `Connecting` phase
    pub fn new(id: u64, queue_capacity: usize) -> Self {
        let now = Instant::now();
        Self {
            id,
            queue: DeliveryQueue::new(queue_capacity),
            phase: Mutex::new(SessionPhase::Connecting),
            closed_notify: Notify::new(),
            created_at: now,
            registered_at: OnceLock::new(),
            last_progress: Mutex::new(now),
            delivered: AtomicU64::new(0),
        }
    }

    fn lock_phase(&self) -> MutexGuard<'_, SessionPhase> {
        self.phase.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn transition(&self, next: SessionPhase) -> bool {
        let mut phase = self.lock_phase();
        if phase.can_transition_to(next) {
            *phase = next;
            true
        } else {
            false
        }
    }

    /// Session ID
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Current phase
    pub fn phase(&self) -> SessionPhase {
        *self.lock_phase()
    }

    /// Check if the session is registered and receiving records
    pub fn is_active(&self) -> bool {
        self.phase() == SessionPhase::Active
    }

    /// When the hub accepted this session
    pub fn registered_at(&self) -> Option<Instant> {
        self.registered_at.get().copied()
    }

    /// Queue a record for delivery; never blocks
    pub fn enqueue(&self, record: Arc<SensorRecord>) -> PushOutcome {
        let seq = record.seq();
        let outcome = self.queue.push(record);

        if outcome == PushOutcome::Evicted {
            tracing::trace!(
                session_id = self.id,
                seq = seq,
                dropped = self.queue.dropped(),
                "Queue full, evicted oldest record"
            );
        }

        outcome
    }

    /// Wait for the next record to deliver
    ///
    /// Returns `None` once the session is closed.
    pub(crate) async fn recv(&self) -> Option<Arc<SensorRecord>> {
        self.queue.pop().await
    }

    /// Terminate the session
    ///
    /// Moves a live session to `Closing`, discards pending records and wakes
    /// the drain loop. Returns `false` if the session was already closing.
    pub fn close(&self) -> bool {
        if !self.transition(SessionPhase::Closing) {
            return false;
        }

        let discarded = self.queue.close();
        self.closed_notify.notify_waiters();

        tracing::debug!(
            session_id = self.id,
            discarded = discarded,
            delivered = self.delivered(),
            dropped = self.dropped(),
            "Session closing"
        );
        true
    }

    /// Resolve once the session has left the live phases
    pub async fn closed(&self) {
        loop {
            // Created before the check so a concurrent close cannot slip
            // between the check and the wait.
            let notified = self.closed_notify.notified();
            if !self.phase().is_live() {
                return;
            }
            notified.await;
        }
    }

    /// Move from `Connecting` to `Active`; called by the hub under its lock
    pub(crate) fn activate(&self) -> bool {
        if !self.transition(SessionPhase::Active) {
            return false;
        }

        let now = Instant::now();
        let _ = self.registered_at.set(now);
        *self.last_progress.lock().unwrap_or_else(|e| e.into_inner()) = now;
        true
    }

    /// Move from `Closing` to `Closed`; called once the drain loop exits
    pub(crate) fn mark_closed(&self) -> bool {
        self.transition(SessionPhase::Closed)
    }

    /// Record a successful delivery
    pub(crate) fn mark_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
        *self.last_progress.lock().unwrap_or_else(|e| e.into_inner()) = Instant::now();
    }

    /// How long the session has had pending records without making progress
    ///
    /// Measured from the later of the last delivery (or registration) and the
    /// receive time of the oldest pending record. `None` if nothing is pending.
    pub fn stalled_for(&self, now: Instant) -> Option<Duration> {
        let head = self.queue.front()?;
        let progress = *self.last_progress.lock().unwrap_or_else(|e| e.into_inner());
        let since = progress.max(head.received_at());
        Some(now.saturating_duration_since(since))
    }

    /// Number of records waiting for delivery
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Pending records, oldest first
    pub fn pending_records(&self) -> Vec<Arc<SensorRecord>> {
        self.queue.snapshot()
    }

    /// Queue capacity
    pub fn queue_capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// Records evicted by drop-oldest
    pub fn dropped(&self) -> u64 {
        self.queue.dropped()
    }

    /// Records delivered to the adapter
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Snapshot of this session's counters
    pub fn stats(&self) -> SessionStats {
        SessionStats {
            session_id: self.id,
            phase: self.phase(),
            pending: self.pending(),
            delivered: self.delivered(),
            dropped: self.dropped(),
            connected_for: self.created_at.elapsed(),
            registered_for: self.registered_at().map(|at| at.elapsed()),
        }
    }
}

impl std::fmt::Debug for SubscriberSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberSession")
            .field("id", &self.id)
            .field("phase", &self.phase())
            .field("pending", &self.pending())
            .field("dropped", &self.dropped())
            .finish()
    }
}
