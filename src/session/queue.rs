//! Bounded per-session delivery queue
//!
//! One producer (the hub's fan-out) pushes, one consumer (the session's drain
//! loop) pops. A push never waits: when the queue is full the oldest record is
//! evicted and counted as dropped.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::Notify;

use crate::record::SensorRecord;

/// Result of a push
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Record appended with room to spare
    Queued,
    /// Queue was full; the oldest record was evicted to make room
    Evicted,
    /// Queue is closed; record discarded
    Closed,
}

struct Inner {
    items: VecDeque<Arc<SensorRecord>>,
    closed: bool,
}

/// Bounded drop-oldest FIFO of shared records
pub struct DeliveryQueue {
    inner: Mutex<Inner>,
    notify: Notify,
    capacity: usize,
    dropped: AtomicU64,
}

impl DeliveryQueue {
    /// Create a queue holding at most `capacity` records (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            notify: Notify::new(),
            capacity,
            dropped: AtomicU64::new(0),
        }
    }

    // Nothing inside the critical section can panic halfway through a
    // mutation, so a poisoned lock still guards consistent data.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append a record, evicting the head if full
    pub fn push(&self, record: Arc<SensorRecord>) -> PushOutcome {
        let outcome = {
            let mut inner = self.lock();
            if inner.closed {
                return PushOutcome::Closed;
            }

            let outcome = if inner.items.len() >= self.capacity {
                inner.items.pop_front();
                self.dropped.fetch_add(1, Ordering::Relaxed);
                PushOutcome::Evicted
            } else {
                PushOutcome::Queued
            };

            inner.items.push_back(record);
            outcome
        };

        self.notify.notify_one();
        outcome
    }

    /// Pop the head without waiting
    pub fn try_pop(&self) -> Option<Arc<SensorRecord>> {
        let mut inner = self.lock();
        if inner.closed {
            return None;
        }
        inner.items.pop_front()
    }

    /// Wait for the next record
    ///
    /// Returns `None` once the queue is closed. Only one task may wait at a
    /// time; `notify_one` keeps a permit if a push lands before the wait
    /// begins, so no wake-up is lost.
    pub async fn pop(&self) -> Option<Arc<SensorRecord>> {
        loop {
            {
                let mut inner = self.lock();
                if inner.closed {
                    return None;
                }
                if let Some(record) = inner.items.pop_front() {
                    return Some(record);
                }
            }

            self.notify.notified().await;
        }
    }

    /// Close the queue, discarding pending records and waking the consumer
    ///
    /// Returns how many records were discarded. Idempotent.
    pub fn close(&self) -> usize {
        let discarded = {
            let mut inner = self.lock();
            if inner.closed {
                return 0;
            }
            inner.closed = true;
            let discarded = inner.items.len();
            inner.items.clear();
            discarded
        };

        self.notify.notify_one();
        discarded
    }

    /// Check if the queue has been closed
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Number of pending records
    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    /// Check if no records are pending
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of pending records
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total records evicted by drop-oldest
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Pending records, head first
    pub fn snapshot(&self) -> Vec<Arc<SensorRecord>> {
        self.lock().items.iter().cloned().collect()
    }

    /// The oldest pending record
    pub fn front(&self) -> Option<Arc<SensorRecord>> {
        self.lock().items.front().cloned()
    }
}
