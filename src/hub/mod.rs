//! Broadcast hub for sensor records
//!
//! The hub receives every decoded reading from the upstream feed and fans it
//! out to all connected dashboard sessions. Each session owns a bounded
//! drop-oldest queue, so a slow client loses its own oldest records rather
//! than slowing the feed or any other client.
//!
//! # Architecture
//!
//! ```text
//!                         Arc<BroadcastHub>
//!                    ┌──────────────────────────┐
//!                    │ state: Mutex<            │
//!                    │   sessions: id → Session │
//!                    │   latest: Arc<Record>    │
//!                    │ >                        │
//!                    └────────────┬─────────────┘
//!                                 │ snapshot, then push
//!         ┌───────────────────────┼───────────────────────┐
//!         ▼                       ▼                       ▼
//!   [FeedPump]               [Session 1]             [Session 2]
//!   hub.broadcast()          queue (cap N)           queue (cap N)
//!                                 │                       │
//!                            DrainLoop               DrainLoop
//!                                 └──► adapter.send() ──► client
//! ```
//!
//! # Late joiners
//!
//! A newly registered session receives the latest record as its first item,
//! so a dashboard that (re)connects shows current state without waiting for
//! the next upstream frame. Records older than the latest are never replayed.

pub mod config;
pub mod error;
pub mod store;

pub use config::HubConfig;
pub use error::{AttachResult, RejectReason};
pub use store::BroadcastHub;
