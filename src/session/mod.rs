//! Subscriber sessions
//!
//! A session is the hub's view of one dashboard client: a bounded
//! drop-oldest queue, a lifecycle phase, and counters. Its [`DrainLoop`]
//! moves records from the queue to a [`ChannelAdapter`](crate::adapter::ChannelAdapter).

pub mod drain;
pub mod queue;
pub mod state;
pub mod subscriber;

pub use drain::{DrainExit, DrainLoop};
pub use queue::{DeliveryQueue, PushOutcome};
pub use state::SessionPhase;
pub use subscriber::SubscriberSession;
