//! Real-time drilling telemetry distribution
//!
//! One upstream rig feed, many dashboards. Decoded readings enter through
//! [`BroadcastHub::broadcast`] and are fanned out to every connected
//! [`SubscriberSession`], each with its own bounded drop-oldest queue and its
//! own [`DrainLoop`] task, so a stalled dashboard never holds up the feed or
//! its neighbours.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use rig_telemetry::{BroadcastHub, HubConfig, SensorReading, ServerConfig, TelemetryServer};
//!
//! # async fn example() -> rig_telemetry::Result<()> {
//! let hub = Arc::new(BroadcastHub::with_config(
//!     HubConfig::default().max_subscribers(64).queue_capacity(32),
//! ));
//! let server = TelemetryServer::with_hub(ServerConfig::default(), Arc::clone(&hub));
//!
//! hub.broadcast(SensorReading::new().number("ROP", 12.5).status("SLIPS", "OUT"));
//!
//! server.run().await?;
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod error;
pub mod feed;
pub mod hub;
pub mod record;
pub mod server;
pub mod session;
pub mod stats;

pub use adapter::{ChannelAdapter, JsonLinesAdapter, SendFailure};
pub use error::{Error, Result};
pub use feed::{FeedConfig, FeedEvent, FeedPump, RecordSource, SourceConnector};
pub use hub::{AttachResult, BroadcastHub, HubConfig, RejectReason};
pub use record::{FieldValue, SensorReading, SensorRecord};
pub use server::{ServerConfig, TelemetryServer};
pub use session::{DrainExit, DrainLoop, SessionPhase, SubscriberSession};
pub use stats::{HubStats, SessionStats};
