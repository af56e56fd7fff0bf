//! TCP transport for dashboard clients
//!
//! Each accepted connection becomes one subscriber session streaming
//! newline-delimited `sensorData` envelopes. Anything the client writes is
//! ignored; EOF or a reset closes the session.

pub mod config;
pub mod listener;

pub use config::ServerConfig;
pub use listener::TelemetryServer;
