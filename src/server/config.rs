//! Server configuration

use std::net::SocketAddr;
use std::time::Duration;

use crate::hub::HubConfig;

/// Default port dashboards connect to
pub const DEFAULT_PORT: u16 = 3030;

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Enable TCP_NODELAY (disable Nagle's algorithm)
    pub tcp_nodelay: bool,

    /// Fail a send to a client after this long (None = no limit)
    pub send_timeout: Option<Duration>,

    /// Run the stall sweeper alongside the accept loop
    pub sweep_stalled: bool,

    /// How long connection tasks get to finish after shutdown before they are aborted
    pub shutdown_timeout: Duration,

    /// Hub settings used when the server creates its own hub
    pub hub: HubConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            tcp_nodelay: true, // Telemetry lines are small and latency-sensitive
            send_timeout: Some(Duration::from_secs(10)),
            sweep_stalled: true,
            shutdown_timeout: Duration::from_secs(5),
            hub: HubConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set maximum subscribers
    pub fn max_subscribers(mut self, max: usize) -> Self {
        self.hub = self.hub.max_subscribers(max);
        self
    }

    /// Set per-session queue capacity
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.hub = self.hub.queue_capacity(capacity);
        self
    }

    /// Set the send timeout
    pub fn send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = Some(timeout);
        self
    }

    /// Disable the send timeout
    pub fn no_send_timeout(mut self) -> Self {
        self.send_timeout = None;
        self
    }

    /// Disable the stall sweeper
    pub fn disable_sweeper(mut self) -> Self {
        self.sweep_stalled = false;
        self
    }

    /// Set the shutdown grace period
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}
