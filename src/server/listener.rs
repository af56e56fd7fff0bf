//! Telemetry server listener
//!
//! Handles the TCP accept loop and wires each connection to a session.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;

use crate::adapter::JsonLinesAdapter;
use crate::error::Result;
use crate::hub::{AttachResult, BroadcastHub, RejectReason};
use crate::record::envelope;
use crate::server::config::ServerConfig;
use crate::session::{DrainLoop, SubscriberSession};

/// Telemetry server
pub struct TelemetryServer {
    config: ServerConfig,
    hub: Arc<BroadcastHub>,
}

impl TelemetryServer {
    /// Create a server with its own hub built from `config.hub`
    pub fn new(config: ServerConfig) -> Self {
        let hub = Arc::new(BroadcastHub::with_config(config.hub.clone()));
        Self::with_hub(config, hub)
    }

    /// Create a server around an existing hub
    pub fn with_hub(config: ServerConfig, hub: Arc<BroadcastHub>) -> Self {
        Self { config, hub }
    }

    /// Get a reference to the hub, e.g. to hand to a feed pump
    pub fn hub(&self) -> &Arc<BroadcastHub> {
        &self.hub
    }

    /// Get the bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }

    /// Run the server
    ///
    /// This method blocks until the listener fails to bind.
    pub async fn run(&self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Run the server with graceful shutdown
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve_until(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` resolves
    ///
    /// On shutdown every session is closed and its connection tasks get
    /// `shutdown_timeout` to finish before they are aborted.
    pub async fn serve_until<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        tracing::info!(
            addr = %listener.local_addr()?,
            max_subscribers = self.hub.config().max_subscribers,
            queue_capacity = self.hub.config().queue_capacity,
            "Telemetry server listening"
        );

        let sweeper = self.config.sweep_stalled.then(|| self.hub.spawn_sweeper());
        let mut connections = JoinSet::new();

        tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutdown signal received");
            }
            _ = self.accept_loop(&listener, &mut connections) => {}
        }

        if let Some(handle) = sweeper {
            handle.abort();
        }
        drop(listener);

        let closed = self.hub.close_all();
        let drained = tokio::time::timeout(self.config.shutdown_timeout, async {
            while connections.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            tracing::warn!(
                remaining = connections.len(),
                "Connection tasks did not finish in time, aborting"
            );
            connections.shutdown().await;
        }

        tracing::info!(closed_sessions = closed, "Telemetry server stopped");
        Ok(())
    }

    async fn accept_loop(&self, listener: &TcpListener, connections: &mut JoinSet<()>) {
        loop {
            match listener.accept().await {
                Ok((socket, peer_addr)) => {
                    self.handle_connection(socket, peer_addr, connections);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept connection");
                }
            }

            // Reap finished connections
            while connections.try_join_next().is_some() {}
        }
    }

    fn handle_connection(
        &self,
        socket: TcpStream,
        peer_addr: SocketAddr,
        connections: &mut JoinSet<()>,
    ) {
        if self.config.tcp_nodelay {
            if let Err(e) = socket.set_nodelay(true) {
                tracing::error!(peer = %peer_addr, error = %e, "Failed to configure socket");
                return;
            }
        }

        let session = self.hub.create_session();
        let session_id = session.id();

        if let AttachResult::Rejected(reason) = self.hub.register(&session) {
            connections.spawn(reject(socket, session, reason, peer_addr));
            return;
        }

        tracing::debug!(session_id = session_id, peer = %peer_addr, "Dashboard connected");

        let (reader, writer) = socket.into_split();

        let mut drain = DrainLoop::new(
            Arc::clone(&self.hub),
            Arc::clone(&session),
            JsonLinesAdapter::new(writer),
        );
        if let Some(timeout) = self.config.send_timeout {
            drain = drain.send_timeout(timeout);
        }

        connections.spawn(async move {
            drain.run().await;
        });
        connections.spawn(watch_disconnect(reader, session, peer_addr));
    }
}

/// Tell a refused client why, then hang up
///
/// The session never registered, so it goes straight to `Closed` here.
async fn reject<S>(
    mut socket: S,
    session: Arc<SubscriberSession>,
    reason: RejectReason,
    peer_addr: SocketAddr,
) where
    S: AsyncWrite + Unpin,
{
    session.close();

    if let Ok(notice) = envelope::encode_rejection(reason) {
        let _ = socket.write_all(&notice).await;
        let _ = socket.write_all(b"\n").await;
    }
    let _ = socket.shutdown().await;
    session.mark_closed();

    tracing::debug!(
        session_id = session.id(),
        peer = %peer_addr,
        reason = %reason,
        "Rejected connection closed"
    );
}

/// Close the session when the client hangs up
///
/// Dashboards only listen, so inbound bytes are discarded.
async fn watch_disconnect<R>(mut reader: R, session: Arc<SubscriberSession>, peer_addr: SocketAddr)
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; 256];

    let hung_up = async {
        loop {
            match reader.read(&mut buf).await {
                Ok(0) => break None,
                Ok(_) => continue,
                Err(e) => break Some(e),
            }
        }
    };

    tokio::select! {
        error = hung_up => {
            tracing::debug!(
                session_id = session.id(),
                peer = %peer_addr,
                error = ?error.map(|e| e.to_string()),
                "Dashboard disconnected"
            );
            session.close();
        }
        _ = session.closed() => {}
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::{AsyncBufReadExt, BufReader};

    use super::*;
    use crate::record::SensorReading;
    use crate::session::SessionPhase;

    async fn start(config: ServerConfig) -> (Arc<BroadcastHub>, SocketAddr, tokio::task::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = TelemetryServer::new(config);
        let hub = Arc::clone(server.hub());

        let handle = tokio::spawn(async move {
            let _ = server.serve_until(listener, std::future::pending()).await;
        });

        (hub, addr, handle)
    }

    async fn wait_for_subscribers(hub: &BroadcastHub, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while hub.subscriber_count() != count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_streams_json_lines() {
        let (hub, addr, server) = start(ServerConfig::default()).await;
        hub.broadcast(SensorReading::new().number("ROP", 12.5));

        let stream = TcpStream::connect(addr).await.unwrap();
        let mut lines = BufReader::new(stream).lines();
        wait_for_subscribers(&hub, 1).await;

        let first: serde_json::Value =
            serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(first["event"], "sensorData");
        assert_eq!(first["data"]["fields"]["ROP"], 12.5);

        hub.broadcast(SensorReading::new().number("ROP", 13.0).status("SLIPS", "IN"));
        let second: serde_json::Value =
            serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(second["data"]["fields"]["SLIPS"], "IN");

        drop(lines);
        wait_for_subscribers(&hub, 0).await;
        server.abort();
    }

    #[tokio::test]
    async fn test_shutdown_closes_sessions() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = TelemetryServer::new(ServerConfig::default());
        let hub = Arc::clone(server.hub());
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            server
                .serve_until(listener, async {
                    let _ = stop_rx.await;
                })
                .await
        });

        let stream = TcpStream::connect(addr).await.unwrap();
        let mut lines = BufReader::new(stream).lines();
        wait_for_subscribers(&hub, 1).await;

        stop_tx.send(()).unwrap();
        handle.await.unwrap().unwrap();
        assert_eq!(hub.subscriber_count(), 0);

        // Records after shutdown go nowhere; the client sees EOF
        hub.broadcast(SensorReading::new().number("ROP", 1.0));
        let next = tokio::time::timeout(Duration::from_secs(5), lines.next_line())
            .await
            .unwrap()
            .unwrap();
        assert!(next.is_none());
        assert!(TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn test_reject_finishes_session() {
        let hub = BroadcastHub::new();
        let session = hub.create_session();
        let (client, server_side) = tokio::io::duplex(1024);
        let peer: SocketAddr = "127.0.0.1:9".parse().unwrap();

        reject(server_side, Arc::clone(&session), RejectReason::CapacityExceeded, peer).await;
        assert_eq!(session.phase(), SessionPhase::Closed);

        let mut lines = BufReader::new(client).lines();
        let notice: serde_json::Value =
            serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(notice["event"], "rejected");
        assert_eq!(notice["data"]["reason"], "capacity_exceeded");
        assert!(lines.next_line().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rejects_over_capacity() {
        let (hub, addr, server) = start(ServerConfig::default().max_subscribers(1)).await;

        let _first = TcpStream::connect(addr).await.unwrap();
        wait_for_subscribers(&hub, 1).await;

        let second = TcpStream::connect(addr).await.unwrap();
        let mut lines = BufReader::new(second).lines();
        let notice: serde_json::Value =
            serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();

        assert_eq!(notice["event"], "rejected");
        assert_eq!(notice["data"]["reason"], "capacity_exceeded");
        assert!(lines.next_line().await.unwrap().is_none());
        assert_eq!(hub.subscriber_count(), 1);
        server.abort();
    }
}
