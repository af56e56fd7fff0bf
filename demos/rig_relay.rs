//! Rig telemetry relay example
//!
//! Run with: cargo run --example rig_relay [BIND_ADDR]
//!
//! Examples:
//!   cargo run --example rig_relay                    # binds to 0.0.0.0:3030
//!   cargo run --example rig_relay 127.0.0.1:4000     # binds to 127.0.0.1:4000
//!
//! ## Watching the feed
//!
//!   nc localhost 3030
//!
//! Every line is a `sensorData` JSON event. Connect several clients, suspend
//! one with Ctrl-Z and watch the others keep streaming.
//!
//! ## Features
//!
//! - Synthetic WITS-style feed with a simulated upstream drop every 30 frames
//! - Late joiners receive the latest record immediately
//! - Slow clients lose their own oldest records, nobody else's

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use rig_telemetry::{
    FeedConfig, FeedPump, RecordSource, Result, SensorReading, ServerConfig, SourceConnector,
    TelemetryServer,
};
use tracing_subscriber::EnvFilter;

/// Produces plausible drilling parameters once per second
struct SyntheticRig {
    tick: u64,
    frames_left: u32,
    interval: tokio::time::Interval,
}

impl RecordSource for SyntheticRig {
    async fn next_reading(&mut self) -> Result<Option<SensorReading>> {
        if self.frames_left == 0 {
            return Ok(None);
        }
        self.frames_left -= 1;
        self.interval.tick().await;
        self.tick += 1;

        let t = self.tick as f64;
        let depth = 2310.0 + t * 0.05;
        let rop = 12.5 + (t / 7.0).sin() * 1.5;
        let on_bottom = if self.tick % 20 < 17 { "YES" } else { "NO" };
        let raw = format!("&&\r\n0108{:.2}\r\n0110{:.2}\r\n!!\r\n", depth, rop);

        Ok(Some(
            SensorReading::new()
                .number("HOLE_DEPTH", depth)
                .number("DEPTH", depth - 0.4)
                .number("ROP", rop)
                .number("WOB", 22.0 + (t / 5.0).cos())
                .number("SPP", 2150.0 + (t / 3.0).sin() * 40.0)
                .number("HOOKLOAD", 180.0)
                .number("TORQ", 9.8)
                .number("SPM1", 95.0)
                .number("SPM2", 94.0)
                .number("FLOW", 620.0)
                .status("SLIPS", "OUT")
                .status("ON_BOTTOM", on_bottom)
                .raw(raw),
        ))
    }
}

struct SyntheticConnector {
    ticks: AtomicU64,
}

impl SourceConnector for SyntheticConnector {
    type Source = SyntheticRig;

    async fn connect(&self) -> Result<SyntheticRig> {
        Ok(SyntheticRig {
            tick: self.ticks.fetch_add(30, Ordering::Relaxed),
            frames_left: 30,
            interval: tokio::time::interval(Duration::from_secs(1)),
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let bind_addr: SocketAddr = std::env::args()
        .nth(1)
        .and_then(|arg| arg.parse().ok())
        .unwrap_or_else(|| ServerConfig::default().bind_addr);

    let config = ServerConfig::with_addr(bind_addr)
        .max_subscribers(32)
        .queue_capacity(16)
        .send_timeout(Duration::from_secs(5));
    let server = TelemetryServer::new(config);

    let (pump, mut events) = FeedPump::new(
        std::sync::Arc::clone(server.hub()),
        SyntheticConnector {
            ticks: AtomicU64::new(0),
        },
        FeedConfig::default().initial_backoff(Duration::from_secs(2)),
    );

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            tracing::info!(event = ?event, "Feed event");
        }
    });

    let hub = std::sync::Arc::clone(server.hub());
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(10));
        loop {
            ticker.tick().await;
            let stats = hub.stats();
            tracing::info!(
                subscribers = stats.subscribers,
                records = stats.records_broadcast,
                dropped = stats.dropped_records,
                "Hub stats"
            );
        }
    });

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    tokio::select! {
        result = server.run_until(shutdown) => result?,
        result = pump.run() => result?,
    }

    Ok(())
}
