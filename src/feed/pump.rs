//! Feed pump
//!
//! Drives a [`RecordSource`] into the hub and keeps it connected.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use super::config::FeedConfig;
use super::{RecordSource, SourceConnector};
use crate::error::Result;
use crate::hub::BroadcastHub;

/// Events from the feed pump
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEvent {
    /// Upstream connected
    Connected,

    /// Upstream ended or failed; readings stopped
    Disconnected,

    /// Connect or read error
    Error(String),

    /// Waiting before the next connect attempt
    Reconnecting {
        /// Consecutive failed connects so far
        attempt: u32,
        /// Delay before trying again
        delay: Duration,
    },
}

/// Pulls readings from the upstream feed into the hub
///
/// The hub keeps its latest record across upstream drops, so dashboards that
/// join during an outage still see the last known state.
pub struct FeedPump<C> {
    hub: Arc<BroadcastHub>,
    connector: C,
    config: FeedConfig,
    event_tx: mpsc::Sender<FeedEvent>,
}

impl<C: SourceConnector> FeedPump<C> {
    /// Create a new pump.
    ///
    /// Returns the pump and a receiver for events. Events are dropped rather
    /// than awaited when the receiver falls behind.
    pub fn new(
        hub: Arc<BroadcastHub>,
        connector: C,
        config: FeedConfig,
    ) -> (Self, mpsc::Receiver<FeedEvent>) {
        let (tx, rx) = mpsc::channel(64);

        let pump = Self {
            hub,
            connector,
            config,
            event_tx: tx,
        };

        (pump, rx)
    }

    fn emit(&self, event: FeedEvent) {
        let _ = self.event_tx.try_send(event);
    }

    /// Run until the connect failure limit is reached
    ///
    /// With no limit configured this never returns.
    pub async fn run(&self) -> Result<()> {
        let mut backoff = self.config.initial_backoff;
        let mut failures: u32 = 0;

        loop {
            match self.connector.connect().await {
                Ok(source) => {
                    failures = 0;
                    backoff = self.config.initial_backoff;
                    self.emit(FeedEvent::Connected);
                    tracing::info!("Upstream feed connected");

                    let forwarded = self.pump(source).await;

                    self.emit(FeedEvent::Disconnected);
                    tracing::info!(
                        forwarded = forwarded,
                        subscribers = self.hub.subscriber_count(),
                        "Upstream feed disconnected"
                    );
                }
                Err(e) => {
                    failures += 1;
                    self.emit(FeedEvent::Error(e.to_string()));
                    tracing::warn!(error = %e, attempt = failures, "Upstream connect failed");

                    if let Some(max) = self.config.max_connect_failures {
                        if failures >= max {
                            tracing::error!(attempts = failures, "Giving up on upstream feed");
                            return Err(e);
                        }
                    }
                }
            }

            self.emit(FeedEvent::Reconnecting {
                attempt: failures,
                delay: backoff,
            });
            tracing::debug!(delay_ms = backoff.as_millis() as u64, "Reconnecting upstream");
            tokio::time::sleep(backoff).await;
            backoff = self.config.next_backoff(backoff);
        }
    }

    /// Run until `shutdown` resolves or the pump gives up
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        tokio::select! {
            _ = shutdown => {
                tracing::info!("Feed pump shutting down");
                Ok(())
            }
            result = self.run() => result,
        }
    }

    /// Forward readings until the source ends; returns how many were broadcast
    async fn pump(&self, mut source: C::Source) -> u64 {
        let mut forwarded = 0;

        loop {
            match source.next_reading().await {
                Ok(Some(reading)) if reading.is_empty() => {
                    tracing::trace!("Skipping empty reading");
                }
                Ok(Some(reading)) => {
                    self.hub.broadcast(reading);
                    forwarded += 1;
                }
                Ok(None) => break,
                Err(e) => {
                    self.emit(FeedEvent::Error(e.to_string()));
                    tracing::warn!(error = %e, "Upstream read failed");
                    break;
                }
            }
        }

        forwarded
    }
}
