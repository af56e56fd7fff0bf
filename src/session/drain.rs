//! Per-session delivery loop
//!
//! Each registered session gets its own drain loop, normally on its own tokio
//! task. The loop is the only consumer of the session queue and the only
//! place that awaits the client transport, so a stalled client holds up
//! nothing but itself.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use super::subscriber::SubscriberSession;
use crate::adapter::{ChannelAdapter, SendFailure};
use crate::hub::BroadcastHub;

/// Why a drain loop stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainExit {
    /// The session was closed (disconnect, unregister, sweep)
    Closed,
    /// The adapter reported a failure
    SendFailed(SendFailure),
}

/// Delivery loop binding one session to one adapter
pub struct DrainLoop<A> {
    hub: Arc<BroadcastHub>,
    session: Arc<SubscriberSession>,
    adapter: A,
    send_timeout: Option<Duration>,
}

impl<A: ChannelAdapter> DrainLoop<A> {
    /// Create a drain loop for a registered session
    pub fn new(hub: Arc<BroadcastHub>, session: Arc<SubscriberSession>, adapter: A) -> Self {
        Self {
            hub,
            session,
            adapter,
            send_timeout: None,
        }
    }

    /// Fail a send that takes longer than `timeout`
    pub fn send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = Some(timeout);
        self
    }

    /// Run until the session closes or a send fails
    ///
    /// On exit the adapter is closed, the session unregistered from the hub
    /// and moved to `Closed`.
    pub async fn run(self) -> DrainExit {
        let DrainLoop {
            hub,
            session,
            mut adapter,
            send_timeout,
        } = self;
        let session_id = session.id();

        tracing::debug!(session_id = session_id, "Drain loop started");

        let exit = loop {
            let Some(record) = session.recv().await else {
                break DrainExit::Closed;
            };
            let seq = record.seq();

            let send = async {
                match send_timeout {
                    Some(timeout) => tokio::time::timeout(timeout, adapter.send(record))
                        .await
                        .unwrap_or(Err(SendFailure::Timeout)),
                    None => adapter.send(record).await,
                }
            };

            // A close while blocked in the transport abandons the send.
            let result = tokio::select! {
                result = send => result,
                _ = session.closed() => break DrainExit::Closed,
            };

            match result {
                Ok(()) => {
                    session.mark_delivered();
                    tracing::trace!(session_id = session_id, seq = seq, "Record delivered");
                }
                Err(failure) => {
                    tracing::warn!(
                        session_id = session_id,
                        seq = seq,
                        error = %failure,
                        "Delivery failed, closing session"
                    );
                    session.close();
                    break DrainExit::SendFailed(failure);
                }
            }
        };

        adapter.close().await;
        hub.unregister(session_id);
        session.mark_closed();

        tracing::debug!(
            session_id = session_id,
            delivered = session.delivered(),
            dropped = session.dropped(),
            exit = ?exit,
            "Drain loop finished"
        );

        exit
    }
}

impl<A: ChannelAdapter + 'static> DrainLoop<A> {
    /// Run the loop on its own task
    pub fn spawn(self) -> JoinHandle<DrainExit> {
        tokio::spawn(self.run())
    }
}
