//! Newline-delimited JSON adapter
//!
//! Writes one `sensorData` envelope per line to any `AsyncWrite`, typically
//! the write half of a TCP connection.

use std::sync::Arc;

use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::{ChannelAdapter, SendFailure};
use crate::record::envelope;
use crate::record::SensorRecord;

/// Adapter framing envelopes as JSON lines
pub struct JsonLinesAdapter<W> {
    writer: W,
    buf: BytesMut,
}

impl<W> JsonLinesAdapter<W>
where
    W: AsyncWrite + Unpin + Send,
{
    /// Wrap a writer
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            buf: BytesMut::with_capacity(512),
        }
    }

    /// Write one pre-encoded line
    pub async fn write_line(&mut self, payload: &[u8]) -> Result<(), SendFailure> {
        self.buf.clear();
        self.buf.reserve(payload.len() + 1);
        self.buf.put_slice(payload);
        self.buf.put_u8(b'\n');

        self.writer.write_all(&self.buf).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Recover the inner writer
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W> ChannelAdapter for JsonLinesAdapter<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, record: Arc<SensorRecord>) -> Result<(), SendFailure> {
        let payload =
            envelope::encode_record(&record).map_err(|e| SendFailure::Encode(e.to_string()))?;
        self.write_line(&payload).await
    }

    async fn close(&mut self) {
        if let Err(e) = self.writer.shutdown().await {
            tracing::trace!(error = %e, "Writer shutdown failed");
        }
    }
}
