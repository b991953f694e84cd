//! JSON message channel over a byte stream

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use serde::de::IgnoredAny;
use shared_protocol::MAX_MESSAGE_SIZE;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace};

use crate::{READ_CHUNK_SIZE, TransportError, TransportResult};

/// Channel carrying one JSON object per message
///
/// The peer writes objects back to back with no length prefix, so frames are
/// cut at JSON value boundaries. Several objects arriving in one read are
/// handed out one per `receive`; an object split across reads is reassembled.
pub struct JsonChannel<S> {
    stream: S,
    buffer: BytesMut,
    timeout: Duration,
    max_frame_size: usize,
}

impl<S> JsonChannel<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, timeout: Duration) -> Self {
        Self {
            stream,
            buffer: BytesMut::with_capacity(READ_CHUNK_SIZE),
            timeout,
            max_frame_size: MAX_MESSAGE_SIZE,
        }
    }

    /// Override the largest accepted message
    #[cfg(test)]
    fn with_max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Change how long `receive` waits from now on
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Write one serialized message
    pub async fn send(&mut self, payload: &[u8]) -> TransportResult<()> {
        if payload.len() > self.max_frame_size {
            return Err(TransportError::FrameTooLarge {
                size: payload.len(),
                max: self.max_frame_size,
            });
        }

        self.stream.write_all(payload).await?;
        self.stream.flush().await?;
        trace!(bytes = payload.len(), "sent frame");

        Ok(())
    }

    /// Wait for the next complete message
    pub async fn receive(&mut self) -> TransportResult<Bytes> {
        let deadline = tokio::time::Instant::now() + self.timeout;

        loop {
            if let Some(frame) = self.next_frame()? {
                trace!(bytes = frame.len(), "received frame");
                return Ok(frame);
            }

            if self.buffer.len() > self.max_frame_size {
                return Err(TransportError::FrameTooLarge {
                    size: self.buffer.len(),
                    max: self.max_frame_size,
                });
            }

            self.buffer.reserve(READ_CHUNK_SIZE);
            let read = tokio::time::timeout_at(deadline, self.stream.read_buf(&mut self.buffer))
                .await
                .map_err(|_| TransportError::Timeout(self.timeout))??;

            if read == 0 {
                debug!(pending = self.buffer.len(), "peer closed the stream");
                return Err(TransportError::Disconnected);
            }
        }
    }

    /// Cut the first complete JSON object off the buffer
    fn next_frame(&mut self) -> TransportResult<Option<Bytes>> {
        let Some(start) = self.buffer.iter().position(|b| !b.is_ascii_whitespace()) else {
            self.buffer.clear();
            return Ok(None);
        };

        if self.buffer[start] != b'{' {
            return Err(TransportError::MalformedFrame(format!(
                "expected a JSON object, found byte 0x{:02x}",
                self.buffer[start]
            )));
        }

        let end = {
            let mut values =
                serde_json::Deserializer::from_slice(&self.buffer[start..]).into_iter::<IgnoredAny>();
            match values.next() {
                Some(Ok(_)) => start + values.byte_offset(),
                Some(Err(e)) if e.is_eof() => return Ok(None),
                Some(Err(e)) => return Err(TransportError::MalformedFrame(e.to_string())),
                None => return Ok(None),
            }
        };

        let frame = self.buffer.split_to(end).freeze().slice(start..);
        Ok(Some(frame))
    }

    /// Shut the stream down; failures are only logged
    pub async fn close(mut self) {
        if let Err(e) = self.stream.shutdown().await {
            debug!("error while closing channel: {}", e);
        }
    }
}
