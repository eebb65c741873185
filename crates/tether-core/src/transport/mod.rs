//! Framed duplex byte stream
//!
//! The read half is owned by the correlator's read loop. The write half is
//! shared by every outbound path through a [`FrameSink`], which serializes
//! whole frames so that concurrent writers never interleave bytes.

pub mod framing;

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;

pub use framing::{FrameReader, FrameWriter};

use crate::error::{TetherError, TetherResult};
use crate::protocol::RpcMessage;

/// How long `close` waits for an in-flight write before giving up on a
/// clean shutdown of the stream
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Read half of a connection
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Write half of a connection
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Shared, serialized writer for outbound frames
pub struct FrameSink {
    writer: Mutex<FrameWriter<BoxedWriter>>,
    closed: AtomicBool,
}

impl FrameSink {
    pub fn new(writer: BoxedWriter) -> Self {
        Self {
            writer: Mutex::new(FrameWriter::new(writer)),
            closed: AtomicBool::new(false),
        }
    }

    /// Encode and write one message as a single frame.
    pub async fn send(&self, message: &RpcMessage) -> TetherResult<()> {
        if self.is_closed() {
            return Err(TetherError::ConnectionClosed);
        }
        let body = serde_json::to_vec(message)?;

        let mut writer = self.writer.lock().await;
        if self.is_closed() {
            return Err(TetherError::ConnectionClosed);
        }
        writer.write_frame(&body).await.map_err(|e| {
            let err = TetherError::from(e);
            if err.is_connection_closed() {
                self.mark_closed();
            }
            err
        })
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Refuse further writes without touching the underlying stream
    pub fn mark_closed(&self) {
        self.closed.store(true, Ordering::Release);
    }

    /// Refuse further writes and shut the stream down.
    ///
    /// A writer stuck on a peer that stopped reading is abandoned after a
    /// bounded wait; the stream is then released when the sink is dropped.
    pub async fn close(&self) {
        self.mark_closed();
        let shutdown = async {
            let mut writer = self.writer.lock().await;
            writer.shutdown().await
        };
        match tokio::time::timeout(CLOSE_TIMEOUT, shutdown).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::debug!("error shutting down writer: {}", e),
            Err(_) => tracing::debug!("writer busy after {:?}; skipping shutdown", CLOSE_TIMEOUT),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::RpcNotification;
    use std::sync::Arc;
    use tokio::io::duplex;

    #[tokio::test]
    async fn test_concurrent_sends_do_not_interleave() {
        let (client, server) = duplex(1 << 20);
        let sink = Arc::new(FrameSink::new(Box::new(client)));
        let mut reader = FrameReader::new(server);

        let mut tasks = Vec::new();
        for i in 0..16 {
            let sink = sink.clone();
            tasks.push(tokio::spawn(async move {
                let payload = "x".repeat(1000 + i);
                let msg = RpcMessage::Notification(
                    RpcNotification::new("test").with_params(serde_json::json!({ "p": payload })),
                );
                sink.send(&msg).await.unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        for _ in 0..16 {
            let body = reader.read_frame().await.unwrap().unwrap();
            let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
            assert_eq!(value["method"], "test");
        }
    }

    #[tokio::test]
    async fn test_close_does_not_wait_on_a_stalled_writer() {
        // Nobody reads the far end, so a large frame blocks mid-write
        let (client, _server) = duplex(64);
        let sink = Arc::new(FrameSink::new(Box::new(client)));

        let stalled = {
            let sink = Arc::clone(&sink);
            tokio::spawn(async move {
                let msg = RpcMessage::Notification(
                    RpcNotification::new("big").with_params(serde_json::json!({ "p": "x".repeat(4096) })),
                );
                sink.send(&msg).await
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        tokio::time::timeout(Duration::from_secs(5), sink.close())
            .await
            .unwrap();
        assert!(sink.is_closed());
        stalled.abort();
    }

    #[tokio::test]
    async fn test_send_after_close_fails() {
        let (client, _server) = duplex(1024);
        let sink = FrameSink::new(Box::new(client));
        sink.close().await;

        let msg = RpcMessage::Notification(RpcNotification::new("late"));
        assert!(sink.send(&msg).await.unwrap_err().is_connection_closed());
    }
}
