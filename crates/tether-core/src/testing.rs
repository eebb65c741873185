//! Test doubles for driving a client without a real agent process
//!
//! [`FakeRemote`] is the far end of an in-memory pipe that speaks the same
//! Content-Length framing as the agent.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::io::{AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};

use crate::connection::Connection;
use crate::error::{TetherError, TetherResult};
use crate::protocol::{RpcError, RpcNotification, RpcRequest, SDK_PROTOCOL_VERSION};
use crate::rpc::{InboundHandler, Responder};
use crate::transport::{FrameReader, FrameWriter};

const PIPE_CAPACITY: usize = 1 << 20;

/// Scripted stand-in for the agent process
pub struct FakeRemote {
    reader: FrameReader<ReadHalf<DuplexStream>>,
    writer: FrameWriter<WriteHalf<DuplexStream>>,
}

impl FakeRemote {
    /// A client-side connection and the fake remote attached to it
    pub fn pair() -> (Connection, FakeRemote) {
        let (local, remote) = tokio::io::duplex(PIPE_CAPACITY);
        let (local_read, local_write) = tokio::io::split(local);
        let (remote_read, remote_write) = tokio::io::split(remote);
        (
            Connection::from_streams(Box::new(local_read), Box::new(local_write)),
            FakeRemote {
                reader: FrameReader::new(remote_read),
                writer: FrameWriter::new(remote_write),
            },
        )
    }

    /// Next message written by the client
    pub async fn recv(&mut self) -> TetherResult<Value> {
        let body = self
            .reader
            .read_frame()
            .await?
            .ok_or(TetherError::ConnectionClosed)?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Next message, which must be a request for `method`
    pub async fn expect_request(&mut self, method: &str) -> TetherResult<Value> {
        let msg = self.recv().await?;
        if msg["method"] != method {
            return Err(TetherError::protocol(format!(
                "expected request {}, got {}",
                method, msg
            )));
        }
        Ok(msg)
    }

    /// Write a raw frame body
    pub async fn send_raw(&mut self, body: &[u8]) -> TetherResult<()> {
        self.writer.write_frame(body).await?;
        Ok(())
    }

    /// Write bytes as-is, without a frame header
    pub async fn send_unframed(&mut self, bytes: &[u8]) -> TetherResult<()> {
        let stream = self.writer.get_mut();
        stream.write_all(bytes).await?;
        stream.flush().await?;
        Ok(())
    }

    pub async fn send(&mut self, value: Value) -> TetherResult<()> {
        let body = serde_json::to_vec(&value)?;
        self.send_raw(&body).await
    }

    pub async fn respond(&mut self, id: &Value, result: Value) -> TetherResult<()> {
        self.send(json!({"jsonrpc": "2.0", "id": id, "result": result}))
            .await
    }

    pub async fn respond_error(&mut self, id: &Value, error: RpcError) -> TetherResult<()> {
        self.send(json!({"jsonrpc": "2.0", "id": id, "error": error}))
            .await
    }

    pub async fn notify(&mut self, method: &str, params: Value) -> TetherResult<()> {
        self.send(json!({"jsonrpc": "2.0", "method": method, "params": params}))
            .await
    }

    /// Issue a reverse call to the client
    pub async fn request(&mut self, id: Value, method: &str, params: Value) -> TetherResult<()> {
        self.send(json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params}))
            .await
    }

    /// Answer the client's ping handshake
    pub async fn accept_handshake(&mut self) -> TetherResult<()> {
        let ping = self.expect_request("ping").await?;
        self.respond(
            &ping["id"],
            json!({
                "message": "pong",
                "timestamp": 0,
                "protocolVersion": SDK_PROTOCOL_VERSION,
            }),
        )
        .await
    }

    /// Answer the next `session.create` or `session.resume` with `session_id`
    pub async fn accept_session(&mut self, session_id: &str) -> TetherResult<Value> {
        let req = self.recv().await?;
        let method = req["method"].as_str().unwrap_or_default();
        if method != "session.create" && method != "session.resume" {
            return Err(TetherError::protocol(format!(
                "expected a session request, got {}",
                req
            )));
        }
        self.respond(
            &req["id"],
            json!({"sessionId": session_id, "workspacePath": format!("/tmp/{}", session_id)}),
        )
        .await?;
        Ok(req)
    }

    /// Push a session event to the client
    pub async fn emit_event(
        &mut self,
        session_id: &str,
        event_type: &str,
        data: Value,
    ) -> TetherResult<()> {
        self.notify(
            "session.event",
            json!({
                "sessionId": session_id,
                "event": {
                    "id": uuid_like(event_type),
                    "timestamp": "2026-01-01T00:00:00Z",
                    "type": event_type,
                    "data": data,
                },
            }),
        )
        .await
    }
}

fn uuid_like(event_type: &str) -> String {
    format!("evt-{}", event_type.replace('.', "-"))
}

/// Handler that records notifications and answers every request with its
/// method name
#[derive(Default)]
pub struct RecordingHandler {
    notifications: Mutex<Vec<String>>,
}

impl RecordingHandler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn notifications(&self) -> Vec<String> {
        self.notifications.lock().clone()
    }
}

impl InboundHandler for RecordingHandler {
    fn on_notification(&self, notification: RpcNotification) {
        self.notifications.lock().push(notification.method);
    }

    fn on_request(&self, request: RpcRequest, responder: Responder) {
        responder.spawn_send(Ok(Value::String(request.method)));
    }
}
