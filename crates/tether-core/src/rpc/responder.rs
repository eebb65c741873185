//! Reply channel for inbound requests

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::protocol::{RequestId, RpcError, RpcMessage, RpcResponse};
use crate::transport::FrameSink;

/// Writes exactly one response for one inbound request.
///
/// Consumed by every reply method, so a request cannot be answered twice.
pub struct Responder {
    id: RequestId,
    method: String,
    sink: Arc<FrameSink>,
}

impl Responder {
    pub(crate) fn new(id: RequestId, method: String, sink: Arc<FrameSink>) -> Self {
        Self { id, method, sink }
    }

    pub fn id(&self) -> &RequestId {
        &self.id
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    /// Reply with a result.
    pub async fn ok(self, result: Value) {
        self.send(Ok(result)).await
    }

    /// Reply with an error.
    pub async fn err(self, error: RpcError) {
        self.send(Err(error)).await
    }

    /// Reply with either outcome. Write failures are logged; there is
    /// nobody left to report them to.
    pub async fn send(self, outcome: Result<Value, RpcError>) {
        let response = match outcome {
            Ok(result) => RpcResponse::success(self.id.clone(), result),
            Err(error) => {
                debug!(
                    "replying to {} ({}) with error {}",
                    self.method, self.id, error
                );
                RpcResponse::error(self.id.clone(), error)
            }
        };
        if let Err(e) = self.sink.send(&RpcMessage::Response(response)).await {
            warn!(
                "failed to write response to {} ({}): {}",
                self.method, self.id, e
            );
        }
    }

    /// Reply from a spawned task so the caller never waits on the write.
    pub fn spawn_send(self, outcome: Result<Value, RpcError>) {
        tokio::spawn(self.send(outcome));
    }
}
