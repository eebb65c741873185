//! Pending outbound requests

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::oneshot;

use crate::error::{TetherError, TetherResult};

type ResponseSender = oneshot::Sender<TetherResult<Value>>;

/// Table of requests awaiting a response, keyed by request id.
///
/// Removing an entry is the only way to complete it, so each entry is
/// resolved, rejected or cancelled at most once.
#[derive(Default)]
pub struct PendingRequests {
    entries: DashMap<u64, ResponseSender>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `id` and return the handle its caller awaits.
    pub fn register(&self, id: u64) -> ResponseHandle {
        let (tx, rx) = oneshot::channel();
        self.entries.insert(id, tx);
        ResponseHandle { id, rx }
    }

    /// Complete `id` with `outcome`. Returns false when the id is unknown.
    pub fn complete(&self, id: u64, outcome: TetherResult<Value>) -> bool {
        match self.entries.remove(&id) {
            Some((_, tx)) => {
                // The caller may have stopped waiting; that is fine
                let _ = tx.send(outcome);
                true
            }
            None => false,
        }
    }

    /// Forget `id` without completing it.
    pub fn cancel(&self, id: u64) {
        self.entries.remove(&id);
    }

    /// Reject every pending entry with `err`. Returns how many were rejected.
    pub fn drain(&self, err: &TetherError) -> usize {
        let ids: Vec<u64> = self.entries.iter().map(|entry| *entry.key()).collect();
        let mut rejected = 0;
        for id in ids {
            if self.complete(id, Err(err.clone())) {
                rejected += 1;
            }
        }
        rejected
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: u64) -> bool {
        self.entries.contains_key(&id)
    }
}

/// Result handle for an outbound request.
///
/// Resolves with the response's `result`, the mapped JSON-RPC error, or
/// `ConnectionClosed` if the connection goes away first. Dropping the handle
/// does not cancel the request on the remote side.
#[derive(Debug)]
pub struct ResponseHandle {
    id: u64,
    rx: oneshot::Receiver<TetherResult<Value>>,
}

impl ResponseHandle {
    /// Id assigned to the request
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Future for ResponseHandle {
    type Output = TetherResult<Value>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            Poll::Ready(Err(_)) => Poll::Ready(Err(TetherError::ConnectionClosed)),
            Poll::Pending => Poll::Pending,
        }
    }
}
