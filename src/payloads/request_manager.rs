//! Correlation of outbound requests with inbound responses.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::task::{Context, Poll};

use tokio::sync::oneshot;
use uuid::Uuid;

use crate::error::{Result, StreamingError};
use crate::response::ReceiveResponse;

type ResponseSender = oneshot::Sender<Result<ReceiveResponse>>;

/// Pending requests keyed by request ID.
#[derive(Default)]
pub struct RequestManager {
    pending: Mutex<HashMap<Uuid, ResponseSender>>,
}

impl RequestManager {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn pending(&self) -> MutexGuard<'_, HashMap<Uuid, ResponseSender>> {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Number of requests awaiting a response.
    pub fn pending_count(&self) -> usize {
        self.pending().len()
    }

    /// Register interest in the response to `id`.
    ///
    /// Fails with [`StreamingError::DuplicateRequestId`] if `id` is already
    /// pending; the existing registration is left untouched.
    pub fn register(self: &Arc<Self>, id: Uuid) -> Result<PendingResponse> {
        let mut pending = self.pending();
        if pending.contains_key(&id) {
            return Err(StreamingError::DuplicateRequestId(id));
        }

        let (tx, rx) = oneshot::channel();
        pending.insert(id, tx);

        Ok(PendingResponse {
            id,
            rx,
            manager: Arc::downgrade(self),
        })
    }

    /// Wait for the response to `id`.
    pub async fn get_response(self: &Arc<Self>, id: Uuid) -> Result<ReceiveResponse> {
        self.register(id)?.await
    }

    /// Resolve the pending request `id`.
    ///
    /// Returns `false` if nothing is waiting for it (already resolved,
    /// abandoned, or never sent).
    pub fn signal_response(&self, id: Uuid, response: ReceiveResponse) -> bool {
        match self.pending().remove(&id) {
            Some(tx) => tx.send(Ok(response)).is_ok(),
            None => false,
        }
    }

    /// Fail every pending request with `reason`.
    pub fn reject_all(&self, reason: &str) {
        let pending: Vec<ResponseSender> = self.pending().drain().map(|(_, tx)| tx).collect();

        if !pending.is_empty() {
            tracing::debug!("Rejecting {} pending requests: {}", pending.len(), reason);
        }
        for tx in pending {
            let _ = tx.send(Err(StreamingError::Disconnected(reason.to_string())));
        }
    }
}

/// Future resolving to the response for one request.
///
/// Dropping it before completion deregisters the request.
pub struct PendingResponse {
    id: Uuid,
    rx: oneshot::Receiver<Result<ReceiveResponse>>,
    manager: Weak<RequestManager>,
}

impl PendingResponse {
    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl Future for PendingResponse {
    type Output = Result<ReceiveResponse>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|result| match result {
            Ok(response) => response,
            Err(_) => Err(StreamingError::Disconnected(
                "Request manager was dropped".to_string(),
            )),
        })
    }
}

impl Drop for PendingResponse {
    fn drop(&mut self) {
        self.rx.close();

        let Some(manager) = self.manager.upgrade() else {
            return;
        };
        let mut pending = manager.pending();
        // Only remove our own registration; the ID may have been reused.
        if pending.get(&self.id).is_some_and(|tx| tx.is_closed()) {
            pending.remove(&self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status_code: u16) -> ReceiveResponse {
        ReceiveResponse {
            status_code,
            streams: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_signal_resolves_pending() {
        let manager = RequestManager::new();
        let id = Uuid::new_v4();

        let pending = manager.register(id).unwrap();
        assert!(manager.signal_response(id, response(200)));

        assert_eq!(pending.await.unwrap().status_code, 200);
        assert_eq!(manager.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_id_rejected_without_affecting_first() {
        let manager = RequestManager::new();
        let id = Uuid::new_v4();

        let first = manager.register(id).unwrap();
        let err = manager.get_response(id).await.unwrap_err();
        assert!(matches!(err, StreamingError::DuplicateRequestId(d) if d == id));

        assert!(manager.signal_response(id, response(201)));
        assert_eq!(first.await.unwrap().status_code, 201);
    }

    #[test]
    fn test_unmatched_response_is_ignored() {
        let manager = RequestManager::new();
        assert!(!manager.signal_response(Uuid::new_v4(), response(200)));
    }

    #[tokio::test]
    async fn test_reject_all() {
        let manager = RequestManager::new();
        let a = manager.register(Uuid::new_v4()).unwrap();
        let b = manager.register(Uuid::new_v4()).unwrap();

        manager.reject_all("Disconnect was called.");

        for pending in [a, b] {
            match pending.await {
                Err(StreamingError::Disconnected(reason)) => assert_eq!(reason, "Disconnect was called."),
                other => panic!("unexpected result: {:?}", other.map(|r| r.status_code)),
            }
        }
        assert_eq!(manager.pending_count(), 0);
    }

    #[test]
    fn test_drop_deregisters() {
        let manager = RequestManager::new();
        let id = Uuid::new_v4();

        let pending = manager.register(id).unwrap();
        assert_eq!(manager.pending_count(), 1);
        drop(pending);

        assert_eq!(manager.pending_count(), 0);
        assert!(manager.register(id).is_ok());
    }
}
