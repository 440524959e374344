//! Correlates outbound `mcp/request`s (and proposals) with their
//! eventual `mcp/response`: a pending-request map holding one `oneshot`
//! per in-flight id, looked up by `correlation_id` when a response
//! arrives. Also the seam the reconnecting transport uses to settle or
//! reissue requests that were in flight when the connection dropped.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::oneshot;

use mew_protocol::Envelope;

use crate::error::{ClientError, ClientResult};

/// What a pending request's `oneshot` eventually carries: the matching
/// response, or notice that the connection it was sent on is gone.
enum PendingOutcome {
    Response(Envelope),
    Disconnected,
}

struct Tracked {
    tx: oneshot::Sender<PendingOutcome>,
    envelope: Envelope,
    deadline: Instant,
}

pub struct Correlator {
    pending: Mutex<HashMap<String, Tracked>>,
    max_pending: usize,
}

impl Correlator {
    pub fn new(max_pending: usize) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            max_pending,
        }
    }

    /// Register interest in a response to `envelope.id`. Fails if the
    /// pending-request table is already at its configured capacity.
    fn register(&self, envelope: Envelope, timeout: Duration) -> ClientResult<oneshot::Receiver<PendingOutcome>> {
        let mut pending = self.pending.lock();
        if pending.len() >= self.max_pending {
            return Err(ClientError::Disconnected);
        }
        let (tx, rx) = oneshot::channel();
        let deadline = Instant::now() + timeout;
        pending.insert(envelope.id.clone(), Tracked { tx, envelope, deadline });
        Ok(rx)
    }

    /// Await the response to `envelope`, sending `send` to dispatch the
    /// request only after registration succeeds (so a response that
    /// races the send is never missed). On deadline, `on_timeout` is
    /// awaited before the timeout error is returned — callers use it to
    /// emit a best-effort `notifications/cancelled` toward the request's
    /// target. If the connection drops mid-flight, [`Self::handle_disconnect`]
    /// either reissues this same envelope or settles it early.
    pub async fn wait_for<F, Fut, C, CFut>(
        &self,
        envelope: Envelope,
        method: &str,
        timeout: Duration,
        send: F,
        on_timeout: C,
    ) -> ClientResult<Envelope>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = ClientResult<()>>,
        C: FnOnce() -> CFut,
        CFut: std::future::Future<Output = ()>,
    {
        let request_id = envelope.id.clone();
        let rx = self.register(envelope, timeout)?;
        if let Err(e) = send().await {
            self.pending.lock().remove(&request_id);
            return Err(e);
        }
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(PendingOutcome::Response(envelope))) => Ok(envelope),
            Ok(Ok(PendingOutcome::Disconnected)) => Err(ClientError::Disconnected),
            Ok(Err(_)) => Err(ClientError::Cancelled),
            Err(_) => {
                self.pending.lock().remove(&request_id);
                on_timeout().await;
                Err(ClientError::Timeout { method: method.to_string() })
            }
        }
    }

    /// Complete a pending request with the response envelope that
    /// correlates to it. Returns `false` if nothing was waiting (the
    /// caller already timed out, or this id was never ours).
    pub fn complete(&self, request_id: &str, envelope: Envelope) -> bool {
        if let Some(tracked) = self.pending.lock().remove(request_id) {
            let _ = tracked.tx.send(PendingOutcome::Response(envelope));
            true
        } else {
            false
        }
    }

    /// Drop every pending request, e.g. on final shutdown — the
    /// `oneshot::Sender` being dropped resolves the waiter's
    /// `Err(Cancelled)`.
    pub fn cancel_all(&self) {
        self.pending.lock().clear();
    }

    /// Called once per reconnect cycle when the transport drops: requests
    /// whose deadline has already passed are rejected immediately with a
    /// connection-closed error rather than left to time out on their own;
    /// the rest are left registered (their `wait_for` is still awaiting
    /// the same `oneshot`) and their envelopes are returned so the caller
    /// can resend them once a new connection is up.
    pub fn handle_disconnect(&self) -> Vec<Envelope> {
        let now = Instant::now();
        let mut pending = self.pending.lock();
        let expired: Vec<String> = pending
            .iter()
            .filter(|(_, tracked)| tracked.deadline <= now)
            .map(|(id, _)| id.clone())
            .collect();
        for id in expired {
            if let Some(tracked) = pending.remove(&id) {
                let _ = tracked.tx.send(PendingOutcome::Disconnected);
            }
        }
        pending.values().map(|tracked| tracked.envelope.clone()).collect()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}
