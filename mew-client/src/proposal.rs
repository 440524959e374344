//! Proposal fulfillment tracking: proposal -> fulfillment -> response,
//! chained via `correlation_id`.
//!
//! The gateway does not enforce a proposal TTL — `expires_after` here is
//! a purely client-local convenience so a caller can give up on a stale
//! proposal rather than waiting forever.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::oneshot;

use mew_protocol::{Envelope, Kind};

/// How another participant responded to a proposal this client made.
#[derive(Debug, Clone)]
pub enum ProposalOutcome {
    /// Someone acted on it: the `mcp/request` (or similar) that fulfills it.
    Fulfilled(Envelope),
    Rejected(Envelope),
    Withdrawn,
}

struct Tracked {
    tx: oneshot::Sender<ProposalOutcome>,
    created_at: Instant,
    expires_after: Option<Duration>,
}

#[derive(Default)]
pub struct ProposalTracker {
    pending: Mutex<HashMap<String, Tracked>>,
}

impl ProposalTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&self, proposal_id: String, expires_after: Option<Duration>) -> oneshot::Receiver<ProposalOutcome> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(
            proposal_id,
            Tracked {
                tx,
                created_at: Instant::now(),
                expires_after,
            },
        );
        rx
    }

    pub fn is_expired(&self, proposal_id: &str) -> bool {
        self.pending
            .lock()
            .get(proposal_id)
            .is_some_and(|t| t.expires_after.is_some_and(|ttl| t.created_at.elapsed() > ttl))
    }

    /// Feed every inbound envelope through this: if its `correlation_id`
    /// names a tracked proposal and its kind settles that proposal's
    /// fate, the matching waiter is resolved.
    pub fn observe(&self, envelope: &Envelope) {
        let Some(proposal_id) = envelope.first_correlation() else {
            return;
        };
        let outcome = match envelope.kind {
            Kind::McpRequest => ProposalOutcome::Fulfilled(envelope.clone()),
            Kind::McpReject => ProposalOutcome::Rejected(envelope.clone()),
            Kind::McpWithdraw => ProposalOutcome::Withdrawn,
            _ => return,
        };
        if let Some(tracked) = self.pending.lock().remove(proposal_id) {
            let _ = tracked.tx.send(outcome);
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mew_protocol::EnvelopeBuilder;

    fn envelope(kind: Kind, correlation_id: &str) -> Envelope {
        EnvelopeBuilder::new(kind)
            .from("bob")
            .correlation_id([correlation_id])
            .payload(serde_json::json!({"method": "tools/call", "params": {}}))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn fulfillment_resolves_the_waiter() {
        let tracker = ProposalTracker::new();
        let rx = tracker.track("proposal-1".to_string(), None);
        tracker.observe(&envelope(Kind::McpRequest, "proposal-1"));
        assert!(matches!(rx.await.unwrap(), ProposalOutcome::Fulfilled(_)));
    }

    #[tokio::test]
    async fn rejection_resolves_as_rejected() {
        let tracker = ProposalTracker::new();
        let rx = tracker.track("proposal-1".to_string(), None);
        tracker.observe(&envelope(Kind::McpReject, "proposal-1"));
        assert!(matches!(rx.await.unwrap(), ProposalOutcome::Rejected(_)));
    }

    #[test]
    fn expires_after_is_client_local_only() {
        let tracker = ProposalTracker::new();
        let _rx = tracker.track("proposal-1".to_string(), Some(Duration::from_millis(1)));
        std::thread::sleep(Duration::from_millis(5));
        assert!(tracker.is_expired("proposal-1"));
        assert_eq!(tracker.pending_count(), 1); // not auto-removed; caller decides
    }
}
