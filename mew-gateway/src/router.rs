//! Envelope delivery: directed sends go to the named recipients,
//! everything else broadcasts to the rest of the space.

use tokio::sync::mpsc::error::TrySendError;

use mew_protocol::{Envelope, ErrorCode};

use crate::connection;
use crate::error::GatewayResult;
use crate::participant::OutboundFrame;
use crate::resolver;
use crate::space::Space;

#[derive(Debug)]
pub enum RouteOutcome {
    Delivered { recipients: Vec<String> },
    /// Every name in a directed send failed to resolve (open question 1:
    /// a partially-resolved send still delivers to whoever it found,
    /// silently, and is not reported here).
    UnknownRecipients(Vec<String>),
}

pub async fn route(envelope: &Envelope, sender_runtime_id: &str, space: &Space) -> GatewayResult<RouteOutcome> {
    let targets = if let Some(names) = &envelope.to {
        let resolution = resolver::resolve(space, names);
        if resolution.fully_unresolved() {
            return Ok(RouteOutcome::UnknownRecipients(resolution.unresolved));
        }
        resolution.resolved
    } else {
        space
            .participants()
            .into_iter()
            .filter(|p| p.runtime_id != sender_runtime_id)
            .collect()
    };

    // `try_send` rather than `send().await`: a full queue must not stall
    // delivery to the rest of the broadcast. A peer that is this far
    // behind is disconnected outright instead of being waited on.
    let mut delivered = Vec::with_capacity(targets.len());
    for target in &targets {
        match target.try_send(OutboundFrame::Envelope(envelope.clone())) {
            Ok(()) => delivered.push(target.runtime_id.clone()),
            Err(TrySendError::Closed(_)) => tracing::warn!(
                recipient = %target.runtime_id,
                envelope_id = %envelope.id,
                "dropped envelope: recipient's outbound channel is closed"
            ),
            Err(TrySendError::Full(_)) => {
                tracing::warn!(
                    recipient = %target.runtime_id,
                    envelope_id = %envelope.id,
                    "disconnecting: outbound queue full"
                );
                connection::disconnect(
                    space,
                    target,
                    ErrorCode::Backpressure,
                    "outbound send queue is full".to_string(),
                )
                .await;
            }
        }
    }
    space.record_envelope_routed();
    Ok(RouteOutcome::Delivered { recipients: delivered })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::participant::Participant;
    use mew_protocol::{EnvelopeBuilder, Kind};
    use std::sync::Arc;
    use tokio::sync::mpsc;

    fn join(space: &Space, runtime_id: &str) -> mpsc::Receiver<OutboundFrame> {
        let (tx, rx) = mpsc::channel::<OutboundFrame>(8);
        space.join(Arc::new(Participant::new(runtime_id.to_string(), runtime_id.to_string(), vec![], tx)));
        rx
    }

    #[tokio::test]
    async fn broadcast_excludes_sender() {
        let space = Space::new("demo");
        let mut alice_rx = join(&space, "alice");
        let mut bob_rx = join(&space, "bob");
        let env = EnvelopeBuilder::new(Kind::Chat)
            .from("alice")
            .payload_of(&serde_json::json!({"text": "hi"}))
            .unwrap()
            .build()
            .unwrap();
        let outcome = route(&env, "alice", &space).await.unwrap();
        assert!(matches!(outcome, RouteOutcome::Delivered { recipients } if recipients == vec!["bob".to_string()]));
        assert!(alice_rx.try_recv().is_err());
        assert!(bob_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn directed_send_to_unknown_name_is_reported() {
        let space = Space::new("demo");
        let _alice_rx = join(&space, "alice");
        let env = EnvelopeBuilder::new(Kind::Chat)
            .from("alice")
            .to(["nobody"])
            .payload_of(&serde_json::json!({"text": "hi"}))
            .unwrap()
            .build()
            .unwrap();
        let outcome = route(&env, "alice", &space).await.unwrap();
        assert!(matches!(outcome, RouteOutcome::UnknownRecipients(names) if names == vec!["nobody".to_string()]));
    }

    #[tokio::test]
    async fn full_queue_disconnects_slow_peer_without_blocking_others() {
        let space = Space::new("demo");
        let (bob_tx, _bob_rx) = mpsc::channel::<OutboundFrame>(1);
        space.join(Arc::new(Participant::new("bob".to_string(), "bob".to_string(), vec![], bob_tx)));
        let mut carol_rx = join(&space, "carol");

        let chat = |text: &str| {
            EnvelopeBuilder::new(Kind::Chat)
                .from("alice")
                .payload_of(&serde_json::json!({"text": text}))
                .unwrap()
                .build()
                .unwrap()
        };

        // Fills bob's queue (capacity 1); bob never drains it.
        route(&chat("first"), "alice", &space).await.unwrap();
        // A second broadcast finds bob's queue full and must disconnect
        // him rather than await it — carol still gets delivered to.
        let outcome = route(&chat("second"), "alice", &space).await.unwrap();
        assert!(matches!(outcome, RouteOutcome::Delivered { recipients } if recipients == vec!["carol".to_string()]));
        assert!(space.resolve("bob").is_none());
        assert!(carol_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn directed_send_delivers_to_resolved_subset() {
        let space = Space::new("demo");
        let _alice_rx = join(&space, "alice");
        let mut bob_rx = join(&space, "bob");
        let env = EnvelopeBuilder::new(Kind::Chat)
            .from("alice")
            .to(["bob", "nobody"])
            .payload_of(&serde_json::json!({"text": "hi"}))
            .unwrap()
            .build()
            .unwrap();
        let outcome = route(&env, "alice", &space).await.unwrap();
        assert!(matches!(outcome, RouteOutcome::Delivered { recipients } if recipients == vec!["bob".to_string()]));
        assert!(bob_rx.try_recv().is_ok());
    }
}
