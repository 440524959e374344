//! Per-connection state machine: authenticating -> ready -> draining ->
//! closed, and the envelope dispatch pipeline that runs once a
//! connection is ready.

use std::sync::Arc;

use serde_json::json;

use mew_protocol::{Envelope, EnvelopeBuilder, ErrorCode, Kind, RawEnvelope};

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::participant::{ConnectionState, OutboundFrame, Participant};
use crate::router::{self, RouteOutcome};
use crate::space::Space;
use crate::stream_manager;
use crate::{capability_engine, resolver, validator};

/// The identity the gateway uses as `from` when it mints a `system/*`
/// envelope itself.
pub const GATEWAY_RUNTIME_ID: &str = "gateway";

/// Capability patterns as JSON, static entries plain and granted entries
/// carrying their `grant_id` so a recipient can revoke one specific
/// grant later.
pub(crate) fn capability_values(participant: &Participant) -> Vec<serde_json::Value> {
    let mut values = participant.static_capability_values();
    values.extend(participant.granted_capability_values());
    values
}

/// Broadcast a `system/presence` join/leave event for `runtime_id` to
/// every other participant in the space.
pub(crate) async fn broadcast_presence(
    space: &Space,
    runtime_id: &str,
    capabilities: Vec<serde_json::Value>,
    event: &str,
) {
    let payload = json!({
        "event": event,
        "participant": {"id": runtime_id, "capabilities": capabilities},
    });
    let Ok(presence) = EnvelopeBuilder::new(Kind::SystemPresence)
        .from(GATEWAY_RUNTIME_ID)
        .payload(payload)
        .build()
    else {
        return;
    };
    for peer in space.participants() {
        if peer.runtime_id == runtime_id {
            continue;
        }
        let _ = peer.send(OutboundFrame::Envelope(presence.clone())).await;
    }
}

/// Broadcast `stream/close` for `stream_id` to every participant still in
/// the space.
pub(crate) async fn broadcast_stream_close(space: &Space, stream_id: &str, reason: &str) {
    let Ok(close) = EnvelopeBuilder::new(Kind::StreamClose)
        .from(GATEWAY_RUNTIME_ID)
        .payload(json!({ "stream_id": stream_id, "reason": reason }))
        .build()
    else {
        return;
    };
    for peer in space.participants() {
        let _ = peer.send(OutboundFrame::Envelope(close.clone())).await;
    }
}

/// Force a participant out of the space: best-effort `system/error`,
/// then a `Close` frame, then the same teardown a normal disconnect does
/// (owned streams closed, presence `leave` broadcast). Used when a
/// participant's outbound queue is so far behind that waiting on it would
/// stall delivery to everyone else (spec'd backpressure disconnect), as
/// well as being reusable by normal connection teardown.
pub(crate) async fn disconnect(space: &Space, target: &Arc<Participant>, code: ErrorCode, message: String) {
    let capabilities = capability_values(target);
    if let Ok(error_envelope) = EnvelopeBuilder::new(Kind::SystemError)
        .from(GATEWAY_RUNTIME_ID)
        .to([target.runtime_id.clone()])
        .payload(json!({ "error": code, "message": message }))
        .build()
    {
        let _ = target.try_send(OutboundFrame::Envelope(error_envelope));
    }
    let _ = target.try_send(OutboundFrame::Close);

    let closed_streams = space.leave(&target.runtime_id);
    for stream_id in &closed_streams {
        broadcast_stream_close(space, stream_id, "owner_disconnected").await;
    }
    broadcast_presence(space, &target.runtime_id, capabilities, "leave").await;
}

/// Everything a single connection's dispatch loop needs: which space it
/// joined, its own participant handle, and the space-wide configuration.
pub struct ConnectionContext {
    pub space: Arc<Space>,
    pub participant: Arc<Participant>,
    pub config: Arc<GatewayConfig>,
}

impl ConnectionContext {
    /// Handle one inbound text frame: parse, validate, authorize, apply
    /// kind-specific side effects, then route.
    pub async fn handle_text(&self, text: &str) {
        if self.participant.state() != ConnectionState::Ready {
            tracing::debug!(participant = %self.participant.runtime_id, "dropping frame from non-ready connection");
            return;
        }
        let raw: RawEnvelope = match serde_json::from_str(text) {
            Ok(raw) => raw,
            Err(e) => {
                self.send_error(ErrorCode::InvalidEnvelope, e.to_string(), None).await;
                return;
            }
        };
        self.handle_raw(raw).await;
    }

    /// Handle one already-parsed inbound envelope. `handle_text` is a
    /// thin JSON-decoding wrapper around this; HTTP injection (which
    /// already holds a `Value`) calls it directly. Returns the envelope's
    /// id once it has been validated (so HTTP injection can echo it
    /// back), or `None` if validation itself failed.
    pub async fn handle_raw(&self, raw: RawEnvelope) -> Option<String> {
        let (envelope, _classification) = match validator::validate(raw, &self.participant.runtime_id) {
            Ok(v) => v,
            Err(e) => {
                let mut extra = serde_json::Map::new();
                if let GatewayError::Envelope(mew_protocol::EnvelopeError::ReservedNamespace(kind)) = &e {
                    extra.insert("attempted_kind".to_string(), json!(kind));
                }
                self.send_error_with_extra(e.code(), e.to_string(), None, extra).await;
                return None;
            }
        };
        let id = envelope.id.clone();
        self.dispatch(envelope).await;
        Some(id)
    }

    /// Handle one inbound binary frame (`#<stream_id>#<bytes>`): relay it,
    /// unwrapped, to every other participant in the space.
    pub async fn handle_binary(&self, data: &[u8]) {
        let (stream_id, bytes) = match stream_manager::parse_frame(data) {
            Ok(v) => v,
            Err(e) => {
                self.send_error(e.code(), e.to_string(), None).await;
                return;
            }
        };
        if !stream_manager::exists(&self.space, stream_id) {
            self.send_error(ErrorCode::StreamNotFound, format!("unknown stream: {stream_id}"), None)
                .await;
            return;
        }
        for peer in self.space.participants() {
            if peer.runtime_id == self.participant.runtime_id {
                continue;
            }
            let _ = peer
                .send(OutboundFrame::Stream {
                    stream_id: stream_id.to_string(),
                    bytes: bytes.to_vec(),
                })
                .await;
        }
    }

    async fn dispatch(&self, mut envelope: Envelope) {
        if self.participant.is_paused() {
            tracing::debug!(participant = %self.participant.runtime_id, "dropping envelope from paused participant");
            return;
        }

        if let Err(e) = capability_engine::check(&envelope, &self.participant) {
            let mut extra = serde_json::Map::new();
            if matches!(e, GatewayError::CapabilityViolation { .. }) {
                extra.insert("attempted_kind".to_string(), json!(envelope.kind.as_str()));
                extra.insert("your_capabilities".to_string(), json!(capability_values(&self.participant)));
                self.space.record_capability_violation();
            }
            self.send_error_with_extra(e.code(), e.to_string(), Some(envelope.id.clone()), extra).await;
            return;
        }

        // Any envelope referencing an earlier proposal (fulfillment,
        // rejection, or withdrawal) frees that proposer's pending slot,
        // regardless of this envelope's own kind.
        if let Some(correlated) = &envelope.correlation_id {
            for id in correlated {
                self.space.resolve_proposal(id);
            }
        }

        let mut welcome_refresh: Vec<Arc<Participant>> = Vec::new();
        let mut stream_open_reply: Option<Envelope> = None;
        match envelope.kind {
            Kind::McpProposal => {
                if !self.space.track_proposal(
                    envelope.id.clone(),
                    self.participant.runtime_id.clone(),
                    self.config.max_pending_proposals,
                ) {
                    self.send_error(
                        ErrorCode::Backpressure,
                        format!(
                            "too many pending proposals ({} max)",
                            self.config.max_pending_proposals
                        ),
                        Some(envelope.id.clone()),
                    )
                    .await;
                    return;
                }
            }
            Kind::CapabilityGrant | Kind::CapabilityRevoke => match self.apply_capability_mutation(&envelope).await {
                Some(recipients) => welcome_refresh = recipients,
                None => return,
            },
            Kind::StreamRequest => {
                let request = match mew_protocol::Payload::parse(Kind::StreamRequest, &envelope.payload) {
                    Ok(mew_protocol::Payload::StreamRequest(p)) => p,
                    Ok(_) => unreachable!("checked by Payload::parse(Kind::StreamRequest, ..)"),
                    Err(e) => {
                        self.send_error(e.code(), e.to_string(), Some(envelope.id.clone())).await;
                        return;
                    }
                };
                match stream_manager::open(
                    &self.space,
                    &self.participant.runtime_id,
                    self.config.max_streams_per_participant,
                    &request,
                ) {
                    Ok(stream_id) => {
                        stream_open_reply = EnvelopeBuilder::new(Kind::StreamOpen)
                            .from(GATEWAY_RUNTIME_ID)
                            .to([self.participant.runtime_id.clone()])
                            .correlation_id([envelope.id.clone()])
                            .payload(json!({ "stream_id": stream_id }))
                            .build()
                            .ok();
                    }
                    Err(e) => {
                        self.send_error(e.code(), e.to_string(), Some(envelope.id.clone())).await;
                        return;
                    }
                }
            }
            Kind::StreamClose => {
                if let Some(stream_id) = envelope.payload.get("stream_id").and_then(|v| v.as_str()) {
                    if let Err(e) = stream_manager::close(&self.space, stream_id) {
                        self.send_error(e.code(), e.to_string(), Some(envelope.id.clone())).await;
                        return;
                    }
                }
            }
            Kind::ParticipantPause | Kind::ParticipantResume => {
                if self.apply_participant_pause(&envelope).await.is_none() {
                    return;
                }
            }
            _ => {}
        }

        self.route(envelope).await;

        // The refreshed `system/welcome` goes out only after the grant/
        // revoke envelope above has been routed: a recipient must observe
        // the grant before the welcome describing its effects, not after.
        for recipient in &welcome_refresh {
            self.send_welcome(recipient).await;
        }

        // The `stream/open` reply is addressed directly to the requester,
        // not broadcast: it answers one `stream/request`, it isn't a
        // space-wide event.
        if let Some(reply) = stream_open_reply {
            let _ = self.participant.send(OutboundFrame::Envelope(reply)).await;
        }
    }

    /// Apply the capability grant/revoke to every resolved recipient in
    /// `to`. Returns the resolved recipients (so the caller can refresh
    /// their `system/welcome` once the grant/revoke itself has been
    /// routed), or `None` (having already sent a `system/error`) if any
    /// recipient's mutation failed.
    async fn apply_capability_mutation(&self, envelope: &Envelope) -> Option<Vec<Arc<Participant>>> {
        let Some(names) = &envelope.to else {
            self.send_error(
                ErrorCode::InvalidEnvelope,
                format!("{} must be directed via `to`", envelope.kind),
                Some(envelope.id.clone()),
            )
            .await;
            return None;
        };
        let resolution = resolver::resolve(&self.space, names);
        for recipient in &resolution.resolved {
            let result = if envelope.kind == Kind::CapabilityGrant {
                capability_engine::apply_grant(envelope, &self.participant, recipient, self.config.max_capability_list_len)
                    .map(|_| ())
            } else {
                capability_engine::apply_revoke(envelope, &self.participant, recipient, self.config.max_capability_list_len)
                    .map(|_| ())
            };
            if let Err(e) = result {
                self.send_error(e.code(), e.to_string(), Some(envelope.id.clone())).await;
                return None;
            }
        }
        Some(resolution.resolved)
    }

    /// Halt or resume outbound emission from every resolved recipient in
    /// `to`. The pause/resume envelope itself is still routed to its
    /// target afterward, same as any other directed send — this only
    /// applies the side effect on top.
    async fn apply_participant_pause(&self, envelope: &Envelope) -> Option<()> {
        let Some(names) = &envelope.to else {
            self.send_error(
                ErrorCode::InvalidEnvelope,
                format!("{} must be directed via `to`", envelope.kind),
                Some(envelope.id.clone()),
            )
            .await;
            return None;
        };
        let resolution = resolver::resolve(&self.space, names);
        if envelope.kind == Kind::ParticipantResume {
            for recipient in &resolution.resolved {
                recipient.resume();
            }
            return Some(());
        }
        let timeout = match mew_protocol::Payload::parse(Kind::ParticipantPause, &envelope.payload) {
            Ok(mew_protocol::Payload::ParticipantPause(p)) => p.timeout_seconds.map(std::time::Duration::from_secs),
            Ok(_) => unreachable!("checked by Payload::parse(Kind::ParticipantPause, ..)"),
            Err(e) => {
                self.send_error(e.code(), e.to_string(), Some(envelope.id.clone())).await;
                return None;
            }
        };
        for recipient in &resolution.resolved {
            recipient.pause(timeout);
        }
        Some(())
    }

    /// Send `recipient` a `system/welcome` describing its own current
    /// capabilities and the space's other participants. Used both on
    /// initial connect and to refresh a participant after a capability
    /// mutation.
    pub async fn send_welcome(&self, recipient: &Arc<Participant>) {
        let others: Vec<_> = self
            .space
            .participants()
            .iter()
            .filter(|p| p.runtime_id != recipient.runtime_id)
            .map(|p| json!({"id": p.runtime_id, "capabilities": capability_values(p)}))
            .collect();
        let active_streams: Vec<_> = self
            .space
            .active_streams()
            .into_iter()
            .map(|s| {
                let mut entry = json!({
                    "stream_id": s.stream_id,
                    "owner": s.owner,
                    "direction": s.direction,
                    "created": s.created,
                    "content_type": s.content_type,
                    "format": s.format,
                    "description": s.description,
                });
                if let Some(obj) = entry.as_object_mut() {
                    obj.extend(s.extra);
                }
                entry
            })
            .collect();
        let payload = json!({
            "you": {"id": recipient.runtime_id, "capabilities": capability_values(recipient)},
            "participants": others,
            "active_streams": active_streams,
        });
        let Ok(welcome) = EnvelopeBuilder::new(Kind::SystemWelcome)
            .from(GATEWAY_RUNTIME_ID)
            .to([recipient.runtime_id.clone()])
            .payload(payload)
            .build()
        else {
            tracing::error!("failed to build system/welcome envelope, this is a bug");
            return;
        };
        let _ = recipient.send(OutboundFrame::Envelope(welcome)).await;
    }

    async fn route(&self, envelope: Envelope) {
        match router::route(&envelope, &self.participant.runtime_id, &self.space).await {
            Ok(RouteOutcome::Delivered { .. }) => {}
            Ok(RouteOutcome::UnknownRecipients(names)) => {
                self.send_error(
                    ErrorCode::UnknownRecipient,
                    format!("no connected participant matches {names:?}"),
                    Some(envelope.id.clone()),
                )
                .await;
            }
            Err(e) => {
                self.send_error(e.code(), e.to_string(), Some(envelope.id.clone())).await;
            }
        }
    }

    /// Mint and deliver a `system/error` straight to this connection's
    /// own outbound queue (never routed, since `system/*` is reserved).
    pub async fn send_error(&self, code: ErrorCode, message: String, related_id: Option<String>) {
        self.send_error_with_extra(code, message, related_id, serde_json::Map::new()).await;
    }

    /// As [`Self::send_error`], with extra fields merged into the
    /// payload (e.g. `attempted_kind`, `your_capabilities`).
    pub async fn send_error_with_extra(
        &self,
        code: ErrorCode,
        message: String,
        related_id: Option<String>,
        extra: serde_json::Map<String, serde_json::Value>,
    ) {
        let mut payload = json!({ "error": code, "message": message });
        if let Some(id) = related_id {
            payload["related_id"] = json!(id);
        }
        if let Some(obj) = payload.as_object_mut() {
            obj.extend(extra);
        }
        let Ok(error_envelope) = EnvelopeBuilder::new(Kind::SystemError)
            .from(GATEWAY_RUNTIME_ID)
            .to([self.participant.runtime_id.clone()])
            .payload(payload)
            .build()
        else {
            tracing::error!("failed to build system/error envelope, this is a bug");
            return;
        };
        if self
            .participant
            .send(OutboundFrame::Envelope(error_envelope))
            .await
            .is_err()
        {
            tracing::debug!(participant = %self.participant.runtime_id, "could not deliver system/error, connection already gone");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;
    use tokio::sync::mpsc;

    fn ctx_with(caps: Vec<serde_json::Value>) -> (ConnectionContext, mpsc::Receiver<OutboundFrame>) {
        let (tx, rx) = mpsc::channel(8);
        let participant = Arc::new(Participant::new("r1".to_string(), "alice".to_string(), caps, tx));
        participant.set_state(ConnectionState::Ready);
        let space = Arc::new(Space::new("demo"));
        space.join(Arc::clone(&participant));
        let config = Arc::new(GatewayConfig::builder().build());
        (ConnectionContext { space, participant, config }, rx)
    }

    #[tokio::test]
    async fn unknown_kind_produces_system_error() {
        let (ctx, mut rx) = ctx_with(vec![]);
        ctx.handle_text(r#"{"protocol":"mew/v0.4","kind":"not/a/kind","payload":{}}"#).await;
        let frame = rx.try_recv().unwrap();
        match frame {
            OutboundFrame::Envelope(e) => assert_eq!(e.kind, Kind::SystemError),
            _ => panic!("expected envelope frame"),
        }
    }

    #[tokio::test]
    async fn capability_violation_yields_system_error_with_related_id() {
        let (ctx, mut rx) = ctx_with(vec![json!({"kind": "chat"})]);
        ctx.handle_text(r#"{"protocol":"mew/v0.4","kind":"mcp/request","payload":{"method":"tools/call"}}"#)
            .await;
        match rx.try_recv().unwrap() {
            OutboundFrame::Envelope(e) => {
                assert_eq!(e.kind, Kind::SystemError);
                assert_eq!(e.payload["error"], json!("capability_violation"));
            }
            _ => panic!("expected envelope frame"),
        }
    }

    #[tokio::test]
    async fn frames_from_non_ready_connections_are_dropped() {
        let (ctx, mut rx) = ctx_with(vec![]);
        ctx.participant.set_state(ConnectionState::Authenticating);
        ctx.handle_text(r#"{"protocol":"mew/v0.4","kind":"chat","payload":{"text":"hi"}}"#).await;
        assert!(rx.try_recv().is_err());
    }
}
