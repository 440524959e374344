//! Top-level participant runtime: the object an embedding application
//! actually holds. Wires the reconnecting transport, the request
//! correlator, the proposal tracker, and the event bus into one handle.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde_json::Value;

use mew_protocol::{Context, Envelope, EnvelopeBuilder, Kind, Payload};

use crate::config::ClientConfig;
use crate::connection::{self, Connection, Inbound};
use crate::correlator::Correlator;
use crate::error::{ClientError, ClientResult};
use crate::events::{EventBus, Subscription};
use crate::proposal::{ProposalOutcome, ProposalTracker};
use crate::reasoning::ReasoningSession;

/// A connected (or reconnecting) participant. Cheap to clone — everything
/// behind it is `Arc`-shared, so handing a `Client` to multiple tasks is
/// the normal way to use one.
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

struct Inner {
    config: ClientConfig,
    connection: Connection,
    correlator: Correlator,
    proposals: ProposalTracker,
    events: EventBus,
    self_id: RwLock<String>,
    request_seq: AtomicU64,
}

impl Client {
    /// Start connecting in the background. Returns immediately; use
    /// [`Client::wait_ready`] if the caller needs to block until the
    /// gateway's `system/welcome` has been observed.
    pub fn connect(config: ClientConfig) -> Self {
        let correlator = Correlator::new(config.max_pending_requests);
        let proposals = ProposalTracker::new();
        let events = EventBus::new();
        let self_id = RwLock::new(String::from("pending"));

        let inner = Arc::new_cyclic(|weak: &std::sync::Weak<Inner>| {
            let dispatch_weak = weak.clone();
            let disconnect_weak = weak.clone();
            let connection = connection::spawn(
                config.clone(),
                move |inbound| {
                    if let Some(inner) = dispatch_weak.upgrade() {
                        Inner::handle_inbound(&inner, inbound);
                    }
                },
                move || {
                    if let Some(inner) = disconnect_weak.upgrade() {
                        Inner::handle_disconnect(&inner);
                    }
                },
            );
            Inner {
                config,
                connection,
                correlator,
                proposals,
                events,
                self_id,
                request_seq: AtomicU64::new(0),
            }
        });

        Self { inner }
    }

    pub fn state(&self) -> connection::ConnectionState {
        self.inner.connection.state()
    }

    /// This participant's gateway-assigned runtime id, once known (set by
    /// the `system/welcome` envelope the gateway sends on join).
    pub fn runtime_id(&self) -> String {
        self.inner.self_id.read().clone()
    }

    fn next_request_id(&self) -> String {
        let n = self.inner.request_seq.fetch_add(1, Ordering::Relaxed);
        format!("{}-{n}", self.inner.config.space)
    }

    async fn send(&self, envelope: &Envelope) -> ClientResult<()> {
        self.inner.connection.send(envelope).await
    }

    /// Best-effort `notifications/cancelled` emitted toward `target` when
    /// a request's deadline elapses with no response; failures to send it
    /// are swallowed since the caller is already on its way to returning
    /// a timeout error.
    async fn notify_cancelled(&self, target: &str, request_id: &str) {
        let Ok(notice) = EnvelopeBuilder::new(Kind::McpRequest)
            .from(self.runtime_id())
            .to([target])
            .correlation_id([request_id])
            .payload(serde_json::json!({
                "method": "notifications/cancelled",
                "params": {"requestId": request_id, "reason": "timeout"},
            }))
            .build()
        else {
            return;
        };
        if let Err(e) = self.send(&notice).await {
            tracing::debug!(error = %e, request_id, "failed to send notifications/cancelled");
        }
    }

    /// Send an `mcp/request` addressed to `target` and await its
    /// correlated `mcp/response`. On timeout, a best-effort
    /// `notifications/cancelled` is emitted toward `target` before the
    /// timeout error is returned.
    pub async fn request(&self, target: &str, method: &str, params: Value) -> ClientResult<Envelope> {
        let id = self.next_request_id();
        let envelope = EnvelopeBuilder::new(Kind::McpRequest)
            .id(id.clone())
            .from(self.runtime_id())
            .to([target])
            .payload(serde_json::json!({"method": method, "params": params}))
            .build()?;
        let timeout = self.inner.config.request_timeout;
        let correlator = &self.inner.correlator;
        let sent = envelope.clone();
        let target = target.to_string();
        let timeout_id = id;
        correlator
            .wait_for(
                envelope,
                method,
                timeout,
                || async move { self.send(&sent).await },
                move || async move { self.notify_cancelled(&target, &timeout_id).await },
            )
            .await
    }

    /// Broadcast a `chat` message to the space.
    pub async fn chat(&self, text: impl Into<String>) -> ClientResult<()> {
        let envelope = EnvelopeBuilder::new(Kind::Chat)
            .from(self.runtime_id())
            .payload(serde_json::json!({"text": text.into()}))
            .build()?;
        self.send(&envelope).await
    }

    /// Propose an action another participant may fulfill, reject, or
    /// withdraw — chained to its eventual fulfillment via
    /// `correlation_id`. Returns the proposal's envelope id and a
    /// receiver for its eventual [`ProposalOutcome`]; `expires_after` is
    /// purely a client-local convenience (see `proposal.rs`).
    pub async fn propose(
        &self,
        method: &str,
        params: Value,
        expires_after: Option<Duration>,
    ) -> ClientResult<(String, tokio::sync::oneshot::Receiver<ProposalOutcome>)> {
        let id = self.next_request_id();
        let envelope = EnvelopeBuilder::new(Kind::McpProposal)
            .id(id.clone())
            .from(self.runtime_id())
            .payload(serde_json::json!({"method": method, "params": params}))
            .build()?;
        let rx = self.inner.proposals.track(id.clone(), expires_after);
        self.send(&envelope).await?;
        Ok((id, rx))
    }

    /// Fulfill someone else's proposal: builds the `mcp/request` it asked
    /// for from the proposal's own method/params, addressed to the same
    /// target the proposal named, correlated back to the proposal id.
    pub async fn fulfill(&self, proposal: &Envelope) -> ClientResult<Envelope> {
        let target = proposal
            .to
            .as_ref()
            .and_then(|to| to.first())
            .cloned()
            .ok_or_else(|| ClientError::ProposalMissingTarget {
                proposal_id: proposal.id.clone(),
            })?;
        let payload = match Payload::parse(Kind::McpProposal, &proposal.payload)? {
            Payload::McpProposal(p) => p,
            _ => unreachable!("checked by Payload::parse(Kind::McpProposal, ..)"),
        };
        let id = self.next_request_id();
        let envelope = EnvelopeBuilder::new(Kind::McpRequest)
            .id(id.clone())
            .from(self.runtime_id())
            .to([target.clone()])
            .correlation_id([proposal.id.clone()])
            .payload(serde_json::json!({"method": payload.method, "params": payload.params}))
            .build()?;
        let timeout = self.inner.config.request_timeout;
        let correlator = &self.inner.correlator;
        let sent = envelope.clone();
        let timeout_id = id;
        correlator
            .wait_for(
                envelope,
                &payload.method,
                timeout,
                || async move { self.send(&sent).await },
                move || async move { self.notify_cancelled(&target, &timeout_id).await },
            )
            .await
    }

    pub async fn reject_proposal(&self, proposal_id: &str, reason: Option<String>) -> ClientResult<()> {
        let mut builder = EnvelopeBuilder::new(Kind::McpReject)
            .from(self.runtime_id())
            .correlation_id([proposal_id]);
        if let Some(reason) = reason {
            builder = builder.payload(serde_json::json!({"reason": reason}));
        }
        self.send(&builder.build()?).await
    }

    pub async fn withdraw_proposal(&self, proposal_id: &str) -> ClientResult<()> {
        let envelope = EnvelopeBuilder::new(Kind::McpWithdraw)
            .from(self.runtime_id())
            .correlation_id([proposal_id])
            .build()?;
        self.send(&envelope).await
    }

    /// Halt `target`'s own outbound emission. `timeout` (if given)
    /// auto-resumes it gateway-side once elapsed; otherwise it stays
    /// paused until an explicit [`Client::resume`].
    pub async fn pause(&self, target: &str, timeout: Option<Duration>) -> ClientResult<()> {
        let envelope = EnvelopeBuilder::new(Kind::ParticipantPause)
            .from(self.runtime_id())
            .to([target])
            .payload(serde_json::json!({ "timeout_seconds": timeout.map(|t| t.as_secs()) }))
            .build()?;
        self.send(&envelope).await
    }

    pub async fn resume(&self, target: &str) -> ClientResult<()> {
        let envelope = EnvelopeBuilder::new(Kind::ParticipantResume)
            .from(self.runtime_id())
            .to([target])
            .build()?;
        self.send(&envelope).await
    }

    /// Start a `reasoning/*` session scoped to a fresh context rooted at
    /// a new request id.
    pub fn reasoning(&self, root: impl Into<String>) -> ReasoningSession {
        ReasoningSession::new(self.runtime_id(), Context::root(root.into()))
    }

    pub async fn send_reasoning(&self, envelope: Envelope) -> ClientResult<()> {
        self.send(&envelope).await
    }

    pub async fn open_stream(&self, stream_id: &str, bytes: &[u8]) -> ClientResult<()> {
        self.inner.connection.send_stream_frame(stream_id, bytes).await
    }

    /// Subscribe to every inbound envelope of a given kind.
    pub fn on(&self, kind: Kind, callback: impl Fn(&Envelope) + Send + Sync + 'static) -> Subscription {
        self.inner.events.on(kind, callback)
    }

    /// Subscribe to every inbound envelope.
    pub fn on_any(&self, callback: impl Fn(&Envelope) + Send + Sync + 'static) -> Subscription {
        self.inner.events.on_any(callback)
    }
}

impl Inner {
    fn handle_inbound(self_arc: &Arc<Self>, inbound: Inbound) {
        match inbound {
            Inbound::Envelope(envelope) => Self::handle_envelope(self_arc, envelope),
            Inbound::Stream { stream_id, bytes } => {
                tracing::trace!(stream_id, len = bytes.len(), "stream frame received");
            }
        }
    }

    fn handle_envelope(self_arc: &Arc<Self>, envelope: Envelope) {
        if envelope.kind == Kind::SystemWelcome {
            if let Ok(Payload::Welcome(welcome)) = Payload::parse(envelope.kind, &envelope.payload) {
                *self_arc.self_id.write() = welcome.you.id;
            }
        }

        // A capability/grant addressed to us gets an automatic
        // capability/grant-ack, regardless of whether it arrives before
        // or after the refreshed welcome the gateway also sends.
        if envelope.kind == Kind::CapabilityGrant
            && envelope.to.as_deref().is_some_and(|to| to.contains(&*self_arc.self_id.read()))
        {
            let acked = Arc::clone(self_arc);
            let grant_id = envelope.id.clone();
            tokio::spawn(async move { acked.send_grant_ack(&grant_id).await });
        }

        if envelope.kind == Kind::McpResponse {
            if let Some(request_id) = envelope.first_correlation() {
                if self_arc.correlator.complete(request_id, envelope.clone()) {
                    return;
                }
            }
        }

        self_arc.proposals.observe(&envelope);
        self_arc.events.dispatch(&envelope);
    }

    /// Called once per reconnect cycle: settles any pending request whose
    /// deadline already elapsed while disconnected, and reissues the rest
    /// by resending them on the (already-queuing) outbound channel ahead
    /// of the new socket coming up.
    fn handle_disconnect(self_arc: &Arc<Self>) {
        for envelope in self_arc.correlator.handle_disconnect() {
            let resend = Arc::clone(self_arc);
            tokio::spawn(async move {
                if let Err(e) = resend.connection.send(&envelope).await {
                    tracing::debug!(error = %e, id = %envelope.id, "failed to reissue pending request");
                }
            });
        }
    }

    async fn send_grant_ack(&self, grant_id: &str) {
        let Ok(ack) = EnvelopeBuilder::new(Kind::CapabilityGrantAck)
            .from(self.self_id.read().clone())
            .correlation_id([grant_id])
            .payload(serde_json::json!({"status": "accepted"}))
            .build()
        else {
            return;
        };
        if let Err(e) = self.connection.send(&ack).await {
            tracing::debug!(error = %e, grant_id, "failed to send capability/grant-ack");
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.correlator.cancel_all();
    }
}
