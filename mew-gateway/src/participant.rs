//! A connected participant's runtime state within a space.

use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::sync::mpsc;

use mew_protocol::CapabilityPattern;
use serde_json::Value;

/// A frame queued for delivery to a participant's connection, kept
/// transport-agnostic so `space.rs`/`router.rs` never have to know
/// whether the peer is a WebSocket or an injected HTTP caller being
/// echoed a `system/error`.
#[derive(Debug, Clone)]
pub enum OutboundFrame {
    Envelope(mew_protocol::Envelope),
    Stream { stream_id: String, bytes: Vec<u8> },
    Close,
}

/// Where a connection is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Authenticating,
    Ready,
    Draining,
    Closed,
}

/// One capability grant: the pattern plus who granted it, so revocation
/// can target grants from a specific grantor without touching the
/// participant's static capabilities. `grant_id` is the id of the
/// `capability/grant` envelope that created it, letting a later
/// `capability/revoke` target this exact grant instead of every grant
/// matching the same pattern.
#[derive(Debug, Clone)]
pub struct Grant {
    pub pattern: CapabilityPattern,
    pub granted_by: String,
    pub grant_id: String,
}

pub struct Participant {
    pub runtime_id: String,
    pub logical_name: String,
    static_capabilities: Vec<CapabilityPattern>,
    granted_capabilities: RwLock<Vec<Grant>>,
    pub outbound: mpsc::Sender<OutboundFrame>,
    state: RwLock<ConnectionState>,
    pub active_streams: dashmap::DashSet<String>,
    /// `Some(None)` paused until an explicit resume; `Some(Some(deadline))`
    /// auto-resumes at `deadline`; `None` not paused.
    paused_until: RwLock<Option<Option<Instant>>>,
}

impl Participant {
    pub fn new(
        runtime_id: String,
        logical_name: String,
        static_capabilities: Vec<Value>,
        outbound: mpsc::Sender<OutboundFrame>,
    ) -> Self {
        Self {
            runtime_id,
            logical_name,
            static_capabilities: static_capabilities.into_iter().map(CapabilityPattern::new).collect(),
            granted_capabilities: RwLock::new(Vec::new()),
            outbound,
            state: RwLock::new(ConnectionState::Authenticating),
            active_streams: dashmap::DashSet::new(),
            paused_until: RwLock::new(None),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    pub fn set_state(&self, state: ConnectionState) {
        *self.state.write() = state;
    }

    /// Whether `candidate` (typically `{"kind": ..., "payload": {...}}`)
    /// is allowed by any static or granted capability.
    pub fn allows(&self, candidate: &Value) -> bool {
        self.static_capabilities.iter().any(|p| p.allows(candidate))
            || self
                .granted_capabilities
                .read()
                .iter()
                .any(|g| g.pattern.allows(candidate))
    }

    /// All capability patterns in force right now, static first.
    pub fn effective_capabilities(&self) -> Vec<CapabilityPattern> {
        let mut all: Vec<CapabilityPattern> = self.static_capabilities.clone();
        all.extend(self.granted_capabilities.read().iter().map(|g| g.pattern.clone()));
        all
    }

    /// Whether every concrete envelope `pattern` allows is also allowed
    /// by this participant's own effective capabilities — the check a
    /// grant must pass before it can be extended to someone else.
    pub fn covers(&self, pattern: &CapabilityPattern) -> bool {
        self.static_capabilities.iter().any(|c| pattern.covered_by(c))
            || self
                .granted_capabilities
                .read()
                .iter()
                .any(|g| pattern.covered_by(&g.pattern))
    }

    pub fn grant(&self, pattern: CapabilityPattern, granted_by: impl Into<String>, grant_id: impl Into<String>) {
        self.granted_capabilities.write().push(Grant {
            pattern,
            granted_by: granted_by.into(),
            grant_id: grant_id.into(),
        });
    }

    /// Revoke every grant matching `pattern` (exact pattern match, as
    /// granted) that came from `granted_by`. Static capabilities can
    /// never be revoked this way.
    pub fn revoke(&self, pattern: &Value, granted_by: &str) -> usize {
        let mut grants = self.granted_capabilities.write();
        let before = grants.len();
        grants.retain(|g| !(g.pattern.as_value() == pattern && g.granted_by == granted_by));
        before - grants.len()
    }

    /// Revoke the single grant with this exact `grant_id`, scoped to the
    /// same `granted_by` a pattern-based revoke is scoped to.
    pub fn revoke_by_id(&self, grant_id: &str, granted_by: &str) -> usize {
        let mut grants = self.granted_capabilities.write();
        let before = grants.len();
        grants.retain(|g| !(g.grant_id == grant_id && g.granted_by == granted_by));
        before - grants.len()
    }

    /// Static capability patterns as plain JSON values.
    pub fn static_capability_values(&self) -> Vec<Value> {
        self.static_capabilities.iter().map(|p| p.as_value().clone()).collect()
    }

    /// Granted capability patterns as JSON values, each with its
    /// `grant_id` merged in so a recipient can name a specific grant in
    /// a later `capability/revoke`.
    pub fn granted_capability_values(&self) -> Vec<Value> {
        self.granted_capabilities
            .read()
            .iter()
            .map(|g| {
                let mut value = g.pattern.as_value().clone();
                if let Some(obj) = value.as_object_mut() {
                    obj.insert("grant_id".to_string(), Value::String(g.grant_id.clone()));
                }
                value
            })
            .collect()
    }

    /// Halt this participant's own outbound emission. `timeout` (if any)
    /// auto-resumes it once elapsed; `None` pauses until an explicit
    /// [`Self::resume`].
    pub fn pause(&self, timeout: Option<Duration>) {
        *self.paused_until.write() = Some(timeout.map(|d| Instant::now() + d));
    }

    pub fn resume(&self) {
        *self.paused_until.write() = None;
    }

    /// Whether this participant's outbound emission is currently halted.
    /// A pause whose deadline has passed clears itself here, so callers
    /// never need to poll for expiry separately.
    pub fn is_paused(&self) -> bool {
        let mut guard = self.paused_until.write();
        match *guard {
            None => false,
            Some(Some(deadline)) if Instant::now() >= deadline => {
                *guard = None;
                false
            }
            Some(_) => true,
        }
    }

    pub async fn send(&self, frame: OutboundFrame) -> Result<(), mpsc::error::SendError<OutboundFrame>> {
        self.outbound.send(frame).await
    }

    /// Non-blocking send, so one stuck peer's full queue can never stall
    /// delivery to everyone else in a broadcast.
    pub fn try_send(&self, frame: OutboundFrame) -> Result<(), mpsc::error::TrySendError<OutboundFrame>> {
        self.outbound.try_send(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn participant() -> Participant {
        let (tx, _rx) = mpsc::channel(8);
        Participant::new(
            "runtime-1".to_string(),
            "alice".to_string(),
            vec![json!({"kind": "chat"})],
            tx,
        )
    }

    #[test]
    fn static_capability_allows_matching_kind() {
        let p = participant();
        assert!(p.allows(&json!({"kind": "chat", "payload": {"text": "hi"}})));
        assert!(!p.allows(&json!({"kind": "mcp/request"})));
    }

    #[test]
    fn grant_and_revoke_round_trip() {
        let p = participant();
        let pattern = CapabilityPattern::new(json!({"kind": "mcp/request"}));
        p.grant(pattern, "bob", "g1");
        assert!(p.allows(&json!({"kind": "mcp/request", "payload": {"method": "x"}})));
        let removed = p.revoke(&json!({"kind": "mcp/request"}), "bob");
        assert_eq!(removed, 1);
        assert!(!p.allows(&json!({"kind": "mcp/request"})));
    }

    #[test]
    fn revoke_by_id_removes_only_that_grant() {
        let p = participant();
        p.grant(CapabilityPattern::new(json!({"kind": "mcp/request"})), "bob", "g1");
        p.grant(CapabilityPattern::new(json!({"kind": "mcp/request"})), "bob", "g2");
        let removed = p.revoke_by_id("g1", "bob");
        assert_eq!(removed, 1);
        assert!(p.allows(&json!({"kind": "mcp/request"})));
        let ids: Vec<String> = p
            .granted_capability_values()
            .into_iter()
            .map(|v| v["grant_id"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(ids, vec!["g2".to_string()]);
    }

    #[test]
    fn pause_halts_until_explicit_resume() {
        let p = participant();
        assert!(!p.is_paused());
        p.pause(None);
        assert!(p.is_paused());
        assert!(p.is_paused());
        p.resume();
        assert!(!p.is_paused());
    }

    #[test]
    fn pause_with_timeout_auto_resumes_after_deadline() {
        let p = participant();
        p.pause(Some(std::time::Duration::from_millis(1)));
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(!p.is_paused());
    }

    #[test]
    fn granted_capability_values_include_grant_id_but_static_do_not() {
        let p = participant();
        p.grant(CapabilityPattern::new(json!({"kind": "mcp/request"})), "bob", "g1");
        let static_values = p.static_capability_values();
        assert_eq!(static_values, vec![json!({"kind": "chat"})]);
        let granted_values = p.granted_capability_values();
        assert_eq!(granted_values, vec![json!({"kind": "mcp/request", "grant_id": "g1"})]);
    }
}
