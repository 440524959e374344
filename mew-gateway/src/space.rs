//! A space: the set of participants that can address each other and the
//! streams currently open between them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use crate::participant::Participant;

pub struct StreamHandle {
    pub owner_runtime_id: String,
    pub direction: String,
    pub content_type: Option<String>,
    pub format: Option<String>,
    pub description: Option<String>,
    /// Every other field from the originating `stream/request` payload
    /// (e.g. `expected_size_bytes`, arbitrary `metadata`), copied
    /// verbatim so late joiners see the request exactly as it was made.
    pub extra: serde_json::Map<String, serde_json::Value>,
    pub created: String,
}

/// A point-in-time description of an open stream, shaped for
/// `system/welcome.payload.active_streams`.
#[derive(Debug, Clone)]
pub struct ActiveStream {
    pub stream_id: String,
    pub owner: String,
    pub direction: String,
    pub created: String,
    pub content_type: Option<String>,
    pub format: Option<String>,
    pub description: Option<String>,
    pub extra: serde_json::Map<String, serde_json::Value>,
}

pub struct Space {
    pub name: String,
    /// Keyed by runtime id (the identity the gateway assigns at connect
    /// time, stable for the life of the connection).
    participants: DashMap<String, Arc<Participant>>,
    /// Logical name -> runtime id, so `to: ["alice"]` resolves even
    /// though the wire-level identity is the runtime id.
    name_index: DashMap<String, String>,
    streams: DashMap<String, StreamHandle>,
    /// `mcp/proposal` envelope id -> the runtime id that proposed it,
    /// live until a later envelope's `correlation_id` references it
    /// (fulfilled, rejected, or withdrawn).
    pending_proposals: DashMap<String, String>,
    /// Cumulative counts for `Gateway::snapshot()`; reset only by process
    /// restart, not by `leave()`.
    envelopes_routed: AtomicU64,
    capability_violations: AtomicU64,
}

impl Space {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            participants: DashMap::new(),
            name_index: DashMap::new(),
            streams: DashMap::new(),
            pending_proposals: DashMap::new(),
            envelopes_routed: AtomicU64::new(0),
            capability_violations: AtomicU64::new(0),
        }
    }

    pub fn record_envelope_routed(&self) {
        self.envelopes_routed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_capability_violation(&self) {
        self.capability_violations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn envelopes_routed(&self) -> u64 {
        self.envelopes_routed.load(Ordering::Relaxed)
    }

    pub fn capability_violations(&self) -> u64 {
        self.capability_violations.load(Ordering::Relaxed)
    }

    pub fn open_stream_count(&self) -> usize {
        self.streams.len()
    }

    pub fn join(&self, participant: Arc<Participant>) {
        self.name_index
            .insert(participant.logical_name.clone(), participant.runtime_id.clone());
        self.participants.insert(participant.runtime_id.clone(), participant);
    }

    /// Remove a participant and every stream it owned, returning the
    /// owned stream ids so the caller can broadcast `stream/close` for
    /// each.
    pub fn leave(&self, runtime_id: &str) -> Vec<String> {
        if let Some((_, p)) = self.participants.remove(runtime_id) {
            self.name_index.remove(&p.logical_name);
        }
        let owned: Vec<String> = self
            .streams
            .iter()
            .filter(|e| e.value().owner_runtime_id == runtime_id)
            .map(|e| e.key().clone())
            .collect();
        for stream_id in &owned {
            self.streams.remove(stream_id);
        }
        self.pending_proposals.retain(|_, owner| owner != runtime_id);
        owned
    }

    /// Record a newly-sent `mcp/proposal`, returning `false` if the
    /// proposer already has `max_pending` outstanding.
    pub fn track_proposal(&self, proposal_id: String, owner_runtime_id: String, max_pending: usize) -> bool {
        if self.pending_proposal_count_for(&owner_runtime_id) >= max_pending {
            return false;
        }
        self.pending_proposals.insert(proposal_id, owner_runtime_id);
        true
    }

    /// Stop tracking a proposal once some later envelope's
    /// `correlation_id` references it (fulfillment, rejection, or
    /// withdrawal) — a no-op if `proposal_id` isn't tracked.
    pub fn resolve_proposal(&self, proposal_id: &str) {
        self.pending_proposals.remove(proposal_id);
    }

    pub fn pending_proposal_count_for(&self, runtime_id: &str) -> usize {
        self.pending_proposals.iter().filter(|e| e.value() == runtime_id).count()
    }

    pub fn get(&self, runtime_id: &str) -> Option<Arc<Participant>> {
        self.participants.get(runtime_id).map(|e| Arc::clone(&e))
    }

    /// Resolve a name that may be either a runtime id or a logical name.
    pub fn resolve(&self, name: &str) -> Option<Arc<Participant>> {
        if let Some(p) = self.get(name) {
            return Some(p);
        }
        let runtime_id = self.name_index.get(name)?.clone();
        self.get(&runtime_id)
    }

    pub fn participants(&self) -> Vec<Arc<Participant>> {
        self.participants.iter().map(|e| Arc::clone(e.value())).collect()
    }

    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }

    #[allow(clippy::too_many_arguments)]
    pub fn open_stream(
        &self,
        stream_id: String,
        owner_runtime_id: String,
        direction: String,
        content_type: Option<String>,
        format: Option<String>,
        description: Option<String>,
        extra: serde_json::Map<String, serde_json::Value>,
        created: String,
    ) {
        self.streams.insert(
            stream_id,
            StreamHandle {
                owner_runtime_id,
                direction,
                content_type,
                format,
                description,
                extra,
                created,
            },
        );
    }

    /// Every currently open stream, for a freshly-connecting (or
    /// capability-refreshed) participant's `system/welcome`.
    pub fn active_streams(&self) -> Vec<ActiveStream> {
        self.streams
            .iter()
            .map(|e| ActiveStream {
                stream_id: e.key().clone(),
                owner: e.value().owner_runtime_id.clone(),
                direction: e.value().direction.clone(),
                created: e.value().created.clone(),
                content_type: e.value().content_type.clone(),
                format: e.value().format.clone(),
                description: e.value().description.clone(),
                extra: e.value().extra.clone(),
            })
            .collect()
    }

    pub fn close_stream(&self, stream_id: &str) -> Option<StreamHandle> {
        self.streams.remove(stream_id).map(|(_, v)| v)
    }

    pub fn stream(&self, stream_id: &str) -> Option<String> {
        self.streams.get(stream_id).map(|s| s.owner_runtime_id.clone())
    }

    pub fn stream_count_for(&self, runtime_id: &str) -> usize {
        self.streams.iter().filter(|s| s.owner_runtime_id == runtime_id).count()
    }
}
