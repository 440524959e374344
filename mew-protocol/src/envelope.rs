//! The canonical on-wire envelope and the permissive shape it is first
//! decoded into.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::EnvelopeError;
use crate::kind::Kind;

/// The protocol version tag every envelope must carry.
pub const PROTOCOL_VERSION: &str = "mew/v0.4";

/// What a canonical envelope is, for routing/dispatch purposes. Computed
/// once by [`canonicalize`] and carried alongside the envelope rather than
/// re-derived at every hop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Request,
    Response,
    Proposal,
    Control,
    Chat,
    Stream,
}

impl Classification {
    fn of(kind: Kind) -> Self {
        match kind {
            Kind::McpRequest => Classification::Request,
            Kind::McpResponse => Classification::Response,
            Kind::McpProposal | Kind::McpWithdraw | Kind::McpReject => Classification::Proposal,
            Kind::StreamRequest | Kind::StreamOpen | Kind::StreamClose => Classification::Stream,
            Kind::Chat | Kind::ChatAcknowledge | Kind::ChatCancel => Classification::Chat,
            _ => Classification::Control,
        }
    }
}

/// The envelope exactly as it comes off the wire, before any invariant has
/// been checked. `id`, `ts`, and `from` are optional here because the
/// sender may omit them for the gateway (or client-side stamping helper)
/// to fill in; `kind` and `correlation_id` are left as loosely-typed JSON
/// so the validator can produce a specific [`EnvelopeError`] rather than a
/// generic deserialization failure.
#[derive(Debug, Clone, Deserialize)]
pub struct RawEnvelope {
    pub protocol: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub ts: Option<String>,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<Vec<String>>,
    pub kind: String,
    #[serde(default)]
    pub correlation_id: Option<Value>,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub payload: Option<Value>,
}

/// A validated, canonical envelope: every structural invariant holds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub protocol: String,
    pub id: String,
    pub ts: String,
    pub from: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<Vec<String>>,
    pub kind: Kind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default = "empty_payload")]
    pub payload: Value,
}

fn empty_payload() -> Value {
    Value::Object(serde_json::Map::new())
}

impl Envelope {
    /// Whether `to` names at least one recipient (a "directed" send).
    pub fn is_directed(&self) -> bool {
        matches!(&self.to, Some(list) if !list.is_empty())
    }

    /// `correlation_id[0]`, if any — the common case of "the one envelope
    /// this responds to".
    pub fn first_correlation(&self) -> Option<&str> {
        self.correlation_id
            .as_deref()
            .and_then(|ids| ids.first())
            .map(String::as_str)
    }

    pub fn classification(&self) -> Classification {
        Classification::of(self.kind)
    }
}

/// Builder for outbound envelopes (used by the gateway when it mints
/// `system/*` envelopes, and by `mew-client` for participant sends).
///
/// A plain data struct assembled field-by-field, validated only at
/// `build()`.
#[derive(Debug, Clone)]
pub struct EnvelopeBuilder {
    kind: Kind,
    id: Option<String>,
    ts: Option<String>,
    from: Option<String>,
    to: Option<Vec<String>>,
    correlation_id: Option<Vec<String>>,
    context: Option<String>,
    payload: Value,
}

impl EnvelopeBuilder {
    pub fn new(kind: Kind) -> Self {
        Self {
            kind,
            id: None,
            ts: None,
            from: None,
            to: None,
            correlation_id: None,
            context: None,
            payload: empty_payload(),
        }
    }

    #[must_use]
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    #[must_use]
    pub fn ts(mut self, ts: impl Into<String>) -> Self {
        self.ts = Some(ts.into());
        self
    }

    #[must_use]
    pub fn from(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }

    #[must_use]
    pub fn to<I, S>(mut self, to: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.to = Some(to.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn correlation_id<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.correlation_id = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    #[must_use]
    pub fn payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    #[must_use]
    pub fn payload_of<T: Serialize>(mut self, payload: &T) -> Result<Self, EnvelopeError> {
        self.payload =
            serde_json::to_value(payload).map_err(|e| EnvelopeError::Invalid(e.to_string()))?;
        Ok(self)
    }

    /// Finish building. `id`/`ts` are stamped with fresh values if absent;
    /// `from` must have been supplied (the gateway overwrites it anyway on
    /// receipt, but a well-formed outbound envelope always names its
    /// sender).
    pub fn build(self) -> Result<Envelope, EnvelopeError> {
        let from = self
            .from
            .ok_or_else(|| EnvelopeError::Invalid("missing from".to_string()))?;
        if self.kind.requires_payload() && self.payload.as_object().is_none_or(|m| m.is_empty()) {
            return Err(EnvelopeError::MissingPayload(self.kind.to_string()));
        }
        Ok(Envelope {
            protocol: PROTOCOL_VERSION.to_string(),
            id: self.id.unwrap_or_else(crate::ids::new_id),
            ts: self.ts.unwrap_or_else(crate::ids::now_rfc3339),
            from,
            to: self.to,
            kind: self.kind,
            correlation_id: self.correlation_id,
            context: self.context,
            payload: self.payload,
        })
    }
}

/// Validate and canonicalize a raw inbound envelope known to have arrived
/// on a connection belonging to `sender_runtime_id`.
///
/// Returns the canonical envelope and its classification, or the specific
/// [`EnvelopeError`] describing why it was rejected.
pub fn canonicalize(
    raw: RawEnvelope,
    sender_runtime_id: &str,
) -> Result<(Envelope, Classification), EnvelopeError> {
    if raw.protocol != PROTOCOL_VERSION {
        return Err(EnvelopeError::ProtocolMismatch {
            expected: PROTOCOL_VERSION.to_string(),
            actual: raw.protocol,
        });
    }

    let kind: Kind = raw
        .kind
        .parse()
        .map_err(|_| EnvelopeError::Invalid(format!("unknown kind {:?}", raw.kind)))?;

    if kind.is_reserved() {
        return Err(EnvelopeError::ReservedNamespace(kind.to_string()));
    }

    if let Some(claimed) = &raw.from {
        if claimed != sender_runtime_id {
            return Err(EnvelopeError::IdentitySpoof {
                claimed: claimed.clone(),
                actual: sender_runtime_id.to_string(),
            });
        }
    }

    let correlation_id = match raw.correlation_id {
        None => None,
        Some(Value::Array(items)) => {
            let mut ids = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::String(s) => ids.push(s),
                    _ => return Err(EnvelopeError::BadCorrelationId),
                }
            }
            Some(ids)
        }
        Some(_) => return Err(EnvelopeError::BadCorrelationId),
    };

    if kind == Kind::McpResponse && correlation_id.as_ref().map_or(0, Vec::len) != 1 {
        return Err(EnvelopeError::Invalid(
            "mcp/response must reference exactly one request id in correlation_id".to_string(),
        ));
    }
    if matches!(kind, Kind::McpWithdraw | Kind::McpReject) && correlation_id.is_none() {
        return Err(EnvelopeError::Invalid(format!(
            "{kind} must reference its proposal via correlation_id"
        )));
    }

    let payload = match raw.payload {
        Some(p) => p,
        None if kind.requires_payload() => {
            return Err(EnvelopeError::MissingPayload(kind.to_string()));
        }
        None => empty_payload(),
    };

    let envelope = Envelope {
        protocol: PROTOCOL_VERSION.to_string(),
        id: raw.id.unwrap_or_else(crate::ids::new_id),
        ts: raw.ts.unwrap_or_else(crate::ids::now_rfc3339),
        from: sender_runtime_id.to_string(),
        to: raw.to,
        kind,
        correlation_id,
        context: raw.context,
        payload,
    };
    let classification = envelope.classification();
    Ok((envelope, classification))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(kind: &str) -> RawEnvelope {
        RawEnvelope {
            protocol: PROTOCOL_VERSION.to_string(),
            id: None,
            ts: None,
            from: None,
            to: None,
            kind: kind.to_string(),
            correlation_id: None,
            context: None,
            payload: Some(serde_json::json!({"method": "tools/list"})),
        }
    }

    #[test]
    fn stamps_id_and_ts_when_absent() {
        let (env, _) = canonicalize(raw("mcp/request"), "runtime-1").unwrap();
        assert!(!env.id.is_empty());
        assert!(!env.ts.is_empty());
        assert_eq!(env.from, "runtime-1");
    }

    #[test]
    fn rejects_protocol_mismatch() {
        let mut r = raw("chat");
        r.protocol = "mew/v0.1".to_string();
        assert!(matches!(
            canonicalize(r, "runtime-1"),
            Err(EnvelopeError::ProtocolMismatch { .. })
        ));
    }

    #[test]
    fn rejects_reserved_namespace() {
        let r = raw("system/presence");
        assert!(matches!(
            canonicalize(r, "runtime-1"),
            Err(EnvelopeError::ReservedNamespace(_))
        ));
    }

    #[test]
    fn rejects_spoofed_from() {
        let mut r = raw("chat");
        r.from = Some("someone-else".to_string());
        assert!(matches!(
            canonicalize(r, "runtime-1"),
            Err(EnvelopeError::IdentitySpoof { .. })
        ));
    }

    #[test]
    fn rejects_non_array_correlation_id() {
        let mut r = raw("chat");
        r.correlation_id = Some(serde_json::json!("not-an-array"));
        assert!(matches!(
            canonicalize(r, "runtime-1"),
            Err(EnvelopeError::BadCorrelationId)
        ));
    }

    #[test]
    fn response_requires_single_correlation_id() {
        let mut r = raw("mcp/response");
        r.correlation_id = Some(serde_json::json!(["a", "b"]));
        assert!(canonicalize(r, "runtime-1").is_err());

        let mut r = raw("mcp/response");
        r.correlation_id = Some(serde_json::json!(["a"]));
        assert!(canonicalize(r, "runtime-1").is_ok());
    }

    #[test]
    fn withdraw_requires_correlation_id() {
        let r = raw("mcp/withdraw");
        assert!(canonicalize(r, "runtime-1").is_err());
    }

    #[test]
    fn classification_matches_kind_family() {
        let (env, c) = canonicalize(raw("stream/request"), "r1").unwrap();
        assert_eq!(env.kind, Kind::StreamRequest);
        assert_eq!(c, Classification::Stream);
    }
}
