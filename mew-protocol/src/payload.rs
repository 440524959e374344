//! Typed views over [`crate::Envelope::payload`].
//!
//! The envelope itself keeps `payload` as a raw [`serde_json::Value`] so
//! unknown fields round-trip untouched; these types exist for code that
//! needs to act on a specific kind's payload shape
//! (the validator, the capability engine, the router) without hand
//! re-parsing JSON at every call site. Every struct carries a `#[serde(
//! flatten)] extra` map so fields this crate doesn't yet model are
//! preserved rather than silently dropped if the value is re-serialized.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ErrorCode, EnvelopeError};
use crate::kind::Kind;

fn default_params() -> Value {
    Value::Object(Map::new())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpRequestPayload {
    pub method: String,
    #[serde(default = "default_params")]
    pub params: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpResponsePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpProposalPayload {
    pub method: String,
    #[serde(default = "default_params")]
    pub params: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityGrantPayload {
    pub capabilities: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityRevokePayload {
    /// May be empty when `grant_id` identifies the grant directly.
    #[serde(default)]
    pub capabilities: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grant_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityGrantAckPayload {
    /// `"accepted"` or `"rejected"`.
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamRequestPayload {
    pub direction: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamOpenPayload {
    pub stream_id: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamClosePayload {
    pub stream_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantPausePayload {
    /// Auto-resume after this many seconds; `None` pauses until an
    /// explicit `participant/resume`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatPayload {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantInfo {
    pub id: String,
    #[serde(default)]
    pub capabilities: Vec<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresencePayload {
    pub event: String,
    pub participant: ParticipantInfo,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WelcomePayload {
    pub you: ParticipantInfo,
    #[serde(default)]
    pub participants: Vec<ParticipantInfo>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub error: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A payload parsed into its kind-specific shape, for kinds the gateway
/// needs to act on. Kinds with no structured payload behavior (reasoning
/// events, participant lifecycle controls) stay [`Payload::Opaque`].
#[derive(Debug, Clone)]
pub enum Payload {
    McpRequest(McpRequestPayload),
    McpResponse(McpResponsePayload),
    McpProposal(McpProposalPayload),
    CapabilityGrant(CapabilityGrantPayload),
    CapabilityRevoke(CapabilityRevokePayload),
    CapabilityGrantAck(CapabilityGrantAckPayload),
    StreamRequest(StreamRequestPayload),
    StreamOpen(StreamOpenPayload),
    StreamClose(StreamClosePayload),
    ParticipantPause(ParticipantPausePayload),
    Chat(ChatPayload),
    Presence(PresencePayload),
    Welcome(WelcomePayload),
    Error(ErrorPayload),
    Opaque(Value),
}

impl Payload {
    pub fn parse(kind: Kind, value: &Value) -> Result<Self, EnvelopeError> {
        fn from<T: serde::de::DeserializeOwned>(kind: Kind, value: &Value) -> Result<T, EnvelopeError> {
            serde_json::from_value(value.clone()).map_err(|e| EnvelopeError::MalformedPayload {
                kind: kind.to_string(),
                reason: e.to_string(),
            })
        }

        Ok(match kind {
            Kind::McpRequest => Payload::McpRequest(from(kind, value)?),
            Kind::McpResponse => Payload::McpResponse(from(kind, value)?),
            Kind::McpProposal => Payload::McpProposal(from(kind, value)?),
            Kind::CapabilityGrant => Payload::CapabilityGrant(from(kind, value)?),
            Kind::CapabilityRevoke => Payload::CapabilityRevoke(from(kind, value)?),
            Kind::CapabilityGrantAck => Payload::CapabilityGrantAck(from(kind, value)?),
            Kind::StreamRequest => Payload::StreamRequest(from(kind, value)?),
            Kind::StreamOpen => Payload::StreamOpen(from(kind, value)?),
            Kind::StreamClose => Payload::StreamClose(from(kind, value)?),
            Kind::ParticipantPause => Payload::ParticipantPause(from(kind, value)?),
            Kind::Chat => Payload::Chat(from(kind, value)?),
            Kind::SystemPresence => Payload::Presence(from(kind, value)?),
            Kind::SystemWelcome => Payload::Welcome(from(kind, value)?),
            Kind::SystemError => Payload::Error(from(kind, value)?),
            _ => Payload::Opaque(value.clone()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_mcp_request_and_keeps_unknown_fields() {
        let value = json!({"method": "tools/call", "params": {"name": "x"}, "vendor_hint": "keep-me"});
        let parsed = Payload::parse(Kind::McpRequest, &value).unwrap();
        match parsed {
            Payload::McpRequest(p) => {
                assert_eq!(p.method, "tools/call");
                assert_eq!(p.extra.get("vendor_hint").unwrap(), "keep-me");
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn malformed_payload_is_reported_with_kind() {
        let value = json!({"params": {}});
        let err = Payload::parse(Kind::McpRequest, &value).unwrap_err();
        assert!(matches!(err, EnvelopeError::MalformedPayload { .. }));
    }

    #[test]
    fn unmodeled_kind_stays_opaque() {
        let value = json!({"whatever": true});
        assert!(matches!(
            Payload::parse(Kind::ReasoningCancel, &value).unwrap(),
            Payload::Opaque(_)
        ));
    }
}
