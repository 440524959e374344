//! The closed set of envelope `kind` values.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Every `kind` a MEW envelope may carry.
///
/// This is a closed set: `FromStr` fails for anything else, which is how
/// the envelope validator (see `mew-gateway`) rejects malformed or unknown
/// kinds before they ever reach routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    McpRequest,
    McpResponse,
    McpProposal,
    McpWithdraw,
    McpReject,
    ReasoningStart,
    ReasoningThought,
    ReasoningConclusion,
    ReasoningCancel,
    CapabilityGrant,
    CapabilityRevoke,
    CapabilityGrantAck,
    SpaceInvite,
    SpaceKick,
    ParticipantPause,
    ParticipantResume,
    ParticipantStatus,
    ParticipantRequestStatus,
    ParticipantForget,
    ParticipantCompact,
    ParticipantCompactDone,
    ParticipantClear,
    ParticipantRestart,
    ParticipantShutdown,
    StreamRequest,
    StreamOpen,
    StreamClose,
    Chat,
    ChatAcknowledge,
    ChatCancel,
    SystemPresence,
    SystemWelcome,
    SystemError,
}

impl Kind {
    /// Every kind, used by tests and by the capability matcher's
    /// wildcard expansion.
    pub const ALL: &'static [Kind] = &[
        Kind::McpRequest,
        Kind::McpResponse,
        Kind::McpProposal,
        Kind::McpWithdraw,
        Kind::McpReject,
        Kind::ReasoningStart,
        Kind::ReasoningThought,
        Kind::ReasoningConclusion,
        Kind::ReasoningCancel,
        Kind::CapabilityGrant,
        Kind::CapabilityRevoke,
        Kind::CapabilityGrantAck,
        Kind::SpaceInvite,
        Kind::SpaceKick,
        Kind::ParticipantPause,
        Kind::ParticipantResume,
        Kind::ParticipantStatus,
        Kind::ParticipantRequestStatus,
        Kind::ParticipantForget,
        Kind::ParticipantCompact,
        Kind::ParticipantCompactDone,
        Kind::ParticipantClear,
        Kind::ParticipantRestart,
        Kind::ParticipantShutdown,
        Kind::StreamRequest,
        Kind::StreamOpen,
        Kind::StreamClose,
        Kind::Chat,
        Kind::ChatAcknowledge,
        Kind::ChatCancel,
        Kind::SystemPresence,
        Kind::SystemWelcome,
        Kind::SystemError,
    ];

    /// The wire string for this kind, e.g. `"mcp/request"`.
    pub const fn as_str(self) -> &'static str {
        match self {
            Kind::McpRequest => "mcp/request",
            Kind::McpResponse => "mcp/response",
            Kind::McpProposal => "mcp/proposal",
            Kind::McpWithdraw => "mcp/withdraw",
            Kind::McpReject => "mcp/reject",
            Kind::ReasoningStart => "reasoning/start",
            Kind::ReasoningThought => "reasoning/thought",
            Kind::ReasoningConclusion => "reasoning/conclusion",
            Kind::ReasoningCancel => "reasoning/cancel",
            Kind::CapabilityGrant => "capability/grant",
            Kind::CapabilityRevoke => "capability/revoke",
            Kind::CapabilityGrantAck => "capability/grant-ack",
            Kind::SpaceInvite => "space/invite",
            Kind::SpaceKick => "space/kick",
            Kind::ParticipantPause => "participant/pause",
            Kind::ParticipantResume => "participant/resume",
            Kind::ParticipantStatus => "participant/status",
            Kind::ParticipantRequestStatus => "participant/request-status",
            Kind::ParticipantForget => "participant/forget",
            Kind::ParticipantCompact => "participant/compact",
            Kind::ParticipantCompactDone => "participant/compact-done",
            Kind::ParticipantClear => "participant/clear",
            Kind::ParticipantRestart => "participant/restart",
            Kind::ParticipantShutdown => "participant/shutdown",
            Kind::StreamRequest => "stream/request",
            Kind::StreamOpen => "stream/open",
            Kind::StreamClose => "stream/close",
            Kind::Chat => "chat",
            Kind::ChatAcknowledge => "chat/acknowledge",
            Kind::ChatCancel => "chat/cancel",
            Kind::SystemPresence => "system/presence",
            Kind::SystemWelcome => "system/welcome",
            Kind::SystemError => "system/error",
        }
    }

    /// Whether this kind lives in the gateway-only `system/` namespace —
    /// participants may never emit these themselves.
    pub const fn is_reserved(self) -> bool {
        matches!(
            self,
            Kind::SystemPresence | Kind::SystemWelcome | Kind::SystemError
        )
    }

    /// Whether a `payload` object is required on the wire for this kind.
    /// `reasoning/cancel`, `participant/resume`, and a handful of other
    /// terse control kinds may omit `payload` entirely.
    pub const fn requires_payload(self) -> bool {
        !matches!(
            self,
            Kind::ReasoningCancel
                | Kind::ParticipantResume
                | Kind::ParticipantRequestStatus
                | Kind::ParticipantForget
                | Kind::ParticipantCompact
                | Kind::ParticipantCompactDone
                | Kind::ParticipantClear
                | Kind::ParticipantRestart
                | Kind::ParticipantShutdown
                | Kind::ChatAcknowledge
                | Kind::ChatCancel
        )
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string is not one of the closed `kind` values.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown envelope kind: {0:?}")]
pub struct UnknownKind(pub String);

impl FromStr for Kind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Kind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| UnknownKind(s.to_string()))
    }
}

impl Serialize for Kind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Kind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
