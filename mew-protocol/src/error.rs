//! Error vocabulary shared by every envelope-handling crate.
//!
//! `ErrorCode` is the closed set of wire error codes — it is what goes in
//! a `system/error` envelope's `payload.error` field. `EnvelopeError` is the
//! local, in-process error returned by this crate's builders and the
//! capability matcher; it is not itself put on the wire.

use serde::{Deserialize, Serialize};

/// The closed set of `payload.error` codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    ProtocolMismatch,
    InvalidEnvelope,
    ReservedNamespace,
    IdentitySpoof,
    CapabilityViolation,
    UnknownRecipient,
    StreamNotFound,
    Backpressure,
    PeerDisconnected,
    Timeout,
}

impl ErrorCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            ErrorCode::ProtocolMismatch => "protocol_mismatch",
            ErrorCode::InvalidEnvelope => "invalid_envelope",
            ErrorCode::ReservedNamespace => "reserved_namespace",
            ErrorCode::IdentitySpoof => "identity_spoof",
            ErrorCode::CapabilityViolation => "capability_violation",
            ErrorCode::UnknownRecipient => "unknown_recipient",
            ErrorCode::StreamNotFound => "stream_not_found",
            ErrorCode::Backpressure => "backpressure",
            ErrorCode::PeerDisconnected => "peer_disconnected",
            ErrorCode::Timeout => "timeout",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised while constructing or parsing envelopes in-process.
///
/// This type never reaches the wire directly — callers map it to a
/// `system/error` envelope (gateway side) or surface it locally (client
/// side).
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum EnvelopeError {
    /// `protocol` did not equal [`crate::PROTOCOL_VERSION`].
    #[error("protocol mismatch: expected {expected}, got {actual}")]
    ProtocolMismatch { expected: String, actual: String },

    /// Envelope was missing a required field or had a malformed one.
    #[error("invalid envelope: {0}")]
    Invalid(String),

    /// A participant attempted to emit a `system/` kind.
    #[error("kind {0} is reserved for the gateway")]
    ReservedNamespace(String),

    /// `from` did not match the sender's runtime id.
    #[error("from field {claimed:?} does not match runtime id {actual:?}")]
    IdentitySpoof { claimed: String, actual: String },

    /// `correlation_id` was present but not an array of strings.
    #[error("correlation_id must be an array of strings")]
    BadCorrelationId,

    /// `payload` was missing for a kind that requires it.
    #[error("payload is required for kind {0}")]
    MissingPayload(String),

    /// A kind-specific payload shape failed to parse.
    #[error("malformed payload for {kind}: {reason}")]
    MalformedPayload { kind: String, reason: String },
}

impl EnvelopeError {
    /// Map this in-process error to the wire error code it corresponds to.
    pub fn code(&self) -> ErrorCode {
        match self {
            EnvelopeError::ProtocolMismatch { .. } => ErrorCode::ProtocolMismatch,
            EnvelopeError::ReservedNamespace(_) => ErrorCode::ReservedNamespace,
            EnvelopeError::IdentitySpoof { .. } => ErrorCode::IdentitySpoof,
            EnvelopeError::Invalid(_)
            | EnvelopeError::BadCorrelationId
            | EnvelopeError::MissingPayload(_)
            | EnvelopeError::MalformedPayload { .. } => ErrorCode::InvalidEnvelope,
        }
    }
}
