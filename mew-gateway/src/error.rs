//! Gateway error types.

use mew_protocol::{EnvelopeError, ErrorCode};

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Errors raised while routing envelopes or managing gateway state.
///
/// Most variants map to a wire [`ErrorCode`] via [`GatewayError::code`] so
/// the connection task can turn them into a `system/error` envelope back
/// to the offending participant.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum GatewayError {
    /// The envelope itself was malformed (protocol mismatch, spoofed
    /// `from`, unknown `kind`, ...).
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    /// No space with this name is configured.
    #[error("unknown space: {0}")]
    UnknownSpace(String),

    /// The bearer token presented at connect time matches no configured
    /// participant in the target space.
    #[error("invalid token for space {space}")]
    InvalidToken { space: String },

    /// Every name in `to` failed to resolve to a connected participant.
    #[error("unknown recipient(s): {0:?}")]
    UnknownRecipient(Vec<String>),

    /// The sender's effective capabilities do not cover this envelope.
    #[error("capability violation: {kind} is not permitted for {participant}")]
    CapabilityViolation { participant: String, kind: String },

    /// A stream frame referenced a stream id the gateway has no record
    /// of (never opened, already closed, or not owned by the sender).
    #[error("unknown stream: {0}")]
    StreamNotFound(String),

    /// A per-connection or per-space resource limit was hit.
    #[error("{resource} exhausted ({current}/{max})")]
    Backpressure {
        resource: String,
        current: usize,
        max: usize,
    },

    /// The participant's outbound channel is gone (connection already
    /// torn down).
    #[error("peer disconnected: {0}")]
    PeerDisconnected(String),

    /// Configuration failed to load or validate.
    #[error("configuration error: {message}")]
    Configuration { message: String, key: Option<String> },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl GatewayError {
    pub fn code(&self) -> ErrorCode {
        match self {
            GatewayError::Envelope(e) => e.code(),
            GatewayError::UnknownSpace(_) | GatewayError::InvalidToken { .. } => {
                ErrorCode::IdentitySpoof
            }
            GatewayError::UnknownRecipient(_) => ErrorCode::UnknownRecipient,
            GatewayError::CapabilityViolation { .. } => ErrorCode::CapabilityViolation,
            GatewayError::StreamNotFound(_) => ErrorCode::StreamNotFound,
            GatewayError::Backpressure { .. } => ErrorCode::Backpressure,
            GatewayError::PeerDisconnected(_) => ErrorCode::PeerDisconnected,
            GatewayError::Configuration { .. } | GatewayError::Io(_) => ErrorCode::InvalidEnvelope,
        }
    }
}
