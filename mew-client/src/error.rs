//! Participant-runtime error types.

use mew_protocol::{Envelope, EnvelopeError, ErrorCode};

pub type ClientResult<T> = Result<T, ClientError>;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    #[error("request for {method} timed out")]
    Timeout { method: String },

    #[error("not connected")]
    Disconnected,

    #[error("request was cancelled")]
    Cancelled,

    #[error("proposal {proposal_id} was withdrawn or rejected")]
    ProposalNotFulfilled { proposal_id: String },

    #[error("proposal {proposal_id} has no `to` target to fulfill")]
    ProposalMissingTarget { proposal_id: String },

    /// The gateway answered with a `system/error` envelope.
    #[error("gateway rejected request: {code}: {message}")]
    Server { code: ErrorCode, message: String, envelope: Box<Envelope> },
}
