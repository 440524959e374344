//! Thin orchestration around [`mew_protocol::canonicalize`]: the pure
//! invariant checks live in `mew-protocol` so both the gateway and tests
//! can exercise them without spinning up a connection; this module just
//! adds the logging a rejected envelope deserves.

use mew_protocol::{canonicalize, Classification, Envelope, RawEnvelope};

use crate::error::GatewayError;

pub fn validate(raw: RawEnvelope, sender_runtime_id: &str) -> Result<(Envelope, Classification), GatewayError> {
    canonicalize(raw, sender_runtime_id).map_err(|e| {
        tracing::debug!(sender = sender_runtime_id, error = %e, "envelope rejected by validator");
        GatewayError::Envelope(e)
    })
}
