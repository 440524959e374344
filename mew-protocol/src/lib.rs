//! Wire types shared by the MEW gateway and participant runtime: the
//! envelope itself, the closed `kind` set, the capability pattern
//! matcher, context paths, and the error vocabulary that both sides
//! speak. No networking lives here — connecting those types to a socket
//! is `mew-gateway`'s and `mew-client`'s job.

pub mod capability;
pub mod context;
pub mod envelope;
pub mod error;
mod ids;
pub mod kind;
pub mod payload;

pub use capability::{subset, CapabilityPattern};
pub use context::Context;
pub use envelope::{canonicalize, Classification, Envelope, EnvelopeBuilder, RawEnvelope, PROTOCOL_VERSION};
pub use error::{EnvelopeError, ErrorCode};
pub use ids::now_rfc3339;
pub use kind::{Kind, UnknownKind};
pub use payload::Payload;
