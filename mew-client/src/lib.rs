//! Reconnecting participant runtime for the MEW gateway protocol.
//!
//! Pairs with `mew-gateway`: a [`Client`] owns a single space connection,
//! correlates its own `mcp/request`s, tracks proposals it has made, and
//! dispatches everything else (chat, presence, reasoning) through an
//! [`EventBus`] subscription model.

pub mod client;
pub mod config;
pub mod connection;
pub mod correlator;
pub mod error;
pub mod events;
pub mod proposal;
pub mod reasoning;

pub use client::Client;
pub use config::{ClientConfig, ReconnectConfig};
pub use connection::ConnectionState;
pub use correlator::Correlator;
pub use error::{ClientError, ClientResult};
pub use events::{EventBus, Subscription};
pub use proposal::{ProposalOutcome, ProposalTracker};
pub use reasoning::ReasoningSession;
