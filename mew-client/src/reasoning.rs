//! Builders for the `reasoning/*` family. These just shape envelopes —
//! `Client::reasoning` (see `client.rs`) is what actually sends them and
//! keeps the session's `Context` alive across the start/thought*/
//! conclusion sequence.

use mew_protocol::{Context, Envelope, EnvelopeBuilder, EnvelopeError, Kind};
use serde_json::json;

/// A reasoning session scoped to one `Context` path. Each call produces
/// an envelope to send; `ReasoningSession` holds no connection of its
/// own, so it stays trivially testable.
pub struct ReasoningSession {
    from: String,
    context: Context,
}

impl ReasoningSession {
    pub fn new(from: impl Into<String>, context: Context) -> Self {
        Self { from: from.into(), context }
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn start(&self, summary: impl Into<String>) -> Result<Envelope, EnvelopeError> {
        EnvelopeBuilder::new(Kind::ReasoningStart)
            .from(self.from.clone())
            .context(self.context.to_string())
            .payload(json!({ "summary": summary.into() }))
            .build()
    }

    pub fn thought(&self, text: impl Into<String>) -> Result<Envelope, EnvelopeError> {
        EnvelopeBuilder::new(Kind::ReasoningThought)
            .from(self.from.clone())
            .context(self.context.to_string())
            .payload(json!({ "text": text.into() }))
            .build()
    }

    pub fn conclude(&self, summary: impl Into<String>) -> Result<Envelope, EnvelopeError> {
        EnvelopeBuilder::new(Kind::ReasoningConclusion)
            .from(self.from.clone())
            .context(self.context.to_string())
            .payload(json!({ "summary": summary.into() }))
            .build()
    }

    pub fn cancel(&self) -> Result<Envelope, EnvelopeError> {
        EnvelopeBuilder::new(Kind::ReasoningCancel)
            .from(self.from.clone())
            .context(self.context.to_string())
            .build()
    }
}
