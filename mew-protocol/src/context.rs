//! `context` is a `/`-separated path used to group a request with the
//! proposals, reasoning, and streams it spawned. It is opaque to
//! routing — the gateway never inspects it beyond the invariants below
//! — but well-formedness is still worth enforcing close to the type so
//! every caller gets the same rules.

use std::fmt;

use crate::error::EnvelopeError;

/// A validated context path, e.g. `root/child/grandchild`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Context(String);

impl Context {
    /// Parse and validate a context path: non-empty, no leading/trailing
    /// or doubled `/`, no empty segments.
    pub fn parse(raw: &str) -> Result<Self, EnvelopeError> {
        if raw.is_empty() || raw.starts_with('/') || raw.ends_with('/') {
            return Err(EnvelopeError::Invalid(format!("malformed context {raw:?}")));
        }
        if raw.split('/').any(str::is_empty) {
            return Err(EnvelopeError::Invalid(format!("malformed context {raw:?}")));
        }
        Ok(Context(raw.to_string()))
    }

    pub fn root(segment: impl Into<String>) -> Self {
        Context(segment.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }

    /// Append a child segment, e.g. `root`.child("proposal-1")` ->
    /// `root/proposal-1`.
    pub fn child(&self, segment: impl AsRef<str>) -> Self {
        Context(format!("{}/{}", self.0, segment.as_ref()))
    }

    /// The parent path, or `None` if this is a root (single-segment)
    /// context.
    pub fn parent(&self) -> Option<Context> {
        self.0.rsplit_once('/').map(|(head, _)| Context(head.to_string()))
    }

    /// Whether `self` is `other` or nested under it.
    pub fn is_within(&self, other: &Context) -> bool {
        self.0 == other.0 || self.0.starts_with(&format!("{}/", other.0))
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_paths() {
        assert!(Context::parse("").is_err());
        assert!(Context::parse("/root").is_err());
        assert!(Context::parse("root/").is_err());
        assert!(Context::parse("root//child").is_err());
    }

    #[test]
    fn child_and_parent_round_trip() {
        let root = Context::root("root");
        let child = root.child("proposal-1");
        assert_eq!(child.as_str(), "root/proposal-1");
        assert_eq!(child.parent().unwrap(), root);
    }

    #[test]
    fn is_within_covers_self_and_descendants() {
        let root = Context::parse("root").unwrap();
        let child = Context::parse("root/child").unwrap();
        let sibling = Context::parse("rootless").unwrap();
        assert!(root.is_within(&root));
        assert!(child.is_within(&root));
        assert!(!sibling.is_within(&root));
    }
}
