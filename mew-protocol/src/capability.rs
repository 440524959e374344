//! The capability pattern matcher: a recursive JSON-tree subset check.
//!
//! A capability is a JSON value shaped like the envelopes it is meant to
//! authorize, e.g.
//!
//! ```json
//! { "kind": "mcp/request", "payload": { "method": "tools/*" } }
//! ```
//!
//! Matching is structural, not a regex over the serialized envelope: an
//! object pattern only constrains the keys it names (unlisted keys in the
//! candidate are unconstrained), string leaves support a single trailing
//! `*` wildcard, and array patterns require every pattern element to be
//! covered by some element of the candidate array. The same relation,
//! read the other way, is also how the gateway decides whether one grant
//! is no broader than another (e.g. a participant re-granting a
//! capability it holds to someone else).

use serde_json::Value;

/// A capability pattern: a JSON value used as a cover for concrete
/// envelope shapes (or for other, narrower patterns).
#[derive(Debug, Clone, PartialEq)]
pub struct CapabilityPattern(Value);

impl CapabilityPattern {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Does `candidate` (a concrete envelope shape, e.g.
    /// `{"kind": "...", "payload": {...}}`) satisfy this pattern?
    pub fn allows(&self, candidate: &Value) -> bool {
        subset(candidate, &self.0)
    }

    /// Is `self` covered by `other` — i.e. would every concrete value this
    /// pattern allows also be allowed by `other`? Used when a participant
    /// grants a capability to check it does not exceed its own.
    pub fn covered_by(&self, other: &CapabilityPattern) -> bool {
        subset(&self.0, &other.0)
    }
}

/// Is `narrower` wholly covered by `broader`?
///
/// This single relation serves both "does this concrete envelope satisfy
/// this capability" (treat the envelope as `narrower`) and "is this grant
/// no broader than that one" (treat both sides as patterns).
pub fn subset(narrower: &Value, broader: &Value) -> bool {
    match (narrower, broader) {
        (_, Value::String(b)) if b == "*" => true,
        (Value::String(a), Value::String(b)) => glob_contains(b, a),
        (Value::Object(a), Value::Object(b)) => b
            .iter()
            .all(|(key, bv)| a.get(key).is_some_and(|av| subset(av, bv))),
        (Value::Array(a), Value::Array(b)) => {
            a.iter().all(|av| b.iter().any(|bv| subset(av, bv)))
        }
        (a, b) => a == b,
    }
}

/// Trailing-wildcard glob containment: does `pattern` cover `candidate`?
/// `"tools/*"` covers `"tools/search"`; `"*"` covers everything; a
/// wildcard on the candidate side can only be covered by an identical or
/// broader wildcard on the pattern side.
fn glob_contains(pattern: &str, candidate: &str) -> bool {
    match (pattern.strip_suffix('*'), candidate.strip_suffix('*')) {
        (Some(p_prefix), Some(c_prefix)) => c_prefix.starts_with(p_prefix),
        (Some(p_prefix), None) => candidate.starts_with(p_prefix),
        (None, Some(_)) => false,
        (None, None) => pattern == candidate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wildcard_string_matches_anything() {
        assert!(subset(&json!("anything"), &json!("*")));
    }

    #[test]
    fn trailing_glob_matches_prefix() {
        let pattern = CapabilityPattern::new(json!({"kind": "mcp/request", "payload": {"method": "tools/*"}}));
        assert!(pattern.allows(&json!({"kind": "mcp/request", "payload": {"method": "tools/search", "params": {}}})));
        assert!(!pattern.allows(&json!({"kind": "mcp/request", "payload": {"method": "resources/read"}})));
    }

    #[test]
    fn unconstrained_keys_are_ignored() {
        let pattern = CapabilityPattern::new(json!({"kind": "chat"}));
        assert!(pattern.allows(&json!({"kind": "chat", "payload": {"text": "hi"}, "to": ["room"]})));
    }

    #[test]
    fn missing_constrained_key_fails() {
        let pattern = CapabilityPattern::new(json!({"kind": "mcp/request", "payload": {"method": "tools/call"}}));
        assert!(!pattern.allows(&json!({"kind": "mcp/request"})));
    }

    #[test]
    fn array_pattern_requires_each_element_covered() {
        let pattern = CapabilityPattern::new(json!({"to": ["agent-*"]}));
        assert!(pattern.allows(&json!({"to": ["agent-1", "agent-2"]})));
        assert!(!pattern.allows(&json!({"to": ["agent-1", "human-1"]})));
    }

    #[test]
    fn grant_cannot_exceed_granter_capability() {
        let broad = CapabilityPattern::new(json!({"kind": "mcp/*"}));
        let narrow = CapabilityPattern::new(json!({"kind": "mcp/request"}));
        assert!(narrow.covered_by(&broad));
        assert!(!broad.covered_by(&narrow));
    }

    #[test]
    fn sibling_wildcards_do_not_subsume_each_other() {
        let a = CapabilityPattern::new(json!({"kind": "mcp/request", "payload": {"method": "tools/*"}}));
        let b = CapabilityPattern::new(json!({"kind": "mcp/request", "payload": {"method": "resources/*"}}));
        assert!(!a.covered_by(&b));
    }
}
