//! Resolve the names in an envelope's `to` list against a space's
//! participants. Names may be either the gateway-assigned runtime id or
//! the participant's configured logical name.

use std::sync::Arc;

use crate::participant::Participant;
use crate::space::Space;

/// The outcome of resolving a `to` list: participants that were found,
/// and names that matched nobody currently in the space.
pub struct Resolution {
    pub resolved: Vec<Arc<Participant>>,
    pub unresolved: Vec<String>,
}

impl Resolution {
    /// The gateway only notifies the sender of unknown recipients when
    /// the send resolved to nobody at all, not when it partially
    /// resolved.
    pub fn fully_unresolved(&self) -> bool {
        self.resolved.is_empty() && !self.unresolved.is_empty()
    }
}

pub fn resolve(space: &Space, names: &[String]) -> Resolution {
    let mut resolved = Vec::with_capacity(names.len());
    let mut unresolved = Vec::new();
    for name in names {
        match space.resolve(name) {
            Some(p) => resolved.push(p),
            None => unresolved.push(name.clone()),
        }
    }
    Resolution { resolved, unresolved }
}
