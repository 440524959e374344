//! Capability enforcement: does the sender's capability set cover this
//! envelope, and — separately — is a capability grant no broader than
//! the grantor already holds.

use mew_protocol::{CapabilityPattern, Envelope, Kind, Payload};
use serde_json::json;

use crate::error::{GatewayError, GatewayResult};
use crate::participant::Participant;

/// The `{"kind": ..., "payload": {...}}` shape capability patterns are
/// written against.
fn candidate_shape(envelope: &Envelope) -> serde_json::Value {
    json!({ "kind": envelope.kind.as_str(), "payload": envelope.payload })
}

/// Every envelope a participant emits must be covered by its effective
/// capabilities, `system/*` excepted (the gateway is the only emitter of
/// those, and they never pass through this check). `capability/grant-ack`
/// is also exempt: it is the mandatory acknowledgement of a grant the
/// gateway itself delivered, not an action the recipient's capability set
/// opts into.
pub fn check(envelope: &Envelope, sender: &Participant) -> GatewayResult<()> {
    if envelope.kind.is_reserved() || envelope.kind == Kind::CapabilityGrantAck {
        return Ok(());
    }
    let candidate = candidate_shape(envelope);
    if sender.allows(&candidate) {
        Ok(())
    } else {
        Err(GatewayError::CapabilityViolation {
            participant: sender.logical_name.clone(),
            kind: envelope.kind.to_string(),
        })
    }
}

/// Apply a `capability/grant`: every pattern in the payload is added to
/// `grantee`'s granted set, provided `granter` itself holds a capability
/// at least as broad. Returns the patterns actually applied.
pub fn apply_grant(
    envelope: &Envelope,
    granter: &Participant,
    grantee: &Participant,
    max_list_len: usize,
) -> GatewayResult<Vec<CapabilityPattern>> {
    let payload = match Payload::parse(Kind::CapabilityGrant, &envelope.payload)? {
        Payload::CapabilityGrant(p) => p,
        _ => unreachable!("checked by Payload::parse(Kind::CapabilityGrant, ..)"),
    };
    if payload.capabilities.len() > max_list_len {
        return Err(GatewayError::Backpressure {
            resource: "capability grant list".to_string(),
            current: payload.capabilities.len(),
            max: max_list_len,
        });
    }
    let mut applied = Vec::with_capacity(payload.capabilities.len());
    for raw_pattern in payload.capabilities {
        let pattern = CapabilityPattern::new(raw_pattern);
        if !granter.covers(&pattern) {
            return Err(GatewayError::CapabilityViolation {
                participant: granter.logical_name.clone(),
                kind: format!("grant of {:?} exceeds granter's own capabilities", pattern.as_value()),
            });
        }
        grantee.grant(pattern.clone(), granter.runtime_id.clone(), envelope.id.clone());
        applied.push(pattern);
    }
    Ok(applied)
}

/// Apply a `capability/revoke`: either remove the single grant named by
/// `grant_id`, or every matching pattern `granter` previously granted to
/// `grantee`. Unlike grants, revocation never fails on a capability
/// mismatch — removing something that was never granted is simply a
/// no-op.
pub fn apply_revoke(envelope: &Envelope, granter: &Participant, grantee: &Participant, max_list_len: usize) -> GatewayResult<usize> {
    let payload = match Payload::parse(Kind::CapabilityRevoke, &envelope.payload)? {
        Payload::CapabilityRevoke(p) => p,
        _ => unreachable!("checked by Payload::parse(Kind::CapabilityRevoke, ..)"),
    };
    if payload.capabilities.len() > max_list_len {
        return Err(GatewayError::Backpressure {
            resource: "capability revoke list".to_string(),
            current: payload.capabilities.len(),
            max: max_list_len,
        });
    }
    if let Some(grant_id) = &payload.grant_id {
        return Ok(grantee.revoke_by_id(grant_id, &granter.runtime_id));
    }
    let mut removed = 0;
    for pattern in &payload.capabilities {
        removed += grantee.revoke(pattern, &granter.runtime_id);
    }
    Ok(removed)
}
