//! Stream lifecycle: `stream/request` -> `stream/open` ->
//! binary frames -> `stream/close`, plus the `#<stream_id>#<bytes>`
//! binary frame prefix used once a stream is open.

use mew_protocol::EnvelopeError;
use uuid::Uuid;

use crate::error::{GatewayError, GatewayResult};
use crate::space::Space;

/// Mint a stream id and register it as owned by `owner_runtime_id`,
/// enforcing the per-participant concurrent stream limit. `request`
/// carries the `stream/request` payload fields that describe the
/// stream, surfaced later in `system/welcome.active_streams`.
pub fn open(
    space: &Space,
    owner_runtime_id: &str,
    max_streams: usize,
    request: &mew_protocol::payload::StreamRequestPayload,
) -> GatewayResult<String> {
    let current = space.stream_count_for(owner_runtime_id);
    if current >= max_streams {
        return Err(GatewayError::Backpressure {
            resource: "open streams".to_string(),
            current,
            max: max_streams,
        });
    }
    let stream_id = Uuid::new_v4().to_string();
    space.open_stream(
        stream_id.clone(),
        owner_runtime_id.to_string(),
        request.direction.clone(),
        request.content_type.clone(),
        request.format.clone(),
        request.description.clone(),
        request.extra.clone(),
        mew_protocol::now_rfc3339(),
    );
    Ok(stream_id)
}

pub fn close(space: &Space, stream_id: &str) -> GatewayResult<()> {
    space
        .close_stream(stream_id)
        .map(|_| ())
        .ok_or_else(|| GatewayError::StreamNotFound(stream_id.to_string()))
}

/// Whether a stream id is currently open, gating binary frame relay.
pub fn exists(space: &Space, stream_id: &str) -> bool {
    space.stream(stream_id).is_some()
}

/// Split a `#<stream_id>#<bytes>` binary frame into its stream id and
/// payload.
pub fn parse_frame(data: &[u8]) -> GatewayResult<(&str, &[u8])> {
    if data.first() != Some(&b'#') {
        return Err(GatewayError::Envelope(EnvelopeError::Invalid(
            "binary frame missing leading '#'".to_string(),
        )));
    }
    let rest = &data[1..];
    let sep = rest
        .iter()
        .position(|&b| b == b'#')
        .ok_or_else(|| GatewayError::Envelope(EnvelopeError::Invalid("binary frame missing stream id separator".to_string())))?;
    let stream_id = std::str::from_utf8(&rest[..sep])
        .map_err(|_| GatewayError::Envelope(EnvelopeError::Invalid("stream id is not valid utf-8".to_string())))?;
    Ok((stream_id, &rest[sep + 1..]))
}

/// Build a `#<stream_id>#<bytes>` frame.
pub fn frame(stream_id: &str, bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(stream_id.len() + bytes.len() + 2);
    out.push(b'#');
    out.extend_from_slice(stream_id.as_bytes());
    out.push(b'#');
    out.extend_from_slice(bytes);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_round_trips() {
        let framed = frame("abc-123", b"hello");
        let (id, payload) = parse_frame(&framed).unwrap();
        assert_eq!(id, "abc-123");
        assert_eq!(payload, b"hello");
    }

    #[test]
    fn parse_rejects_missing_prefix() {
        assert!(parse_frame(b"hello").is_err());
    }

    #[test]
    fn parse_rejects_missing_separator() {
        assert!(parse_frame(b"#abc-123").is_err());
    }

    fn request(direction: &str) -> mew_protocol::payload::StreamRequestPayload {
        mew_protocol::payload::StreamRequestPayload {
            direction: direction.to_string(),
            content_type: None,
            format: None,
            description: None,
            extra: serde_json::Map::new(),
        }
    }

    #[test]
    fn open_enforces_per_participant_limit() {
        let space = Space::new("demo");
        assert!(open(&space, "r1", 1, &request("upload")).is_ok());
        assert!(matches!(
            open(&space, "r1", 1, &request("upload")),
            Err(GatewayError::Backpressure { .. })
        ));
    }

    #[test]
    fn open_preserves_unmodeled_request_fields() {
        let space = Space::new("demo");
        let mut req = request("upload");
        req.extra.insert("expected_size_bytes".to_string(), serde_json::json!(2048));
        req.extra.insert("metadata".to_string(), serde_json::json!({"run_id": "r-9"}));
        let stream_id = open(&space, "r1", 4, &req).unwrap();
        let active = space.active_streams();
        let entry = active.iter().find(|s| s.stream_id == stream_id).unwrap();
        assert_eq!(entry.extra, req.extra);
    }

    #[test]
    fn close_unknown_stream_errors() {
        let space = Space::new("demo");
        assert!(matches!(close(&space, "nope"), Err(GatewayError::StreamNotFound(_))));
    }
}
