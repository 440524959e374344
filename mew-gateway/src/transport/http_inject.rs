//! HTTP envelope injection: lets a caller without an open WebSocket post
//! a single envelope into a space. It broadcasts/routes exactly like a
//! connected participant's send, but the injector never gets anything
//! echoed back to it — there's no open connection to echo onto, and
//! injected sends get no special-cased delivery to their own author
//! either.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use uuid::Uuid;

use mew_protocol::RawEnvelope;

use crate::connection::ConnectionContext;
use crate::gateway::Gateway;
use crate::participant::{ConnectionState, Participant};

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

pub async fn inject(
    Path(space_name): Path<String>,
    headers: HeaderMap,
    State(gateway): State<Arc<Gateway>>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<Value>), StatusCode> {
    let token = bearer_token(&headers).ok_or(StatusCode::UNAUTHORIZED)?;
    let space = gateway.space(&space_name).ok_or(StatusCode::NOT_FOUND)?;
    let config = gateway.config();
    let space_config = config.space(&space_name).ok_or(StatusCode::NOT_FOUND)?;
    let participant_config = space_config
        .participant_for_token(token)
        .ok_or(StatusCode::UNAUTHORIZED)?
        .clone();

    let raw: RawEnvelope = serde_json::from_value(body).map_err(|_| StatusCode::BAD_REQUEST)?;

    // An ephemeral, unjoined participant: it authenticates and is
    // authorized exactly like a connected one, but never appears in
    // `space.participants()`, so it cannot receive anything back.
    let (tx, mut rx) = mpsc::channel(1);
    let participant = Arc::new(Participant::new(
        Uuid::new_v4().to_string(),
        participant_config.id.clone(),
        participant_config.capabilities.clone(),
        tx,
    ));
    participant.set_state(ConnectionState::Ready);

    let ctx = ConnectionContext { space, participant, config };
    let id = ctx.handle_raw(raw).await;

    match rx.try_recv() {
        Ok(_) => Err(StatusCode::UNPROCESSABLE_ENTITY),
        Err(_) => {
            let id = id.ok_or(StatusCode::UNPROCESSABLE_ENTITY)?;
            Ok((
                StatusCode::ACCEPTED,
                Json(json!({
                    "id": id,
                    "status": "accepted",
                    "timestamp": mew_protocol::now_rfc3339(),
                })),
            ))
        }
    }
}
