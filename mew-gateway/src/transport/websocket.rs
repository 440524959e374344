//! Axum WebSocket transport: one upgrade handler per space, with a
//! dedicated send task and a receive loop per connection.

use std::sync::Arc;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::connection::{broadcast_presence, broadcast_stream_close, capability_values, ConnectionContext};
use crate::gateway::Gateway;
use crate::participant::{ConnectionState, OutboundFrame, Participant};
use crate::stream_manager;

#[derive(Debug, Deserialize)]
pub struct ConnectQuery {
    pub token: String,
}

pub async fn upgrade(
    Path(space_name): Path<String>,
    Query(query): Query<ConnectQuery>,
    State(gateway): State<Arc<Gateway>>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, StatusCode> {
    let space = gateway.space(&space_name).ok_or(StatusCode::NOT_FOUND)?;
    let config = gateway.config();
    let space_config = config.space(&space_name).ok_or(StatusCode::NOT_FOUND)?;
    let participant_config = space_config
        .participant_for_token(&query.token)
        .ok_or(StatusCode::UNAUTHORIZED)?
        .clone();

    Ok(ws.on_upgrade(move |socket| {
        run_connection(socket, space, config, participant_config)
    }))
}

async fn run_connection(
    socket: WebSocket,
    space: Arc<crate::space::Space>,
    config: Arc<crate::config::GatewayConfig>,
    participant_config: crate::config::ParticipantConfig,
) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<OutboundFrame>(config.max_send_queue);

    let runtime_id = Uuid::new_v4().to_string();
    let participant = Arc::new(Participant::new(
        runtime_id.clone(),
        participant_config.id.clone(),
        participant_config.capabilities.clone(),
        outbound_tx,
    ));
    space.join(Arc::clone(&participant));

    let ctx = ConnectionContext {
        space: Arc::clone(&space),
        participant: Arc::clone(&participant),
        config: Arc::clone(&config),
    };

    ctx.send_welcome(&ctx.participant).await;
    participant.set_state(ConnectionState::Ready);
    broadcast_presence(&space, &runtime_id, capability_values(&participant), "join").await;

    let send_task = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            let message = match frame {
                OutboundFrame::Envelope(envelope) => match serde_json::to_string(&envelope) {
                    Ok(text) => WsMessage::Text(text.into()),
                    Err(e) => {
                        tracing::error!(error = %e, "failed to serialize outbound envelope");
                        continue;
                    }
                },
                OutboundFrame::Stream { stream_id, bytes } => {
                    WsMessage::Binary(stream_manager::frame(&stream_id, &bytes).into())
                }
                OutboundFrame::Close => break,
            };
            if ws_sender.send(message).await.is_err() {
                break;
            }
        }
    });

    while let Some(message) = ws_receiver.next().await {
        match message {
            Ok(WsMessage::Text(text)) => ctx.handle_text(&text).await,
            Ok(WsMessage::Binary(data)) => ctx.handle_binary(&data).await,
            Ok(WsMessage::Close(_)) => break,
            Ok(WsMessage::Ping(_) | WsMessage::Pong(_)) => {}
            Err(e) => {
                tracing::debug!(participant = %runtime_id, error = %e, "websocket error, closing connection");
                break;
            }
        }
    }

    send_task.abort();
    participant.set_state(ConnectionState::Draining);
    let closed_streams = space.leave(&runtime_id);
    for stream_id in &closed_streams {
        broadcast_stream_close(&space, stream_id, "owner_disconnected").await;
    }
    broadcast_presence(&space, &runtime_id, capability_values(&participant), "leave").await;
    participant.set_state(ConnectionState::Closed);
}
