//! Reconnecting WebSocket transport for a participant runtime.
//!
//! Exponential backoff with jitter for reconnect attempts, and a split
//! read/write connection loop mirroring `mew-gateway`'s own socket
//! plumbing — `tokio-tungstenite` in place of `axum::extract::ws`.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use mew_protocol::{Envelope, RawEnvelope};

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};

/// Connection lifecycle, mirroring the gateway's own `ConnectionState`
/// but from the participant's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Ready,
    Reconnecting,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum StateCode {
    Connecting = 0,
    Ready = 1,
    Reconnecting = 2,
    Closed = 3,
}

impl From<StateCode> for ConnectionState {
    fn from(code: StateCode) -> Self {
        match code {
            StateCode::Connecting => ConnectionState::Connecting,
            StateCode::Ready => ConnectionState::Ready,
            StateCode::Reconnecting => ConnectionState::Reconnecting,
            StateCode::Closed => ConnectionState::Closed,
        }
    }
}

/// What the read loop hands back to the owning `Client` for each inbound
/// frame. Stream binary frames are handed over raw; envelopes are
/// validated (minimally — the gateway is the trust boundary here, so a
/// client only needs a well-formed JSON envelope, not a re-run of the
/// full `canonicalize` identity check).
pub enum Inbound {
    Envelope(Envelope),
    Stream { stream_id: String, bytes: Vec<u8> },
}

/// Handle to the live connection's outbound half plus its reported state.
pub struct Connection {
    outbound_tx: mpsc::Sender<WsMessage>,
    state: Arc<AtomicU8>,
}

impl Connection {
    pub fn state(&self) -> ConnectionState {
        match self.state.load(Ordering::Relaxed) {
            0 => ConnectionState::Connecting,
            1 => ConnectionState::Ready,
            2 => ConnectionState::Reconnecting,
            _ => ConnectionState::Closed,
        }
    }

    pub async fn send(&self, envelope: &Envelope) -> ClientResult<()> {
        let text = serde_json::to_string(envelope).map_err(|e| ClientError::Envelope(
            mew_protocol::EnvelopeError::Invalid(e.to_string()),
        ))?;
        self.outbound_tx
            .send(WsMessage::Text(text.into()))
            .await
            .map_err(|_| ClientError::Disconnected)
    }

    pub async fn send_stream_frame(&self, stream_id: &str, bytes: &[u8]) -> ClientResult<()> {
        let mut frame = Vec::with_capacity(stream_id.len() + bytes.len() + 2);
        frame.push(b'#');
        frame.extend_from_slice(stream_id.as_bytes());
        frame.push(b'#');
        frame.extend_from_slice(bytes);
        self.outbound_tx
            .send(WsMessage::Binary(frame.into()))
            .await
            .map_err(|_| ClientError::Disconnected)
    }
}

fn set_state(state: &Arc<AtomicU8>, code: StateCode) {
    state.store(code as u8, Ordering::Relaxed);
}

/// Connect once, then drive send/receive loops until the socket drops.
/// Returns when the connection closes (cleanly or not) so the caller's
/// reconnect loop can decide what to do next.
async fn run_once(
    config: &ClientConfig,
    state: &Arc<AtomicU8>,
    outbound_rx: &mut mpsc::Receiver<WsMessage>,
    on_inbound: &(dyn Fn(Inbound) + Send + Sync),
) -> ClientResult<()> {
    let (socket, _response) = tokio_tungstenite::connect_async(config.connect_url()).await?;
    let (mut ws_sender, mut ws_receiver) = socket.split();
    set_state(state, StateCode::Ready);
    tracing::info!(url = %config.gateway_url, space = %config.space, "connected to gateway");

    let mut heartbeat = tokio::time::interval(config.heartbeat_interval);
    heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    heartbeat.tick().await; // first tick fires immediately; skip it
    let mut last_pong = tokio::time::Instant::now();

    loop {
        tokio::select! {
            _ = heartbeat.tick() => {
                if last_pong.elapsed() > config.heartbeat_timeout {
                    tracing::warn!("no pong within heartbeat timeout, dropping connection");
                    return Ok(());
                }
                if ws_sender.send(WsMessage::Ping(Vec::new().into())).await.is_err() {
                    return Ok(());
                }
            }
            outbound = outbound_rx.recv() => {
                match outbound {
                    Some(message) => {
                        if ws_sender.send(message).await.is_err() {
                            return Ok(());
                        }
                    }
                    // the `Connection` handle was dropped: no more sends possible
                    None => return Ok(()),
                }
            }
            inbound = ws_receiver.next() => {
                match inbound {
                    Some(Ok(WsMessage::Text(text))) => match serde_json::from_str::<RawEnvelope>(&text) {
                        Ok(raw) => match into_envelope(raw) {
                            Ok(envelope) => on_inbound(Inbound::Envelope(envelope)),
                            Err(e) => tracing::warn!(error = %e, "dropping malformed envelope from gateway"),
                        },
                        Err(e) => tracing::warn!(error = %e, "non-JSON text frame from gateway"),
                    },
                    Some(Ok(WsMessage::Binary(data))) => {
                        if let Some((stream_id, bytes)) = parse_stream_frame(&data) {
                            on_inbound(Inbound::Stream { stream_id, bytes });
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | None => return Ok(()),
                    Some(Ok(WsMessage::Pong(_))) => {
                        last_pong = tokio::time::Instant::now();
                    }
                    Some(Ok(WsMessage::Ping(_) | WsMessage::Frame(_))) => {}
                    Some(Err(e)) => {
                        tracing::debug!(error = %e, "websocket error, dropping connection");
                        return Ok(());
                    }
                }
            }
        }
    }
}

/// A client-local mirror of [`mew_protocol::envelope::canonicalize`]
/// that trusts the gateway's `from` stamp instead of re-deriving it —
/// the gateway is the authority on identity from the participant's side
/// of the wire.
fn into_envelope(raw: RawEnvelope) -> ClientResult<Envelope> {
    let kind = raw
        .kind
        .parse()
        .map_err(|_| mew_protocol::EnvelopeError::Invalid(format!("unknown kind {:?}", raw.kind)))?;
    let correlation_id = match raw.correlation_id {
        None => None,
        Some(serde_json::Value::Array(items)) => Some(
            items
                .into_iter()
                .map(|v| v.as_str().map(str::to_string))
                .collect::<Option<Vec<_>>>()
                .ok_or(mew_protocol::EnvelopeError::BadCorrelationId)?,
        ),
        Some(_) => return Err(mew_protocol::EnvelopeError::BadCorrelationId.into()),
    };
    Ok(Envelope {
        protocol: raw.protocol,
        id: raw.id.unwrap_or_default(),
        ts: raw.ts.unwrap_or_default(),
        from: raw.from.unwrap_or_default(),
        to: raw.to,
        kind,
        correlation_id,
        context: raw.context,
        payload: raw.payload.unwrap_or_else(|| serde_json::json!({})),
    })
}

fn parse_stream_frame(data: &[u8]) -> Option<(String, Vec<u8>)> {
    if data.first() != Some(&b'#') {
        return None;
    }
    let rest = &data[1..];
    let sep = rest.iter().position(|b| *b == b'#')?;
    let stream_id = std::str::from_utf8(&rest[..sep]).ok()?.to_string();
    Some((stream_id, rest[sep + 1..].to_vec()))
}

/// Spawn the reconnect-forever supervisor task. Returns a [`Connection`]
/// handle immediately; the first connection attempt happens in the
/// background, so early sends queue in the channel until it succeeds.
pub fn spawn(
    config: ClientConfig,
    on_inbound: impl Fn(Inbound) + Send + Sync + 'static,
    on_disconnect: impl Fn() + Send + Sync + 'static,
) -> Connection {
    let state = Arc::new(AtomicU8::new(StateCode::Connecting as u8));
    let (outbound_tx, outbound_rx) = mpsc::channel(config.max_pending_requests.max(32));

    let task_state = Arc::clone(&state);
    tokio::spawn(async move {
        let mut outbound_rx = outbound_rx;
        let mut attempt = 0u32;
        loop {
            match run_once(&config, &task_state, &mut outbound_rx, &on_inbound).await {
                Ok(()) => {}
                Err(e) => tracing::warn!(error = %e, "connection attempt failed"),
            }
            on_disconnect();

            if config.reconnect.exhausted(attempt) {
                set_state(&task_state, StateCode::Closed);
                tracing::error!("reconnect attempts exhausted, giving up");
                break;
            }
            set_state(&task_state, StateCode::Reconnecting);
            let delay = config.reconnect.calculate_delay(attempt);
            tracing::info!(attempt, delay_ms = delay.as_millis() as u64, "reconnecting");
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    });

    Connection { outbound_tx, state }
}
