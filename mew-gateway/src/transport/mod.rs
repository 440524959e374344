//! Wire transports: the WebSocket connection loop every participant
//! runtime speaks, and the HTTP injection endpoint for one-shot sends.

pub mod http_inject;
pub mod websocket;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use crate::gateway::Gateway;

/// Build the Axum router for a fully-configured gateway.
pub fn router(gateway: Arc<Gateway>, config: &crate::config::GatewayConfig) -> Router {
    let ws_path = format!("{}/{{space}}", config.ws_path.trim_end_matches('/'));
    let inject_path = format!("{}/{{space}}", config.inject_path.trim_end_matches('/'));
    Router::new()
        .route(&ws_path, get(websocket::upgrade))
        .route(&inject_path, post(http_inject::inject))
        .with_state(gateway)
}
