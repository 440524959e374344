//! The gateway's process-level entry point: binds a listener, serves the
//! Axum router, and shuts down cleanly on SIGINT/SIGTERM.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;

use mew_protocol::{EnvelopeBuilder, ErrorCode, Kind};

use crate::config::GatewayConfig;
use crate::connection::GATEWAY_RUNTIME_ID;
use crate::error::GatewayResult;
use crate::gateway::Gateway;
use crate::participant::OutboundFrame;
use crate::transport;

pub struct GatewayServer {
    gateway: Arc<Gateway>,
    config: Arc<GatewayConfig>,
}

impl GatewayServer {
    pub fn new(config: GatewayConfig) -> Self {
        let gateway = Arc::new(Gateway::new(config.clone()));
        Self { gateway, config: Arc::new(config) }
    }

    pub fn gateway(&self) -> Arc<Gateway> {
        Arc::clone(&self.gateway)
    }

    /// Bind and serve until a shutdown signal arrives. Once one does, every
    /// connected participant is told `peer_disconnected` / reason
    /// `server_shutdown` and given `shutdown_grace` to read it before its
    /// connection is closed and the listener stops accepting new ones.
    pub async fn run(self) -> GatewayResult<()> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        tracing::info!(addr = %self.config.bind_addr, "gateway listening");
        let app = transport::router(Arc::clone(&self.gateway), &self.config);
        let gateway = Arc::clone(&self.gateway);
        let grace = Duration::from_secs(self.config.shutdown_grace_secs);
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown_signal().await;
                notify_and_close(&gateway, grace).await;
            })
            .await?;
        tracing::info!("gateway shut down cleanly");
        Ok(())
    }
}

async fn notify_and_close(gateway: &Gateway, grace: Duration) {
    let participants = gateway.all_participants();
    tracing::info!(count = participants.len(), "notifying connections of shutdown");
    let Ok(notice) = EnvelopeBuilder::new(Kind::SystemError)
        .from(GATEWAY_RUNTIME_ID)
        .payload(serde_json::json!({
            "error": ErrorCode::PeerDisconnected,
            "message": "gateway shutting down",
            "reason": "server_shutdown",
        }))
        .build()
    else {
        return;
    };
    for participant in &participants {
        let _ = participant.send(OutboundFrame::Envelope(notice.clone())).await;
    }
    tokio::time::sleep(grace).await;
    for participant in &participants {
        let _ = participant.send(OutboundFrame::Close).await;
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        let _ = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received ctrl-c, shutting down"),
        _ = terminate => tracing::info!("received sigterm, shutting down"),
    }
}
