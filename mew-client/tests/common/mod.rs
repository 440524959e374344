//! Boots a real in-process gateway for `mew-client` integration tests,
//! mirroring `mew-gateway`'s own test harness.

use std::net::SocketAddr;
use std::sync::Arc;

use mew_gateway::config::{GatewayConfig, ParticipantConfig, SpaceConfig};
use mew_gateway::gateway::Gateway;
use mew_gateway::transport;
use tokio::net::TcpListener;

pub struct TestGateway {
    pub addr: SocketAddr,
    pub ws_path: String,
}

pub async fn spawn(space: SpaceConfig) -> TestGateway {
    let config = GatewayConfig::builder().bind_addr("127.0.0.1:0").space(space).build();
    let gateway = Arc::new(Gateway::new(config.clone()));
    let app = transport::router(Arc::clone(&gateway), &config);
    let listener = TcpListener::bind(&config.bind_addr).await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    TestGateway { addr, ws_path: config.ws_path }
}

pub fn participant(id: &str, token: &str, capabilities: Vec<serde_json::Value>) -> ParticipantConfig {
    ParticipantConfig {
        id: id.to_string(),
        token: token.to_string(),
        capabilities,
    }
}

pub fn gateway_url(gateway: &TestGateway) -> String {
    format!("ws://{}{}", gateway.addr, gateway.ws_path)
}
