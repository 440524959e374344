use clap::Parser;

use mew_gateway::{GatewayConfig, GatewayServer};

/// Run a MEW protocol gateway for one or more configured spaces.
#[derive(Debug, Parser)]
#[command(name = "mew-gateway", version, about)]
struct Cli {
    /// Path to a gateway configuration file (TOML/JSON/YAML, without
    /// extension; `config` crate resolves it).
    #[arg(long, env = "MEW_CONFIG")]
    config: Option<String>,

    /// Address to bind the gateway's HTTP/WebSocket listener to.
    /// Overrides the value from `--config` when given.
    #[arg(long, env = "MEW_BIND_ADDR")]
    bind_addr: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => GatewayConfig::load(path)?,
        None => GatewayConfig::builder().build(),
    };
    if let Some(bind_addr) = cli.bind_addr {
        config.bind_addr = bind_addr;
    }

    GatewayServer::new(config).run().await?;
    Ok(())
}
