//! Curavox server entry point.
//!
//! Binary name: `curavox`
//!
//! Parses CLI arguments, loads configuration, wires the provider
//! gateways and session registry, then serves the HTTP/WebSocket API
//! until interrupted.

mod http;
mod state;

use std::path::PathBuf;

use clap::Parser;

use state::AppState;

#[derive(Debug, Parser)]
#[command(
    name = "curavox",
    about = "Real-time conversational voice agent backend",
    version
)]
struct Cli {
    /// Path to the configuration file.
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// Override the listen host from the config file.
    #[arg(long)]
    host: Option<String>,

    /// Override the listen port from the config file.
    #[arg(long)]
    port: Option<u16>,

    /// Export spans via OpenTelemetry (stdout exporter).
    #[arg(long)]
    otel: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    curavox_observe::tracing_setup::init_tracing(cli.otel)
        .map_err(|err| anyhow::anyhow!("failed to initialize tracing: {err}"))?;

    let mut config = curavox_infra::config::load_config(&cli.config).await;
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    let state = AppState::init(&config)?;
    let router = http::router::build_router(state, &config);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "Curavox listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    curavox_observe::tracing_setup::shutdown_tracing();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!("failed to listen for shutdown signal: {err}");
    }
    tracing::info!("shutdown signal received");
}
