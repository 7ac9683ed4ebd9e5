//! kb-gateway binary: load configuration, build state, serve HTTP.

use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;

use kb_gateway::config::{Cli, Config};
use kb_gateway::server::{build_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments.
    let cli = Cli::parse();

    // Initialize tracing/logging.
    let filter = if cli.verbose {
        "kb_gateway=debug,tower_http=debug"
    } else {
        "kb_gateway=info,tower_http=info"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| filter.into());

    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }

    info!("kb-gateway v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration.
    let config = Config::load(&cli.config)?.with_cli_overrides(&cli);
    config.validate()?;

    info!(
        knowledge_dir = %config.storage.knowledge_dir.display(),
        chunk_size = config.ingest.chunk_size,
        chunk_overlap = config.ingest.chunk_overlap,
        top_k = config.retrieval.top_k,
        "Configuration loaded"
    );

    tokio::fs::create_dir_all(&config.storage.knowledge_dir).await?;

    let listen_addr = config.server.listen.clone();
    let state = Arc::new(AppState::new(config)?);

    // Build the HTTP router.
    let app = build_router(state);

    // Start the server.
    info!(addr = %listen_addr, "Starting server");
    let listener = TcpListener::bind(&listen_addr).await?;
    info!("Listening on {listen_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
