use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ticketr::assistant::AssistantClient;
use ticketr::config::Config;
use ticketr::AppState;

#[derive(Parser, Debug)]
#[command(name = "ticketr")]
#[command(author, version, about = "A lightweight helpdesk ticketing backend", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "ticketr.toml")]
    config: PathBuf,

    /// Override log level
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(&cli.config)?;

    // Initialize logging
    let log_level = cli
        .log_level
        .as_ref()
        .unwrap_or(&config.logging.level)
        .clone();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Ticketr v{}", env!("CARGO_PKG_VERSION"));

    // Ensure data directory exists
    std::fs::create_dir_all(&config.server.data_dir)?;

    // Initialize database
    let db = ticketr::db::init(&config.server.data_dir).await?;

    // Seed the bootstrap admin account (if configured) and the synthetic
    // assistant user that AI replies are attributed to
    ticketr::api::auth::ensure_admin_user(
        &db,
        config.auth.admin_email.as_deref(),
        config.auth.admin_password.as_deref(),
    )
    .await?;
    let assistant_user_id = ticketr::api::auth::ensure_assistant_user(&db).await?;

    // External assistant client (disabled when no API key is configured)
    let assistant = AssistantClient::new(config.assistant.clone())?;
    if assistant.is_enabled() {
        tracing::info!(model = %config.assistant.model, "AI assistant enabled");
    } else {
        tracing::warn!("No assistant API key configured; AI triage disabled");
    }

    // Create app state
    let state = Arc::new(AppState::new(
        config.clone(),
        db.clone(),
        assistant,
        assistant_user_id,
    ));

    let app = ticketr::api::create_router(state);

    let api_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&api_addr).await?;

    tracing::info!("API server listening on http://{}", api_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
