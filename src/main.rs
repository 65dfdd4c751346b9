//! Registrar Gateway - secure request gateway for the student records system

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use registrar_gateway::{config::Args, server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    // Parse command line arguments
    let args = Args::parse();

    // Initialize tracing/logging
    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("registrar_gateway={},info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Validate configuration
    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    // Print startup banner
    info!("======================================");
    info!("  Registrar Gateway");
    info!("======================================");
    info!("Node ID: {}", args.node_id);
    info!("Listen: {}", args.listen);
    info!("Backend: {}", args.backend_base());
    info!("UI upstream: {}", args.ui_base());
    info!(
        "Key material: {}",
        if args.rsa_public_pem.is_some() {
            "configured PEM"
        } else {
            "generated on first use"
        }
    );
    info!(
        "Mode: {}",
        if args.auth_debug { "AUTH DEBUG" } else { "PRODUCTION" }
    );
    info!("======================================");

    if args.auth_debug {
        warn!(
            "Auth debug mode enabled - logins resolve against {}",
            args.accounts_file
        );
    }

    let state = Arc::new(server::AppState::new(args));

    server::run(state).await?;

    Ok(())
}
