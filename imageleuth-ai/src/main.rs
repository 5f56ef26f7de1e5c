//! imageleuth-ai - receipt recognition service
//!
//! Accepts batches of payment-receipt images over HTTP, extracts expense
//! fields with a vision model, audits every batch in SQLite and exports the
//! results as a spreadsheet or a renamed-file archive.

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use imageleuth_ai::services::{workspace, VisionClient};
use imageleuth_ai::AppState;
use imageleuth_common::config::{RootFolderInitializer, RootFolderResolver, TomlConfig};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "imageleuth-ai")]
#[command(about = "Receipt recognition service")]
#[command(version)]
struct Args {
    /// Data folder (database, batch workspaces, exports)
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    /// Address to listen on (default 0.0.0.0:5000)
    #[arg(short, long, env = "IMAGELEUTH_BIND")]
    bind: Option<String>,

    /// Explicit path to imageleuth.toml
    #[arg(short, long, env = "IMAGELEUTH_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Config decides the log filter, so it is loaded under a bootstrap subscriber
    let config = tracing::subscriber::with_default(
        tracing_subscriber::fmt().finish(),
        || TomlConfig::load_or_default(args.config.as_deref()),
    );

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::try_new(&config.logging.level).unwrap_or_else(|e| {
                eprintln!("Invalid log filter {:?}: {}", config.logging.level, e);
                EnvFilter::new("info")
            })
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        git_hash = env!("GIT_HASH"),
        build_timestamp = env!("BUILD_TIMESTAMP"),
        profile = env!("BUILD_PROFILE"),
        "Starting imageleuth-ai"
    );

    // Root folder: CLI → ENV → TOML → default
    let root_folder = RootFolderResolver::new()
        .with_cli_arg(args.root_folder.clone())
        .with_toml(&config)
        .resolve();

    let initializer = RootFolderInitializer::new(root_folder);
    initializer
        .ensure_directory_exists()
        .context("Failed to initialize root folder")?;
    info!(root_folder = %initializer.root().display(), "Root folder ready");

    let db_path = initializer.database_path();
    let db_pool = imageleuth_ai::db::init_database_pool(&db_path)
        .await
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;
    info!(database = %db_path.display(), "Database connection established");

    let interrupted = imageleuth_ai::db::sessions::cleanup_stale_sessions(&db_pool)
        .await
        .context("Failed to recover interrupted sessions")?;
    if interrupted > 0 {
        warn!(sessions = interrupted, "Sessions interrupted by previous shutdown marked as error");
    }

    match workspace::purge_stale_workspaces(&initializer.temp_dir()).await {
        Ok(0) => {}
        Ok(removed) => info!(removed, "Stale batch workspaces removed"),
        Err(e) => warn!(error = %e, "Failed to purge stale batch workspaces"),
    }

    let api_key = imageleuth_ai::config::resolve_api_key(&config)?;
    let vision_client = VisionClient::new(api_key, &config.recognizer)
        .context("Failed to create vision client")?;
    info!(
        model = %config.recognizer.model,
        endpoint = %config.recognizer.endpoint,
        "Vision client initialized"
    );

    let bind_address = args.bind.clone().unwrap_or_else(|| config.bind_address());
    let addr: SocketAddr = bind_address
        .parse()
        .with_context(|| format!("Invalid bind address: {}", bind_address))?;

    let state = AppState::new(
        db_pool,
        config,
        Arc::new(vision_client),
        &initializer.temp_dir(),
        &initializer.output_dir(),
    );
    let app = imageleuth_ai::build_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/api/health", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
