//! spk-server - SpoolKeeper filament inventory service
//!
//! Serves the inventory HTTP API and runs the periodic Home Assistant tray
//! sync until interrupted.

use anyhow::{Context, Result};
use clap::Parser;
use spk_common::config::{BootstrapConfig, CliOverrides};
use spk_server::catalog::MaterialCatalog;
use spk_server::reconcile::TrayReconciler;
use spk_server::store::InventoryStore;
use spk_server::sync::{HassClient, SyncScheduler};
use spk_server::{build_router, AppState};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for spk-server
#[derive(Parser, Debug)]
#[command(name = "spk-server")]
#[command(about = "Filament spool inventory with Home Assistant tray sync")]
#[command(version)]
struct Args {
    /// Path to the TOML config file
    #[arg(short, long, env = "SPK_CONFIG")]
    config: Option<PathBuf>,

    /// Folder holding database.json and materials.json
    #[arg(short, long, env = "SPK_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Address to listen on, e.g. 0.0.0.0:3000
    #[arg(short, long, env = "SPK_BIND")]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = BootstrapConfig::resolve(&CliOverrides {
        config_file: args.config,
        data_dir: args.data_dir,
        bind: args.bind,
    })
    .context("Failed to resolve configuration")?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("spk_server={},tower_http={}", config.log_level, config.log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Log build identification immediately after tracing init
    info!(
        "Starting SpoolKeeper (spk-server) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    config.ensure_data_dir()?;
    info!("Data folder: {}", config.data_dir.display());

    let store = Arc::new(
        InventoryStore::load(config.database_path())
            .await
            .context("Failed to load inventory")?,
    );
    let catalog = Arc::new(
        MaterialCatalog::load_or_empty(config.materials_path(), config.color_threshold)
            .await
            .context("Failed to load material catalog")?,
    );
    if catalog.is_empty().await {
        warn!("Material catalog is empty; trays will keep their reported names only");
    }

    let reconciler = Arc::new(TrayReconciler::new(store.clone(), catalog.clone()));
    let source = Arc::new(HassClient::new(config.fetch_timeout).context("Failed to build HTTP client")?);
    let scheduler = Arc::new(SyncScheduler::new(store.clone(), reconciler.clone(), source));

    let cancel = CancellationToken::new();
    let sync_task = scheduler.clone().spawn(config.sync_interval, cancel.clone());

    let state = AppState::new(
        store,
        catalog,
        reconciler,
        scheduler,
        &config.admin_registration_key,
    );
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind))?;
    info!("spk-server listening on http://{}", config.bind);
    info!("Health check: http://{}/health", config.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel.clone()))
        .await
        .context("Server error")?;

    cancel.cancel();
    if let Err(e) = sync_task.await {
        error!("Tray sync task ended abnormally: {}", e);
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM and cancels background work
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
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

    cancel.cancel();
}
