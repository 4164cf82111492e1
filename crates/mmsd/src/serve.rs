// SPDX-FileCopyrightText: 2026 mmsd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `mmsd serve` command implementation.
//!
//! Opens the message store, wires the static bearer and the HTTP transfer
//! client into the transaction engine, resumes unfinished transactions and
//! runs until a signal arrives or the engine stops on a fatal error.

use std::path::PathBuf;
use std::sync::Arc;

use mmsd_config::model::MmsdConfig;
use mmsd_core::{MmsdError, StorageAdapter};
use mmsd_engine::{BearerController, Engine, StaticBearer, install_signal_handler};
use mmsd_storage::SqliteStore;
use mmsd_transfer::HttpTransfer;
use tracing::{error, info, warn};

/// Runs the `mmsd serve` command.
pub async fn run_serve(config: MmsdConfig, pushes: Vec<PathBuf>) -> Result<(), MmsdError> {
    init_tracing(&config.daemon.log_level);

    info!(version = env!("CARGO_PKG_VERSION"), "starting mmsd serve");

    std::fs::create_dir_all(&config.daemon.mms_dir).map_err(|e| MmsdError::Storage {
        source: Box::new(e),
    })?;

    let store = Arc::new(SqliteStore::from_config(&config));
    store.initialize().await?;
    info!(path = %config.database_path().display(), "message store ready");

    if config.carrier.mmsc.is_none() {
        warn!("no carrier.mmsc configured; sending needs an MMSC from the bearer");
    }
    let bearer = BearerController::from_config(
        Arc::new(StaticBearer::from_config(&config.carrier)),
        &config.bearer,
    );
    let transfer = Arc::new(HttpTransfer::from_config(&config));

    let engine = Engine::new(&config, store, bearer, transfer);
    engine.start().await?;

    for path in &pushes {
        feed_push(&engine, path).await;
    }

    let signal = install_signal_handler();
    tokio::select! {
        _ = signal.cancelled() => info!("shutdown requested"),
        _ = engine.stopped() => warn!("engine stopped on its own"),
    }

    engine.shutdown().await?;

    if let Some(reason) = engine.fatal_error() {
        error!(%reason, "mmsd stopped on a fatal error");
        return Err(MmsdError::Internal(reason));
    }
    info!("mmsd serve shutdown complete");
    Ok(())
}

/// Hands one WAP-Push payload from disk to the engine. Failures are logged.
async fn feed_push(engine: &Engine, path: &std::path::Path) {
    let data = match std::fs::read(path) {
        Ok(data) => data,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cannot read push payload");
            return;
        }
    };
    match engine.handle_push(&data).await {
        Ok(Some(id)) => info!(path = %path.display(), %id, "push started a transaction"),
        Ok(None) => info!(path = %path.display(), "push handled"),
        Err(e) => warn!(path = %path.display(), error = %e, "push rejected"),
    }
}

/// Initializes the tracing subscriber with the given log level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("mmsd={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
