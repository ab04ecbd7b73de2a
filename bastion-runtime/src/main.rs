//! Bastion entry point.
//!
//! Loads configuration, opens the durable store, restores state and runs the
//! background jobs until Ctrl-C.

use std::path::PathBuf;
use std::sync::Arc;

use bastion_net::HttpApi;
use bastion_runtime::{init_tracing, load_config, BastionContext, LogFormat, RuntimeResult};
use bastion_storage::{DurableStore, InMemoryDurableStore, LmdbDurableStore};
use bastion_sync::HttpAuthority;
use tokio::sync::watch;

const DEFAULT_LMDB_MAP_MB: usize = 64;

#[tokio::main]
async fn main() -> RuntimeResult<()> {
    init_tracing(LogFormat::from_env()?)?;

    let config = load_config(std::env::args().skip(1))?;
    let store = open_store()?;
    let remote = Arc::new(HttpApi::new(&config.api)?);
    let authority = Arc::new(HttpAuthority::new(&config.authority)?);

    let ctx = BastionContext::build(config, store, remote, authority)?;
    if let Err(e) = ctx.restore().await {
        tracing::warn!(error = %e, "Failed to restore saved state, starting fresh");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let jobs = ctx.spawn_jobs(shutdown_rx);

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl-C, shutting down");
    }
    tracing::info!("Shutdown signal received");

    let _ = shutdown_tx.send(true);
    jobs.join().await?;

    if let Err(e) = ctx.persist().await {
        tracing::error!(error = %e, "Failed to persist state on shutdown");
    }
    tracing::info!("Bastion stopped");
    Ok(())
}

/// LMDB under `BASTION_DATA_DIR`, or an in-memory store when unset.
fn open_store() -> RuntimeResult<Arc<dyn DurableStore>> {
    match std::env::var("BASTION_DATA_DIR") {
        Ok(dir) => {
            let map_mb = std::env::var("BASTION_LMDB_MAP_MB")
                .ok()
                .and_then(|value| value.parse::<usize>().ok())
                .unwrap_or(DEFAULT_LMDB_MAP_MB);
            let path = PathBuf::from(dir);
            tracing::info!(path = %path.display(), map_mb, "Opening LMDB store");
            Ok(Arc::new(LmdbDurableStore::open(&path, map_mb)?))
        }
        Err(_) => {
            tracing::info!("BASTION_DATA_DIR not set, state will not outlive the process");
            Ok(Arc::new(InMemoryDurableStore::new()))
        }
    }
}
