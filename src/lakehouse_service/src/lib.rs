//! The process entry point for the metadata control plane: CLI parsing,
//! logging init, and the `start_with_config`/`run_until_shutdown` glue around
//! `lakehouse_coordinator::Coordinator` (SPEC_FULL.md §2 workspace layout).

pub mod config;
pub mod error;
pub mod logging;

pub use config::ServiceConfig;
pub use error::{Error, Result};

use lakehouse_coordinator::Coordinator;
use std::sync::Arc;
use tracing::info;

/// Opens the Store, starts the Dispatcher and Iceberg Manager, and returns
/// the running [`Coordinator`] so the caller can drive ingestion or hold it
/// open until a shutdown signal arrives.
pub async fn start_with_config(config: ServiceConfig) -> Result<Arc<Coordinator>> {
    let coordinator_config = config.into_coordinator_config();
    let coordinator = Coordinator::open(&coordinator_config).await?;
    coordinator.start(&coordinator_config).await?;
    info!(base_path = %coordinator_config.base_path.display(), "lakehouse service started");
    Ok(Arc::new(coordinator))
}

/// Starts the service and blocks until SIGINT/SIGTERM (ctrl-c), then shuts
/// the coordinator down in reverse order.
pub async fn run_until_shutdown(config: ServiceConfig) -> Result<()> {
    let coordinator = start_with_config(config).await?;

    tokio::signal::ctrl_c()
        .await
        .map_err(Error::Io)?;
    info!("shutdown signal received");

    coordinator.stop().await?;
    Ok(())
}
