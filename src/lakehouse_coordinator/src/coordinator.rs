//! Metadata Coordinator (spec.md §4.11): the top-level façade that starts
//! Store -> Dispatcher -> Iceberg Manager in order, wires the Iceberg
//! Component Adapter between them, and runs CREATE TABLE validation before
//! delegating to the Store.

use crate::config::CoordinatorConfig;
use crate::error::{Error, Result};
use lakehouse_astha::{ComponentInfo, Dispatcher};
use lakehouse_iceberg::{
    adapter::SUBSCRIBED_TABLE, IcebergComponentAdapter, IcebergManager, MetadataGenerator,
    PathResolver,
};
use lakehouse_registry::entities::{NewColumn, Table};
use lakehouse_registry::{validation, Database, Registry};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, instrument};

/// Component identity the Coordinator registers with the Dispatcher on
/// behalf of the Iceberg Manager (spec.md §4.10).
pub const ICEBERG_COMPONENT_NAME: &str = "iceberg_metadata_manager";

struct Running {
    dispatcher: Arc<Dispatcher>,
    manager: Arc<IcebergManager>,
}

/// Owns the Registry, Dispatcher and Iceberg Manager for one process and
/// orchestrates their startup/shutdown order (spec.md §4.11, §5).
pub struct Coordinator {
    registry: Arc<Registry>,
    resolver: PathResolver,
    running: Mutex<Option<Running>>,
}

impl Coordinator {
    /// Opens the Store (running migrations) and constructs the path
    /// resolver, but does not yet start the Dispatcher or Iceberg Manager;
    /// call [`Coordinator::start`] for that (spec.md §4.11 startup order).
    #[instrument(skip(config))]
    pub async fn open(config: &CoordinatorConfig) -> Result<Self> {
        let db_path = config.base_path.join("internal");
        tokio::fs::create_dir_all(&db_path)
            .await
            .map_err(lakehouse_registry::Error::from)?;

        let registry = Arc::new(
            Registry::open(&config.resolved_database_url(), config.base_path.clone()).await?,
        );
        let resolver = PathResolver::new(config.base_path.clone());
        Ok(Self {
            registry,
            resolver,
            running: Mutex::new(None),
        })
    }

    /// Constructs the Iceberg Manager, constructs the Dispatcher bound to
    /// the Store's registry, registers the Iceberg Component adapter,
    /// starts the Manager, starts the Dispatcher, then runs an explicit
    /// recovery pass (spec.md §4.11). Fails with `AlreadyRunning` on a
    /// second call.
    #[instrument(skip(self, config))]
    pub async fn start(&self, config: &CoordinatorConfig) -> Result<()> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Err(Error::AlreadyRunning);
        }

        let generator = MetadataGenerator::new(self.resolver.clone());
        let manager = Arc::new(IcebergManager::new(
            self.registry.clone(),
            generator,
            config.manager.clone(),
        ));
        let dispatcher = Arc::new(Dispatcher::new(self.registry.clone(), config.dispatcher));

        let adapter = Arc::new(IcebergComponentAdapter::new(manager.clone()));
        dispatcher
            .register_component(
                ComponentInfo::new(
                    ICEBERG_COMPONENT_NAME,
                    env!("CARGO_PKG_VERSION"),
                    [SUBSCRIBED_TABLE],
                ),
                adapter,
            )
            .await;

        manager.start().await?;
        dispatcher.start().await?;
        // Explicit recovery pass (spec.md §4.11): idempotent thanks to the
        // File Queue's `AlreadyQueued` rule, already covered once by
        // `manager.start()` and again by the Dispatcher's startup
        // `OnRefresh`, but named here to match the documented order.
        manager.load_pending_files().await?;

        info!("metadata coordinator started");
        *running = Some(Running { dispatcher, manager });
        Ok(())
    }

    /// Shuts down in reverse order: Dispatcher, then Iceberg Manager. The
    /// Store's connection pool is closed when the last `Arc<Registry>`
    /// clone is dropped (spec.md §5).
    #[instrument(skip(self))]
    pub async fn stop(&self) -> Result<()> {
        let mut running = self.running.lock().await;
        let Some(handles) = running.take() else {
            return Err(Error::NotRunning);
        };
        handles.dispatcher.stop().await?;
        handles.manager.stop().await?;
        info!("metadata coordinator stopped");
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn path_resolver(&self) -> &PathResolver {
        &self.resolver
    }

    pub async fn manager(&self) -> Option<Arc<IcebergManager>> {
        self.running.lock().await.as_ref().map(|r| r.manager.clone())
    }

    pub async fn dispatcher(&self) -> Option<Arc<Dispatcher>> {
        self.running.lock().await.as_ref().map(|r| r.dispatcher.clone())
    }

    pub async fn create_database(&self, name: &str) -> Result<Database> {
        Ok(self.registry.create_database(name).await?)
    }

    pub async fn drop_database(&self, name: &str) -> Result<()> {
        Ok(self.registry.drop_database(name).await?)
    }

    /// All validation of CREATE TABLE requests happens here, before
    /// delegating to the Store (spec.md §4.11, §7).
    #[instrument(skip(self, columns, engine_config))]
    pub async fn create_table_with_columns(
        &self,
        database: &str,
        table: &str,
        columns: &[NewColumn],
        storage_engine: &str,
        engine_config: serde_json::Value,
    ) -> Result<Table> {
        validation::validate_table_name(table)?;
        validation::validate_storage_engine(storage_engine)?;
        validation::validate_engine_config(storage_engine, &engine_config)?;
        validation::validate_columns(table, columns)?;

        Ok(self
            .registry
            .create_table_with_columns(database, table, columns, storage_engine, engine_config)
            .await?)
    }

    pub async fn drop_table(&self, database: &str, table: &str) -> Result<()> {
        Ok(self.registry.drop_table(database, table).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn long_col(name: &str, ordinal: i64) -> NewColumn {
        NewColumn {
            column_name: name.to_string(),
            data_type: "long".to_string(),
            is_nullable: true,
            is_primary: false,
            is_unique: false,
            default_value: None,
            ordinal_position: ordinal,
            max_length: None,
            precision: None,
            scale: None,
        }
    }

    #[tokio::test]
    async fn start_then_stop_is_idempotent_on_second_call() {
        let tmp = tempdir().unwrap();
        let config = CoordinatorConfig::new(tmp.path());
        let coordinator = Coordinator::open(&config).await.unwrap();

        coordinator.start(&config).await.unwrap();
        assert!(matches!(
            coordinator.start(&config).await,
            Err(Error::AlreadyRunning)
        ));

        coordinator.stop().await.unwrap();
        assert!(matches!(coordinator.stop().await, Err(Error::NotRunning)));
    }

    #[tokio::test]
    async fn create_database_and_table_end_to_end() {
        let tmp = tempdir().unwrap();
        let config = CoordinatorConfig::new(tmp.path());
        let coordinator = Coordinator::open(&config).await.unwrap();
        coordinator.start(&config).await.unwrap();

        coordinator.create_database("sales").await.unwrap();
        coordinator
            .create_table_with_columns(
                "sales",
                "orders",
                &[long_col("id", 1)],
                "iceberg",
                serde_json::json!({}),
            )
            .await
            .unwrap();

        let tables = coordinator.registry().list_tables("sales").await.unwrap();
        assert_eq!(tables, vec!["orders".to_string()]);

        coordinator.stop().await.unwrap();
    }

    #[tokio::test]
    async fn invalid_column_is_rejected_before_reaching_the_store() {
        let tmp = tempdir().unwrap();
        let config = CoordinatorConfig::new(tmp.path());
        let coordinator = Coordinator::open(&config).await.unwrap();
        coordinator.start(&config).await.unwrap();
        coordinator.create_database("sales").await.unwrap();

        let bad_columns = vec![long_col("id", 1), long_col("id", 2)];
        let result = coordinator
            .create_table_with_columns("sales", "dupes", &bad_columns, "iceberg", serde_json::json!({}))
            .await;
        assert!(result.is_err());
        assert!(!coordinator
            .registry()
            .table_exists("sales", "dupes")
            .await
            .unwrap());

        coordinator.stop().await.unwrap();
    }

    #[tokio::test]
    async fn cdc_insert_produces_manifest_and_snapshot() {
        let tmp = tempdir().unwrap();
        let config = CoordinatorConfig::new(tmp.path());
        let coordinator = Coordinator::open(&config).await.unwrap();
        coordinator.start(&config).await.unwrap();

        coordinator.create_database("sales").await.unwrap();
        coordinator
            .create_table_with_columns(
                "sales",
                "orders",
                &[long_col("id", 1)],
                "iceberg",
                serde_json::json!({}),
            )
            .await
            .unwrap();

        coordinator
            .registry()
            .update_table_after_insertion(
                "sales",
                "orders",
                lakehouse_registry::entities::NewFileInfo {
                    file_name: "f1.parquet".to_string(),
                    file_path: "/data/f1.parquet".to_string(),
                    file_size: 1024,
                    file_type: "parquet".to_string(),
                    partition_path: Some("year=2024/month=1".to_string()),
                    row_count: 100,
                    checksum: None,
                    is_compressed: false,
                },
            )
            .await
            .unwrap();

        // Give the dispatcher a few poll ticks to fan the insert out to the
        // Iceberg component and for the worker pool to run the batch task.
        tokio::time::sleep(std::time::Duration::from_millis(400)).await;

        let manifests_dir = tmp
            .path()
            .join("tables")
            .join("sales")
            .join("orders")
            .join("manifests");
        let entries: Vec<_> = std::fs::read_dir(&manifests_dir).unwrap().collect();
        assert_eq!(entries.len(), 1);

        coordinator.stop().await.unwrap();
    }
}
