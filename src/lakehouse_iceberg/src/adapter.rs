//! Iceberg Component Adapter (spec.md §4.10): the `EventSubscriber`
//! implementation the Metadata Coordinator registers with the dispatcher.
//! Translates `table_files` change-log rows into calls on the [`IcebergManager`].

use crate::error::{Error, Result};
use crate::manager::IcebergManager;
use async_trait::async_trait;
use lakehouse_astha::{EventSubscriber, Operation, RawEvent};
use lakehouse_registry::{IcebergMetadataState, TableFile};
use std::sync::Arc;
use tracing::{debug, warn};

pub const SUBSCRIBED_TABLE: &str = "table_files";

/// Bridges `lakehouse_astha`'s generic CDC fan-out to the Iceberg Manager
/// (spec.md §4.10). Holds no state of its own beyond the manager handle.
pub struct IcebergComponentAdapter {
    manager: Arc<IcebergManager>,
}

impl IcebergComponentAdapter {
    pub fn new(manager: Arc<IcebergManager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl EventSubscriber for IcebergComponentAdapter {
    /// INSERT enqueues the new file. UPDATE resubmits unless the file has
    /// already reached `completed`. DELETE is logged only; tombstone
    /// handling is deferred (spec.md §4.10, §9 open question). Any other
    /// operation is a programming error in the dispatcher and is rejected.
    async fn on_event(&self, event: &RawEvent) -> Result<()> {
        match event.operation {
            Operation::Insert => {
                let file: TableFile = event.decode()?;
                self.submit_unless_already_queued(file).await
            }
            Operation::Update => {
                let file: TableFile = event.decode()?;
                if file.iceberg_metadata_state == IcebergMetadataState::Completed.as_str() {
                    debug!(file_id = file.id, "file already completed, ignoring update");
                    return Ok(());
                }
                self.submit_unless_already_queued(file).await
            }
            Operation::Delete => {
                debug!(event_id = event.id, "table_files delete event, deferred (no-op)");
                Ok(())
            }
        }
    }

    /// Healthy as long as the manager's worker pool is running.
    async fn on_health(&self) -> Result<()> {
        if !self.manager.is_running().await {
            return Err(Error::NotRunning);
        }
        Ok(())
    }

    /// Re-submits every pending/failed file the registry knows about,
    /// tolerating files already queued (spec.md §4.11 recovery, §8 P9).
    async fn on_refresh(&self) -> Result<()> {
        self.manager.load_pending_files().await
    }
}

impl IcebergComponentAdapter {
    async fn submit_unless_already_queued(&self, file: TableFile) -> Result<()> {
        match self.manager.process_file(file).await {
            Ok(()) => Ok(()),
            Err(Error::AlreadyQueued(id)) => {
                warn!(file_id = id, "file already queued, ignoring duplicate event");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::MetadataGenerator;
    use crate::manager::ManagerConfig;
    use crate::path::PathResolver;
    use lakehouse_registry::{NewColumn, NewFileInfo, Registry};
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

    async fn setup() -> (tempfile::TempDir, Arc<Registry>, Arc<IcebergManager>) {
        let tmp = tempdir().unwrap();
        let registry = Arc::new(
            Registry::open(
                &format!("sqlite://{}", tmp.path().join("registry.db").to_str().unwrap()),
                tmp.path().join("data"),
            )
            .await
            .unwrap(),
        );
        registry.create_database("sales").await.unwrap();
        registry
            .create_table_with_columns(
                "sales",
                "orders",
                &[long_col("id", 1)],
                "iceberg",
                serde_json::json!({}),
            )
            .await
            .unwrap();

        let generator = MetadataGenerator::new(PathResolver::new(tmp.path()));
        let manager = Arc::new(IcebergManager::new(
            registry.clone(),
            generator,
            ManagerConfig::default(),
        ));
        manager.start().await.unwrap();
        (tmp, registry, manager)
    }

    fn raw_event(id: i64, operation: Operation, file: &TableFile) -> RawEvent {
        RawEvent {
            id,
            table: SUBSCRIBED_TABLE.to_string(),
            operation,
            data: serde_json::to_value(file).unwrap(),
            timestamp: "now".to_string(),
            created_at: "now".to_string(),
        }
    }

    #[tokio::test]
    async fn insert_event_enqueues_file_for_processing() {
        let (_tmp, registry, manager) = setup().await;
        let adapter = IcebergComponentAdapter::new(manager.clone());

        let file = registry
            .update_table_after_insertion(
                "sales",
                "orders",
                NewFileInfo {
                    file_name: "f1.parquet".to_string(),
                    file_path: "/data/f1.parquet".to_string(),
                    file_size: 10,
                    file_type: "parquet".to_string(),
                    partition_path: None,
                    row_count: 1,
                    checksum: None,
                    is_compressed: false,
                },
            )
            .await
            .unwrap();

        let event = raw_event(1, Operation::Insert, &file);
        adapter.on_event(&event).await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let stats = manager.stats().await;
        assert_eq!(stats.files_processed, 1);
    }

    #[tokio::test]
    async fn update_event_for_completed_file_is_ignored() {
        let (_tmp, _registry, manager) = setup().await;
        let adapter = IcebergComponentAdapter::new(manager.clone());

        let mut file = TableFile {
            id: 99,
            table_id: 1,
            file_name: "f.parquet".to_string(),
            file_path: "/data/f.parquet".to_string(),
            file_size: 10,
            file_type: "parquet".to_string(),
            partition_path: None,
            row_count: 1,
            checksum: None,
            is_compressed: false,
            iceberg_metadata_state: "completed".to_string(),
            created_at: "now".to_string(),
            updated_at: "now".to_string(),
        };
        let event = raw_event(2, Operation::Update, &file);
        adapter.on_event(&event).await.unwrap();

        // No files_processed increment: the adapter skipped resubmission.
        assert_eq!(manager.stats().await.files_processed, 0);

        // Sanity: a non-completed update would have attempted submission
        // (and failed fast, since file id 99 was never registered).
        file.iceberg_metadata_state = "pending".to_string();
        let event = raw_event(3, Operation::Update, &file);
        assert!(adapter.on_event(&event).await.is_ok());
    }

    #[tokio::test]
    async fn delete_event_is_a_no_op() {
        let (_tmp, _registry, manager) = setup().await;
        let adapter = IcebergComponentAdapter::new(manager.clone());
        let file = TableFile {
            id: 1,
            table_id: 1,
            file_name: "f.parquet".to_string(),
            file_path: "/data/f.parquet".to_string(),
            file_size: 10,
            file_type: "parquet".to_string(),
            partition_path: None,
            row_count: 1,
            checksum: None,
            is_compressed: false,
            iceberg_metadata_state: "pending".to_string(),
            created_at: "now".to_string(),
            updated_at: "now".to_string(),
        };
        let event = raw_event(4, Operation::Delete, &file);
        adapter.on_event(&event).await.unwrap();
        assert_eq!(manager.stats().await.files_processed, 0);
    }

    #[tokio::test]
    async fn health_check_fails_once_manager_stopped() {
        let (_tmp, _registry, manager) = setup().await;
        let adapter = IcebergComponentAdapter::new(manager.clone());
        adapter.on_health().await.unwrap();
        manager.stop().await.unwrap();
        assert!(matches!(adapter.on_health().await, Err(Error::NotRunning)));
    }
}
