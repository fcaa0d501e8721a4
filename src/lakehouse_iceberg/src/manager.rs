//! Iceberg Manager (spec.md §4.9): composition root for the file queue,
//! batch planner, worker pool and metadata generator. Holds the manager's
//! own process-wide statistics behind its own mutex (spec.md §9).

use crate::error::{Error, Result};
use crate::generator::{MetadataGenerator, TableInfo};
use crate::planner::{self, Batch, PlannerLimits};
use crate::pool::{PoolStats, Task, WorkerPool};
use crate::queue::{FileQueue, QueueStats};
use async_trait::async_trait;
use lakehouse_registry::{IcebergMetadataState, Registry, TableFile};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument};

#[derive(Clone, Debug)]
pub struct ManagerConfig {
    pub worker_count: Option<usize>,
    pub planner_limits: PlannerLimits,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            worker_count: None,
            planner_limits: PlannerLimits::default(),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ManagerStats {
    pub files_processed: u64,
    pub batches_processed: u64,
    pub total_processing_time: Duration,
    pub last_processed: Option<String>,
    pub errors: u64,
}

/// Composes the File Queue, Batch Planner, Worker Pool and Metadata
/// Generator, and exposes the ingest entry points the dispatcher adapter
/// calls into (spec.md §4.9).
pub struct IcebergManager {
    registry: Arc<Registry>,
    generator: Arc<MetadataGenerator>,
    pool: Arc<WorkerPool>,
    queue: Arc<FileQueue>,
    planner_limits: PlannerLimits,
    running: Mutex<bool>,
    stats: Arc<Mutex<ManagerStats>>,
}

impl IcebergManager {
    pub fn new(registry: Arc<Registry>, generator: MetadataGenerator, config: ManagerConfig) -> Self {
        Self {
            registry,
            generator: Arc::new(generator),
            pool: Arc::new(WorkerPool::new(config.worker_count)),
            queue: Arc::new(FileQueue::new()),
            planner_limits: config.planner_limits,
            running: Mutex::new(false),
            stats: Arc::new(Mutex::new(ManagerStats::default())),
        }
    }

    /// Starts the worker pool, then runs recovery: every file the registry
    /// reports as `pending`/`failed` is resubmitted (spec.md §4.9, §4.11).
    #[instrument(skip(self))]
    pub async fn start(&self) -> Result<()> {
        let mut running = self.running.lock().await;
        if *running {
            return Err(Error::AlreadyRunning);
        }
        self.pool.start().await?;
        *running = true;
        drop(running);

        self.load_pending_files().await?;
        Ok(())
    }

    pub async fn stop(&self) -> Result<()> {
        let mut running = self.running.lock().await;
        if !*running {
            return Err(Error::NotRunning);
        }
        self.pool.stop().await?;
        *running = false;
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        *self.running.lock().await
    }

    /// Reads all pending/failed files from the registry and resubmits them,
    /// tolerating files already queued (spec.md §4.11 recovery, §8 property
    /// P9: idempotent refresh).
    #[instrument(skip(self))]
    pub async fn load_pending_files(&self) -> Result<()> {
        let files = self.registry.get_pending_files_for_iceberg().await?;
        for file in files {
            match self.process_file(file).await {
                Ok(()) => {}
                Err(Error::AlreadyQueued(id)) => {
                    debug!(file_id = id, "file already queued, skipping resubmission");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// `ProcessFile(file)`: enqueues the file and submits a
    /// [`ProcessFileTask`]. Fails with `NotRunning` unless the manager is started.
    pub async fn process_file(&self, file: TableFile) -> Result<()> {
        if !self.is_running().await {
            return Err(Error::NotRunning);
        }
        self.queue.enqueue(file.clone()).await?;
        // Processing starts immediately rather than waiting for a separate
        // Dequeue/GetBatch pull, so promote straight to the processing set
        // (spec.md §4.5 invariant: never simultaneously pending and processing).
        self.queue.begin_processing(file.id).await?;
        let task = Arc::new(ProcessFileTask {
            file,
            registry: self.registry.clone(),
            generator: self.generator.clone(),
            queue: self.queue.clone(),
            stats: self.stats.clone(),
        });
        self.pool.submit(task).await
    }

    /// `ProcessBatch(batch)`: submits a [`ProcessBatchTask`] directly. Each
    /// file is promoted into the queue's processing set first (tolerating
    /// files that arrived via a prior `GetBatch` pull and are already there)
    /// so the task's final `MarkCompleted`/`MarkFailed` calls succeed.
    pub async fn process_batch(&self, batch: Batch) -> Result<()> {
        if !self.is_running().await {
            return Err(Error::NotRunning);
        }
        for file in &batch.files {
            match self.queue.enqueue(file.clone()).await {
                Ok(()) | Err(Error::AlreadyQueued(_)) => {}
                Err(e) => return Err(e),
            }
            self.queue.begin_processing(file.id).await?;
        }
        let task = Arc::new(ProcessBatchTask {
            batch,
            registry: self.registry.clone(),
            generator: self.generator.clone(),
            queue: self.queue.clone(),
            stats: self.stats.clone(),
        });
        self.pool.submit(task).await
    }

    pub async fn get_pending_files(&self) -> Vec<TableFile> {
        self.queue.get_pending().await
    }

    pub async fn queue_stats(&self) -> QueueStats {
        self.queue.get_stats().await
    }

    pub async fn pool_stats(&self) -> PoolStats {
        self.pool.stats().await
    }

    pub async fn stats(&self) -> ManagerStats {
        self.stats.lock().await.clone()
    }

    pub fn planner_limits(&self) -> PlannerLimits {
        self.planner_limits
    }
}

/// Resolves the [`TableInfo`] a batch's files belong to. Callers are
/// expected to pass batches whose files share one table (spec.md §4.9
/// "validate tableInfo").
async fn table_info_for(registry: &Registry, table_id: i64) -> Result<TableInfo> {
    let info = registry.get_complete_table_info_by_id(table_id).await?;
    Ok(TableInfo {
        database: info.database.name,
        table: info.table.name,
        schema_id: info.metadata.schema_version,
    })
}

/// Transitions `file_id` to `next`, tolerating the case where it is already
/// there (idempotent resubmission, spec.md §8 P9).
async fn transition_tolerant(
    registry: &Registry,
    file_id: i64,
    next: IcebergMetadataState,
) -> Result<()> {
    match registry.transition_file_state(file_id, next).await {
        Ok(()) => Ok(()),
        Err(lakehouse_registry::Error::IllegalStateTransition { .. }) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Runs the shared manifest + snapshot write for one batch of files
/// belonging to a single table, transitioning registry state and queue
/// membership around it (spec.md §4.9 `ProcessBatchTask`).
async fn run_batch(
    registry: &Registry,
    generator: &MetadataGenerator,
    queue: &FileQueue,
    stats: &Mutex<ManagerStats>,
    batch: &Batch,
) -> Result<()> {
    if batch.files.is_empty() {
        return Ok(());
    }
    let table_id = batch.files[0].table_id;

    for file in &batch.files {
        transition_tolerant(registry, file.id, IcebergMetadataState::Processing).await?;
    }

    let started = Instant::now();
    let result: Result<()> = async {
        let table_info = table_info_for(registry, table_id).await?;
        let manifest_path = generator.generate_manifest(batch, &table_info).await?;
        generator
            .update_metadata_file(batch, &manifest_path, &table_info)
            .await?;
        Ok(())
    }
    .await;

    let elapsed = started.elapsed();
    let mut stats_guard = stats.lock().await;
    stats_guard.total_processing_time += elapsed;

    match result {
        Ok(()) => {
            for file in &batch.files {
                transition_tolerant(registry, file.id, IcebergMetadataState::Completed).await?;
                let _ = queue.mark_completed(file.id).await;
            }
            stats_guard.files_processed += batch.files.len() as u64;
            stats_guard.batches_processed += 1;
            stats_guard.last_processed = batch.files.last().map(|f| f.file_path.clone());
            info!(batch_id = %batch.id, files = batch.files.len(), ?elapsed, "batch processed");
            Ok(())
        }
        Err(e) => {
            error!(batch_id = %batch.id, error = %e, "batch processing failed, marking files failed");
            for file in &batch.files {
                let _ = transition_tolerant(registry, file.id, IcebergMetadataState::Failed).await;
                let _ = queue.mark_failed(file.id).await;
            }
            stats_guard.errors += 1;
            Err(e)
        }
    }
}

/// Single-file path: wraps the file as a one-element batch and runs the same
/// manifest/snapshot pipeline as [`ProcessBatchTask`] (spec.md §4.9, §8
/// scenario 3: a single CDC insert yields exactly one manifest + snapshot).
struct ProcessFileTask {
    file: TableFile,
    registry: Arc<Registry>,
    generator: Arc<MetadataGenerator>,
    queue: Arc<FileQueue>,
    stats: Arc<Mutex<ManagerStats>>,
}

#[async_trait]
impl Task for ProcessFileTask {
    async fn execute(&self) -> Result<()> {
        let batch = planner::plan(vec![self.file.clone()], PlannerLimits::default())
            .into_iter()
            .next()
            .unwrap_or_else(|| Batch {
                id: format!("batch-single-{}", self.file.id),
                created_at_unix_nanos: 0,
                status: planner::BatchStatus::Pending,
                files: vec![self.file.clone()],
            });
        run_batch(&self.registry, &self.generator, &self.queue, &self.stats, &batch).await
    }

    fn id(&self) -> String {
        format!("process-file-{}", self.file.id)
    }
}

/// The hot path: validates, writes manifest + snapshot, and marks every
/// file in the batch completed or failed (spec.md §4.9).
struct ProcessBatchTask {
    batch: Batch,
    registry: Arc<Registry>,
    generator: Arc<MetadataGenerator>,
    queue: Arc<FileQueue>,
    stats: Arc<Mutex<ManagerStats>>,
}

#[async_trait]
impl Task for ProcessBatchTask {
    async fn execute(&self) -> Result<()> {
        run_batch(&self.registry, &self.generator, &self.queue, &self.stats, &self.batch).await
    }

    fn id(&self) -> String {
        self.batch.id.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::PathResolver;
    use lakehouse_registry::NewColumn;
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

    async fn setup() -> (tempfile::TempDir, Arc<Registry>, IcebergManager) {
        let tmp = tempdir().unwrap();
        let db_path = tmp.path().join("registry.db");
        let registry = Arc::new(
            Registry::open(
                &format!("sqlite://{}", db_path.to_str().unwrap()),
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

        let resolver = PathResolver::new(tmp.path());
        let generator = MetadataGenerator::new(resolver);
        let manager = IcebergManager::new(registry.clone(), generator, ManagerConfig::default());
        (tmp, registry, manager)
    }

    #[tokio::test]
    async fn process_file_before_start_fails_not_running() {
        let (_tmp, _registry, manager) = setup().await;
        let file = lakehouse_registry::TableFile {
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
        assert!(matches!(
            manager.process_file(file).await,
            Err(Error::NotRunning)
        ));
    }

    #[tokio::test]
    async fn inserted_file_produces_manifest_and_snapshot() {
        let (tmp, registry, manager) = setup().await;
        manager.start().await.unwrap();

        let row = registry
            .update_table_after_insertion(
                "sales",
                "orders",
                lakehouse_registry::NewFileInfo {
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

        manager.process_file(row).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let manifests_dir = tmp
            .path()
            .join("tables")
            .join("sales")
            .join("orders")
            .join("manifests");
        let entries: Vec<_> = std::fs::read_dir(&manifests_dir).unwrap().collect();
        assert_eq!(entries.len(), 1);

        let stats = manager.stats().await;
        assert_eq!(stats.files_processed, 1);
        assert_eq!(stats.batches_processed, 1);

        // The file queue must reflect completion, not leave the file stuck
        // pending forever (spec.md §4.5: MarkCompleted removes it from
        // processing; it was never re-queued as pending).
        let queue_stats = manager.queue_stats().await;
        assert_eq!(queue_stats.pending_count, 0);
        assert_eq!(queue_stats.processing_count, 0);
        assert_eq!(queue_stats.total_completed, 1);

        manager.stop().await.unwrap();
    }

    #[tokio::test]
    async fn refresh_does_not_double_enqueue_already_processing_files() {
        let (_tmp, registry, manager) = setup().await;
        manager.start().await.unwrap();

        registry
            .update_table_after_insertion(
                "sales",
                "orders",
                lakehouse_registry::NewFileInfo {
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

        // First recovery pass enqueues the pending file.
        manager.load_pending_files().await.unwrap();
        let before = manager.queue_stats().await.total_enqueued;

        // Second pass must not double-enqueue (property P9).
        manager.load_pending_files().await.unwrap();
        let after = manager.queue_stats().await.total_enqueued;
        assert_eq!(before, after);

        manager.stop().await.unwrap();
    }
}
