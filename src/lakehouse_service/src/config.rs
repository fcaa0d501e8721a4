//! `ServiceConfig`: the flags `lakehouse-service`'s CLI exposes, translated
//! into a `lakehouse_coordinator::CoordinatorConfig` (SPEC_FULL.md §3
//! "Configuration", mirroring `moonlink_service`'s `Cli`/`ServiceConfig` split).

use lakehouse_astha::DispatcherConfig;
use lakehouse_iceberg::{ManagerConfig, PlannerLimits};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct ServiceConfig {
    /// Base path for the data-lake's on-disk layout (spec.md §6).
    pub base_path: PathBuf,
    /// Poll interval for the Astha dispatcher (spec.md §4.4 default: 100ms).
    pub poll_interval_ms: u64,
    /// Change-log rows read per poll (spec.md §4.4 default: 10).
    pub poll_batch_size: i64,
    /// Worker pool size; `None` defaults to available parallelism (spec.md §4.7).
    pub worker_count: Option<usize>,
    /// Batch planner file-count bound (spec.md §4.6 default: 10).
    pub max_files_per_batch: usize,
    /// Batch planner minimum close threshold in bytes (spec.md §4.6 default: 100 MiB).
    pub min_batch_size_bytes: i64,
    /// Batch planner maximum bound in bytes (spec.md §4.6 default: 1 GiB).
    pub max_batch_size_bytes: i64,
}

impl ServiceConfig {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        let defaults = PlannerLimits::default();
        Self {
            base_path: base_path.into(),
            poll_interval_ms: 100,
            poll_batch_size: 10,
            worker_count: None,
            max_files_per_batch: defaults.max_files_per_batch,
            min_batch_size_bytes: defaults.min_batch_size_bytes,
            max_batch_size_bytes: defaults.max_batch_size_bytes,
        }
    }

    pub fn into_coordinator_config(self) -> lakehouse_coordinator::CoordinatorConfig {
        let mut config = lakehouse_coordinator::CoordinatorConfig::new(self.base_path);
        config.dispatcher = DispatcherConfig {
            batch_size: self.poll_batch_size,
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            ..DispatcherConfig::default()
        };
        config.manager = ManagerConfig {
            worker_count: self.worker_count,
            planner_limits: PlannerLimits {
                max_files_per_batch: self.max_files_per_batch,
                min_batch_size_bytes: self.min_batch_size_bytes,
                max_batch_size_bytes: self.max_batch_size_bytes,
            },
        };
        config
    }
}
