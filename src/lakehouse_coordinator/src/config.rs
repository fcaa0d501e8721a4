//! `CoordinatorConfig` (SPEC_FULL.md §4.11 supplement): the knobs spec.md
//! leaves as implicit defaults, gathered in one place and threaded down to
//! the Dispatcher and Iceberg Manager instead of hard-coded constants.

use lakehouse_astha::DispatcherConfig;
use lakehouse_iceberg::ManagerConfig;
use std::path::PathBuf;

#[derive(Clone, Debug)]
pub struct CoordinatorConfig {
    /// Base directory under which `databases/`, `tables/` and
    /// `internal/metadata.db` are laid out (spec.md §6).
    pub base_path: PathBuf,
    /// `sqlite://...` connection string for the registry. Defaults to
    /// `internal/metadata.db` under `base_path` when left as `None`.
    pub database_url: Option<String>,
    pub dispatcher: DispatcherConfig,
    pub manager: ManagerConfig,
}

impl CoordinatorConfig {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            database_url: None,
            dispatcher: DispatcherConfig::default(),
            manager: ManagerConfig::default(),
        }
    }

    pub fn resolved_database_url(&self) -> String {
        self.database_url.clone().unwrap_or_else(|| {
            format!(
                "sqlite://{}",
                self.base_path.join("internal").join("metadata.db").display()
            )
        })
    }
}
