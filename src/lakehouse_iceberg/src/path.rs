//! Path Resolver (spec.md §4.1): a pure, stateless mapping from
//! (namespace, table) to the filesystem layout under a base path (spec.md §6).
//! No I/O; no failure modes.

use std::path::{Path, PathBuf};

/// Resolves deterministic paths under a single base directory. Stable across
/// processes given the same `base_path` (spec.md §4.1).
#[derive(Clone, Debug)]
pub struct PathResolver {
    base_path: PathBuf,
}

impl PathResolver {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// `databases/<db>/`.
    pub fn database_dir(&self, database: &str) -> PathBuf {
        self.base_path.join("databases").join(database)
    }

    /// `tables/<namespace...>/<table>/`.
    pub fn table_base_dir(&self, namespace: &[&str], table: &str) -> PathBuf {
        let mut dir = self.base_path.join("tables");
        for segment in namespace {
            dir = dir.join(segment);
        }
        dir.join(table)
    }

    /// `tables/<namespace...>/<table>/data/`.
    pub fn data_dir(&self, namespace: &[&str], table: &str) -> PathBuf {
        self.table_base_dir(namespace, table).join("data")
    }

    /// `tables/<namespace...>/<table>/metadata/`.
    pub fn metadata_dir(&self, namespace: &[&str], table: &str) -> PathBuf {
        self.table_base_dir(namespace, table).join("metadata")
    }

    /// `tables/<namespace...>/<table>/manifests/`.
    pub fn manifests_dir(&self, namespace: &[&str], table: &str) -> PathBuf {
        self.table_base_dir(namespace, table).join("manifests")
    }

    /// `internal/metadata.db`.
    pub fn registry_db_path(&self) -> PathBuf {
        self.base_path.join("internal").join("metadata.db")
    }

    /// `manifest-<batch_id>-<unix_nanos>.avro` under the table's manifests dir.
    pub fn manifest_file_name(batch_id: &str, unix_nanos: u128) -> String {
        format!("manifest-{batch_id}-{unix_nanos}.avro")
    }

    /// `metadata-<unix_nanos>.avro` under the table's metadata dir.
    pub fn snapshot_file_name(unix_nanos: u128) -> String {
        format!("metadata-{unix_nanos}.avro")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_stable_across_instances_with_the_same_base() {
        let a = PathResolver::new("/var/lake");
        let b = PathResolver::new("/var/lake");
        assert_eq!(
            a.manifests_dir(&["sales"], "orders"),
            b.manifests_dir(&["sales"], "orders")
        );
    }

    #[test]
    fn layout_matches_spec_section_6() {
        let r = PathResolver::new("/var/lake");
        assert_eq!(r.database_dir("sales"), PathBuf::from("/var/lake/databases/sales"));
        assert_eq!(
            r.data_dir(&["sales"], "orders"),
            PathBuf::from("/var/lake/tables/sales/orders/data")
        );
        assert_eq!(
            r.metadata_dir(&["sales"], "orders"),
            PathBuf::from("/var/lake/tables/sales/orders/metadata")
        );
        assert_eq!(
            r.manifests_dir(&["sales"], "orders"),
            PathBuf::from("/var/lake/tables/sales/orders/manifests")
        );
        assert_eq!(
            r.registry_db_path(),
            PathBuf::from("/var/lake/internal/metadata.db")
        );
    }

    #[test]
    fn nested_namespace_segments_compose_in_order() {
        let r = PathResolver::new("/base");
        assert_eq!(
            r.table_base_dir(&["a", "b"], "t"),
            PathBuf::from("/base/tables/a/b/t")
        );
    }
}
