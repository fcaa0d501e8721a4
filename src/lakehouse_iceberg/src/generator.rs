//! Metadata Generator (spec.md §4.8): writes the manifest and snapshot
//! artifacts for a batch, atomically, and returns their paths.

use crate::avro_envelope;
use crate::error::Result;
use crate::path::PathResolver;
use crate::planner::Batch;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::instrument;

/// The minimal table identity the generator needs: enough to resolve paths
/// and stamp a schema id, without depending on the registry's row types.
#[derive(Clone, Debug)]
pub struct TableInfo {
    pub database: String,
    pub table: String,
    pub schema_id: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DataFile {
    pub file_path: String,
    pub file_format: String,
    pub partition: BTreeMap<String, String>,
    pub record_count: i64,
    pub file_size_in_bytes: i64,
    pub column_sizes: Option<BTreeMap<String, i64>>,
    pub value_counts: Option<BTreeMap<String, i64>>,
    pub null_value_counts: Option<BTreeMap<String, i64>>,
    pub lower_bounds: Option<BTreeMap<String, String>>,
    pub upper_bounds: Option<BTreeMap<String, String>>,
    pub split_offsets: Option<Vec<i64>>,
    pub sort_order_id: Option<i32>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub enum EntryStatus {
    Existing = 0,
    Added = 1,
    Deleted = 2,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub status: i32,
    pub snapshot_id: i64,
    pub data_sequence_number: i64,
    pub file_sequence_number: i64,
    pub data_file: DataFile,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ManifestDocument {
    pub manifest_type: String,
    pub content: i32,
    pub sequence_number: i64,
    pub min_sequence_number: i64,
    pub entries: Vec<ManifestEntry>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ManifestFileInfo {
    pub manifest_path: String,
    pub added_data_files_count: i64,
    pub added_rows_count: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SnapshotSummary {
    pub operation: String,
    #[serde(rename = "added-files")]
    pub added_files: i64,
    #[serde(rename = "added-records")]
    pub added_records: i64,
    #[serde(rename = "added-files-size")]
    pub added_files_size: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SnapshotDocument {
    pub snapshot_id: i64,
    pub timestamp_ms: i64,
    pub summary: SnapshotSummary,
    pub manifest_list: String,
    pub schema_id: i64,
    pub parent_snapshot_id: Option<i64>,
    pub manifests: Vec<ManifestFileInfo>,
}

/// Stateless generator of manifest + snapshot artifacts (spec.md §4.8).
/// Concurrency-safe: two calls for the same table produce distinct files
/// because of the nanosecond suffix.
pub struct MetadataGenerator {
    resolver: PathResolver,
}

impl MetadataGenerator {
    pub fn new(resolver: PathResolver) -> Self {
        Self { resolver }
    }

    /// Writes `manifests/manifest-<batch_id>-<unix_nanos>.avro` and returns
    /// its absolute path.
    #[instrument(skip(self, batch, table_info))]
    pub async fn generate_manifest(&self, batch: &Batch, table_info: &TableInfo) -> Result<PathBuf> {
        let dir = self
            .resolver
            .manifests_dir(&[&table_info.database], &table_info.table);
        tokio::fs::create_dir_all(&dir).await?;

        let snapshot_id = unix_nanos() as i64;
        let entries: Vec<ManifestEntry> = batch
            .files
            .iter()
            .map(|f| ManifestEntry {
                status: EntryStatus::Added as i32,
                snapshot_id,
                data_sequence_number: 1,
                file_sequence_number: 1,
                data_file: DataFile {
                    file_path: f.file_path.clone(),
                    file_format: "PARQUET".to_string(),
                    partition: parse_partition_path(f.partition_path.as_deref().unwrap_or("")),
                    record_count: f.row_count,
                    file_size_in_bytes: f.file_size,
                    column_sizes: None,
                    value_counts: None,
                    null_value_counts: None,
                    lower_bounds: None,
                    upper_bounds: None,
                    split_offsets: None,
                    sort_order_id: None,
                },
            })
            .collect();

        let document = ManifestDocument {
            manifest_type: "ENTRY".to_string(),
            content: 0,
            sequence_number: 1,
            min_sequence_number: 1,
            entries,
        };

        let file_name = PathResolver::manifest_file_name(&batch.id, unix_nanos());
        let path = dir.join(file_name);
        let body = serde_json::to_vec(&document)?;
        let bytes = avro_envelope::wrap("manifest_entry", &body);
        write_atomic(&path, &bytes).await?;
        Ok(path)
    }

    /// Writes `metadata/metadata-<unix_nanos>.avro` summarizing the batch
    /// against the manifest just written, and returns its absolute path.
    #[instrument(skip(self, batch, table_info))]
    pub async fn update_metadata_file(
        &self,
        batch: &Batch,
        manifest_path: &std::path::Path,
        table_info: &TableInfo,
    ) -> Result<PathBuf> {
        let dir = self
            .resolver
            .metadata_dir(&[&table_info.database], &table_info.table);
        tokio::fs::create_dir_all(&dir).await?;

        let added_records = batch.total_rows();
        let added_files_size = batch.total_size();
        let snapshot_id = unix_nanos() as i64;

        let document = SnapshotDocument {
            snapshot_id,
            timestamp_ms: unix_millis() as i64,
            summary: SnapshotSummary {
                operation: "append".to_string(),
                added_files: batch.files.len() as i64,
                added_records,
                added_files_size,
            },
            manifest_list: manifest_path.to_string_lossy().into_owned(),
            schema_id: table_info.schema_id,
            parent_snapshot_id: None,
            manifests: vec![ManifestFileInfo {
                manifest_path: manifest_path.to_string_lossy().into_owned(),
                added_data_files_count: batch.files.len() as i64,
                added_rows_count: added_records,
            }],
        };

        let file_name = PathResolver::snapshot_file_name(unix_nanos());
        let path = dir.join(file_name);
        let body = serde_json::to_vec(&document)?;
        let bytes = avro_envelope::wrap("snapshot", &body);
        write_atomic(&path, &bytes).await?;
        Ok(path)
    }
}

/// Parses `k1=v1/k2=v2/...`. Malformed segments (no `=`, empty key) are
/// skipped; an empty path yields an empty map (spec.md §4.8 "Partition parsing").
pub fn parse_partition_path(path: &str) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    if path.is_empty() {
        return map;
    }
    for segment in path.split('/') {
        let Some((key, value)) = segment.split_once('=') else {
            continue;
        };
        if key.is_empty() {
            continue;
        }
        map.insert(key.to_string(), value.to_string());
    }
    map
}

/// Inverse of [`parse_partition_path`] for keys/values free of `/` and `=`
/// (spec.md §8 property P8).
pub fn format_partition_path(values: &BTreeMap<String, String>) -> String {
    values
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("/")
}

async fn write_atomic(path: &std::path::Path, bytes: &[u8]) -> Result<()> {
    let tmp_path = path.with_extension("tmp");
    tokio::fs::write(&tmp_path, bytes).await?;
    tokio::fs::rename(&tmp_path, path).await?;
    Ok(())
}

fn unix_nanos() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_nanos()
}

fn unix_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use lakehouse_registry::TableFile;
    use tempfile::tempdir;

    fn file(id: i64, partition: Option<&str>) -> TableFile {
        TableFile {
            id,
            table_id: 1,
            file_name: format!("f{id}.parquet"),
            file_path: format!("/data/f{id}.parquet"),
            file_size: 1024,
            file_type: "parquet".to_string(),
            partition_path: partition.map(|s| s.to_string()),
            row_count: 100,
            checksum: None,
            is_compressed: false,
            iceberg_metadata_state: "pending".to_string(),
            created_at: "now".to_string(),
            updated_at: "now".to_string(),
        }
    }

    #[test]
    fn parses_well_formed_partition_path() {
        let map = parse_partition_path("year=2024/month=1");
        assert_eq!(map.get("year").unwrap(), "2024");
        assert_eq!(map.get("month").unwrap(), "1");
    }

    #[test]
    fn skips_malformed_segments() {
        let map = parse_partition_path("year=2024/bogus/=novalue");
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("year").unwrap(), "2024");
    }

    #[test]
    fn empty_path_yields_empty_map() {
        assert!(parse_partition_path("").is_empty());
    }

    #[test]
    fn round_trips_partition_path_property_p8() {
        let mut map = BTreeMap::new();
        map.insert("year".to_string(), "2024".to_string());
        map.insert("month".to_string(), "1".to_string());
        let formatted = format_partition_path(&map);
        assert_eq!(parse_partition_path(&formatted), map);
    }

    #[tokio::test]
    async fn writes_manifest_and_snapshot_with_matching_totals() {
        let tmp = tempdir().unwrap();
        let resolver = PathResolver::new(tmp.path());
        let generator = MetadataGenerator::new(resolver);
        let table_info = TableInfo {
            database: "sales".to_string(),
            table: "orders".to_string(),
            schema_id: 1,
        };

        let batch = Batch {
            id: "batch-1".to_string(),
            created_at_unix_nanos: 1,
            status: crate::planner::BatchStatus::Pending,
            files: vec![file(1, Some("year=2024/month=1"))],
        };

        let manifest_path = generator.generate_manifest(&batch, &table_info).await.unwrap();
        assert!(manifest_path.exists());
        assert!(manifest_path.starts_with(
            tmp.path().join("tables").join("sales").join("orders").join("manifests")
        ));

        let raw = tokio::fs::read(&manifest_path).await.unwrap();
        let (schema_name, body) = avro_envelope::unwrap(&raw).unwrap();
        assert_eq!(schema_name, "manifest_entry");
        let doc: ManifestDocument = serde_json::from_slice(body).unwrap();
        assert_eq!(doc.entries.len(), 1);
        assert_eq!(doc.entries[0].data_file.record_count, 100);

        let snapshot_path = generator
            .update_metadata_file(&batch, &manifest_path, &table_info)
            .await
            .unwrap();
        assert!(snapshot_path.exists());

        let raw = tokio::fs::read(&snapshot_path).await.unwrap();
        let (schema_name, body) = avro_envelope::unwrap(&raw).unwrap();
        assert_eq!(schema_name, "snapshot");
        let snapshot: SnapshotDocument = serde_json::from_slice(body).unwrap();
        assert_eq!(snapshot.summary.added_files, 1);
        assert_eq!(snapshot.summary.added_records, 100);
        assert_eq!(snapshot.summary.added_files_size, 1024);
    }
}
