//! Row types for the Registry's relational schema (spec.md §3).

use crate::error::Error;
use serde::{Deserialize, Serialize};

/// `tables.table_type`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableType {
    User,
    System,
    Temporary,
    View,
}

impl TableType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TableType::User => "user",
            TableType::System => "system",
            TableType::Temporary => "temporary",
            TableType::View => "view",
        }
    }
}

impl std::str::FromStr for TableType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(TableType::User),
            "system" => Ok(TableType::System),
            "temporary" => Ok(TableType::Temporary),
            "view" => Ok(TableType::View),
            other => Err(Error::InvalidInput(format!("unknown table_type: {other}"))),
        }
    }
}

/// `table_files.iceberg_metadata_state`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IcebergMetadataState {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl IcebergMetadataState {
    pub fn as_str(&self) -> &'static str {
        match self {
            IcebergMetadataState::Pending => "pending",
            IcebergMetadataState::Processing => "processing",
            IcebergMetadataState::Completed => "completed",
            IcebergMetadataState::Failed => "failed",
        }
    }

    /// Invariant 5: `pending -> processing -> completed | failed`, `failed -> pending` on retry.
    pub fn can_transition_to(&self, next: IcebergMetadataState) -> bool {
        use IcebergMetadataState::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Failed, Pending)
        )
    }
}

impl std::str::FromStr for IcebergMetadataState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(IcebergMetadataState::Pending),
            "processing" => Ok(IcebergMetadataState::Processing),
            "completed" => Ok(IcebergMetadataState::Completed),
            "failed" => Ok(IcebergMetadataState::Failed),
            other => Err(Error::InvalidInput(format!(
                "unknown iceberg_metadata_state: {other}"
            ))),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct Database {
    pub id: i64,
    pub name: String,
    pub is_system: bool,
    pub is_read_only: bool,
    pub table_count: i64,
    pub total_size: i64,
    pub created_at: String,
    pub updated_at: String,
    pub deleted_at: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct Table {
    pub id: i64,
    pub database_id: i64,
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub table_type: String,
    pub is_temporary: bool,
    pub is_external: bool,
    pub row_count: i64,
    pub file_count: i64,
    pub total_size: i64,
    pub created_at: String,
    pub updated_at: String,
    pub deleted_at: Option<String>,
}

impl Table {
    pub fn table_type(&self) -> Result<TableType, Error> {
        self.table_type.parse()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct TableColumn {
    pub id: i64,
    pub table_id: i64,
    pub column_name: String,
    pub data_type: String,
    pub is_nullable: bool,
    pub is_primary: bool,
    pub is_unique: bool,
    pub default_value: Option<String>,
    pub ordinal_position: i64,
    pub max_length: Option<i64>,
    pub precision: Option<i64>,
    pub scale: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
}

/// A column definition requested by a caller, prior to being assigned a row id.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewColumn {
    pub column_name: String,
    pub data_type: String,
    pub is_nullable: bool,
    pub is_primary: bool,
    pub is_unique: bool,
    pub default_value: Option<String>,
    pub ordinal_position: i64,
    pub max_length: Option<i64>,
    pub precision: Option<i64>,
    pub scale: Option<i64>,
}

#[derive(Clone, Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct TableMetadata {
    pub table_id: i64,
    pub schema_version: i64,
    pub storage_engine: String,
    pub engine_config: String,
    pub format: String,
    pub compression: String,
    pub partition_by: Option<String>,
    pub sort_by: Option<String>,
    pub settings: String,
    pub last_modified: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct TableFile {
    pub id: i64,
    pub table_id: i64,
    pub file_name: String,
    pub file_path: String,
    pub file_size: i64,
    pub file_type: String,
    pub partition_path: Option<String>,
    pub row_count: i64,
    pub checksum: Option<String>,
    pub is_compressed: bool,
    pub iceberg_metadata_state: String,
    pub created_at: String,
    pub updated_at: String,
}

impl TableFile {
    pub fn iceberg_metadata_state(&self) -> Result<IcebergMetadataState, Error> {
        self.iceberg_metadata_state.parse()
    }
}

/// A file row as reported by the external writer at insertion time (spec.md §3: "Lifecycles").
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewFileInfo {
    pub file_name: String,
    pub file_path: String,
    pub file_size: i64,
    pub file_type: String,
    pub partition_path: Option<String>,
    pub row_count: i64,
    pub checksum: Option<String>,
    pub is_compressed: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct ChangeLogRow {
    pub id: i64,
    pub timestamp: String,
    pub table_name: String,
    pub operation: String,
    pub before: Option<String>,
    pub after: Option<String>,
    pub created_at: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct SchemaVersionRow {
    pub version: i64,
    pub name: String,
    pub applied_at: String,
    pub checksum: String,
}

/// Composite view joining Table, Database and TableMetadata (spec.md §4.2
/// `GetCompleteTableInfoByID`, §9 "lazy related-entity access").
#[derive(Clone, Debug)]
pub struct CompleteTableInfo {
    pub table: Table,
    pub database: Database,
    pub metadata: TableMetadata,
}

/// Full schema export used for cache warm-up (spec.md §4.2 `RetrieveSchema`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TableSchema {
    pub database: String,
    pub table: String,
    pub columns: Vec<TableColumn>,
}
