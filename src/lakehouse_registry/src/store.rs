//! `Registry`: the SQLite-backed relational store (spec.md §4.2). Owns the
//! connection pool and the on-disk namespace directories; every mutating
//! operation is a single transaction so partial state is never observable.

use crate::entities::{
    ChangeLogRow, CompleteTableInfo, Database, NewColumn, NewFileInfo, Table, TableColumn,
    TableFile, TableMetadata, TableSchema,
};
use crate::error::{Error, Result};
use crate::migrations;
use crate::validation;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::instrument;

/// Authoritative persistence for databases, tables, columns, metadata and
/// files. Holds no in-memory mutable state beyond the pool and the base
/// directory (spec.md §4.2: "the store itself holds no in-memory mutable
/// state other than a cached connection pool").
pub struct Registry {
    pool: SqlitePool,
    base_dir: PathBuf,
}

impl Registry {
    /// Opens (creating if absent) the SQLite database at `database_url`
    /// (e.g. `sqlite://path/to/registry.db`), runs migrations, and ensures
    /// `base_dir` exists. Migration or verification failure is fatal.
    #[instrument(skip(database_url))]
    pub async fn open(database_url: &str, base_dir: impl Into<PathBuf>) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| Error::InvalidInput(format!("invalid database url: {e}")))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        migrations::run_migrations(&pool).await?;

        let base_dir = base_dir.into();
        tokio::fs::create_dir_all(&base_dir).await?;
        Ok(Self { pool, base_dir })
    }

    /// `databases/<db>/` (spec.md §6 filesystem layout).
    fn database_dir(&self, database: &str) -> PathBuf {
        self.base_dir.join("databases").join(database)
    }

    /// `tables/<db>/<table>/` (spec.md §6); the `lakehouse_iceberg::PathResolver`
    /// rooted at the same `base_dir` derives `data/`, `metadata/` and
    /// `manifests/` beneath this same directory.
    fn table_dir(&self, database: &str, table: &str) -> PathBuf {
        self.base_dir.join("tables").join(database).join(table)
    }

    #[instrument(skip(self))]
    pub async fn create_database(&self, name: &str) -> Result<Database> {
        validation::validate_database_name(name)?;

        let mut tx = self.pool.begin().await?;
        let existing: Option<i64> =
            sqlx::query_scalar("SELECT id FROM databases WHERE name = ? AND deleted_at IS NULL")
                .bind(name)
                .fetch_optional(&mut *tx)
                .await?;
        if existing.is_some() {
            return Err(Error::DatabaseAlreadyExists(name.to_string()));
        }

        let id = sqlx::query("INSERT INTO databases (name) VALUES (?)")
            .bind(name)
            .execute(&mut *tx)
            .await?
            .last_insert_rowid();
        let database = fetch_database_by_id(&mut tx, id).await?;

        tokio::fs::create_dir_all(self.database_dir(name)).await?;
        tx.commit().await?;
        Ok(database)
    }

    #[instrument(skip(self))]
    pub async fn drop_database(&self, name: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let id: Option<i64> =
            sqlx::query_scalar("SELECT id FROM databases WHERE name = ? AND deleted_at IS NULL")
                .bind(name)
                .fetch_optional(&mut *tx)
                .await?;
        let id = id.ok_or_else(|| Error::DatabaseNotFound(name.to_string()))?;

        // FK cascade (ON DELETE CASCADE, foreign_keys=ON) removes tables,
        // columns, metadata and files in the same statement.
        sqlx::query("DELETE FROM databases WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        remove_dir_if_exists(&self.database_dir(name)).await?;
        Ok(())
    }

    /// `CreateTable`: Table + TableMetadata, with no columns (spec.md §4.2).
    /// Does not insert the "initial TableFile placeholder" spec.md §4.2
    /// names; see SPEC_FULL.md §4.2 for why it's a deliberate divergence.
    #[instrument(skip(self, engine_config))]
    pub async fn create_table(
        &self,
        database: &str,
        name: &str,
        storage_engine: &str,
        engine_config: serde_json::Value,
    ) -> Result<Table> {
        self.create_table_with_columns_impl(database, name, &[], storage_engine, engine_config)
            .await
    }

    /// `CreateTableWithColumns`: Table + TableMetadata + all Columns in a
    /// single transaction. Fails fast on the first invalid column; the
    /// entire transaction rolls back on any failure (spec.md §4.2, §7).
    #[instrument(skip(self, columns, engine_config))]
    pub async fn create_table_with_columns(
        &self,
        database: &str,
        name: &str,
        columns: &[NewColumn],
        storage_engine: &str,
        engine_config: serde_json::Value,
    ) -> Result<Table> {
        self.create_table_with_columns_impl(database, name, columns, storage_engine, engine_config)
            .await
    }

    async fn create_table_with_columns_impl(
        &self,
        database: &str,
        name: &str,
        columns: &[NewColumn],
        storage_engine: &str,
        engine_config: serde_json::Value,
    ) -> Result<Table> {
        validation::validate_table_name(name)?;
        validation::validate_storage_engine(storage_engine)?;
        validation::validate_engine_config(storage_engine, &engine_config)?;
        validation::validate_columns(name, columns)?;

        let mut tx = self.pool.begin().await?;
        let database_id = fetch_database_id(&mut tx, database).await?;

        let exists: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM tables WHERE database_id = ? AND name = ? AND deleted_at IS NULL",
        )
        .bind(database_id)
        .bind(name)
        .fetch_optional(&mut *tx)
        .await?;
        if exists.is_some() {
            return Err(Error::TableAlreadyExists(database.to_string(), name.to_string()));
        }

        let table_id = sqlx::query(
            "INSERT INTO tables (database_id, name, table_type) VALUES (?, ?, 'user')",
        )
        .bind(database_id)
        .bind(name)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        let engine_config_text = serde_json::to_string(&engine_config)?;
        sqlx::query(
            "INSERT INTO table_metadata (table_id, storage_engine, engine_config) VALUES (?, ?, ?)",
        )
        .bind(table_id)
        .bind(storage_engine)
        .bind(engine_config_text)
        .execute(&mut *tx)
        .await?;

        for column in columns {
            sqlx::query(
                r#"
                INSERT INTO table_columns
                    (table_id, column_name, data_type, is_nullable, is_primary, is_unique,
                     default_value, ordinal_position, max_length, precision, scale)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(table_id)
            .bind(&column.column_name)
            .bind(&column.data_type)
            .bind(column.is_nullable)
            .bind(column.is_primary)
            .bind(column.is_unique)
            .bind(&column.default_value)
            .bind(column.ordinal_position)
            .bind(column.max_length)
            .bind(column.precision)
            .bind(column.scale)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("UPDATE databases SET table_count = table_count + 1 WHERE id = ?")
            .bind(database_id)
            .execute(&mut *tx)
            .await?;

        let table = fetch_table_by_id(&mut tx, table_id).await?;

        tokio::fs::create_dir_all(self.table_dir(database, name)).await?;
        tx.commit().await?;
        Ok(table)
    }

    #[instrument(skip(self))]
    pub async fn drop_table(&self, database: &str, table: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let database_id = fetch_database_id(&mut tx, database).await?;

        let table_id: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM tables WHERE database_id = ? AND name = ? AND deleted_at IS NULL",
        )
        .bind(database_id)
        .bind(table)
        .fetch_optional(&mut *tx)
        .await?;
        let table_id =
            table_id.ok_or_else(|| Error::TableNotFound(database.to_string(), table.to_string()))?;

        sqlx::query("DELETE FROM tables WHERE id = ?")
            .bind(table_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE databases SET table_count = table_count - 1 WHERE id = ?")
            .bind(database_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        remove_dir_if_exists(&self.table_dir(database, table)).await?;
        Ok(())
    }

    pub async fn list_databases(&self) -> Result<Vec<String>> {
        let names: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM databases WHERE deleted_at IS NULL ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(names)
    }

    pub async fn list_tables(&self, database: &str) -> Result<Vec<String>> {
        let mut conn = self.pool.acquire().await?;
        let database_id = fetch_database_id(&mut conn, database).await?;
        let names: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM tables WHERE database_id = ? AND deleted_at IS NULL ORDER BY name",
        )
        .bind(database_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(names)
    }

    pub async fn database_exists(&self, name: &str) -> Result<bool> {
        let id: Option<i64> =
            sqlx::query_scalar("SELECT id FROM databases WHERE name = ? AND deleted_at IS NULL")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;
        Ok(id.is_some())
    }

    pub async fn table_exists(&self, database: &str, table: &str) -> Result<bool> {
        let Some(database_id) = self.lookup_database_id(database).await? else {
            return Ok(false);
        };
        let id: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM tables WHERE database_id = ? AND name = ? AND deleted_at IS NULL",
        )
        .bind(database_id)
        .bind(table)
        .fetch_optional(&self.pool)
        .await?;
        Ok(id.is_some())
    }

    async fn lookup_database_id(&self, database: &str) -> Result<Option<i64>> {
        let id: Option<i64> =
            sqlx::query_scalar("SELECT id FROM databases WHERE name = ? AND deleted_at IS NULL")
                .bind(database)
                .fetch_optional(&self.pool)
                .await?;
        Ok(id)
    }

    /// Files awaiting (or retrying) Iceberg metadata generation, oldest
    /// first (spec.md §4.2, consumed by the Iceberg Manager's recovery path).
    pub async fn get_pending_files_for_iceberg(&self) -> Result<Vec<TableFile>> {
        let files = sqlx::query_as::<_, TableFile>(
            r#"
            SELECT * FROM table_files
            WHERE iceberg_metadata_state IN ('pending', 'failed')
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(files)
    }

    /// One transaction: insert a `pending` TableFile row and roll its
    /// row_count/file_size/file_count into the parent Table (spec.md §4.2,
    /// invariant 1).
    #[instrument(skip(self, file))]
    pub async fn update_table_after_insertion(
        &self,
        database: &str,
        table: &str,
        file: NewFileInfo,
    ) -> Result<TableFile> {
        let mut tx = self.pool.begin().await?;
        let database_id = fetch_database_id(&mut tx, database).await?;
        let table_id: i64 = sqlx::query_scalar(
            "SELECT id FROM tables WHERE database_id = ? AND name = ? AND deleted_at IS NULL",
        )
        .bind(database_id)
        .bind(table)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| Error::TableNotFound(database.to_string(), table.to_string()))?;

        let file_id = sqlx::query(
            r#"
            INSERT INTO table_files
                (table_id, file_name, file_path, file_size, file_type, partition_path,
                 row_count, checksum, is_compressed, iceberg_metadata_state)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 'pending')
            "#,
        )
        .bind(table_id)
        .bind(&file.file_name)
        .bind(&file.file_path)
        .bind(file.file_size)
        .bind(&file.file_type)
        .bind(&file.partition_path)
        .bind(file.row_count)
        .bind(&file.checksum)
        .bind(file.is_compressed)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        sqlx::query(
            r#"
            UPDATE tables
            SET row_count = row_count + ?,
                total_size = total_size + ?,
                file_count = file_count + 1
            WHERE id = ?
            "#,
        )
        .bind(file.row_count)
        .bind(file.file_size)
        .bind(table_id)
        .execute(&mut *tx)
        .await?;

        let file_row = sqlx::query_as::<_, TableFile>("SELECT * FROM table_files WHERE id = ?")
            .bind(file_id)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(file_row)
    }

    /// Applies a legal `iceberg_metadata_state` transition (spec.md §3
    /// invariant 5). Rejects illegal transitions without touching the row.
    #[instrument(skip(self))]
    pub async fn transition_file_state(
        &self,
        file_id: i64,
        next: crate::entities::IcebergMetadataState,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let current: Option<String> =
            sqlx::query_scalar("SELECT iceberg_metadata_state FROM table_files WHERE id = ?")
                .bind(file_id)
                .fetch_optional(&mut *tx)
                .await?;
        let current: crate::entities::IcebergMetadataState =
            current.ok_or(Error::TableFileNotFound(file_id))?.parse()?;

        if !current.can_transition_to(next) {
            return Err(Error::IllegalStateTransition {
                from: current.as_str().to_string(),
                to: next.as_str().to_string(),
            });
        }

        sqlx::query("UPDATE table_files SET iceberg_metadata_state = ? WHERE id = ?")
            .bind(next.as_str())
            .bind(file_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Joins Table, Database and TableMetadata (spec.md §4.2). Columns are
    /// fetched lazily via `retrieve_schema`, matching the "lazy related-entity
    /// access" note in §9.
    pub async fn get_complete_table_info_by_id(&self, table_id: i64) -> Result<CompleteTableInfo> {
        let table = sqlx::query_as::<_, Table>("SELECT * FROM tables WHERE id = ?")
            .bind(table_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(Error::TableFileNotFound(table_id))?;
        let database = sqlx::query_as::<_, Database>("SELECT * FROM databases WHERE id = ?")
            .bind(table.database_id)
            .fetch_one(&self.pool)
            .await?;
        let metadata = sqlx::query_as::<_, TableMetadata>(
            "SELECT * FROM table_metadata WHERE table_id = ?",
        )
        .bind(table_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(CompleteTableInfo {
            table,
            database,
            metadata,
        })
    }

    /// Bulk schema export across all databases/tables for cache warm-up.
    pub async fn retrieve_all_schemas(&self) -> Result<Vec<TableSchema>> {
        let pairs: Vec<(String, String, i64)> = sqlx::query_as(
            r#"
            SELECT d.name, t.name, t.id
            FROM tables t
            JOIN databases d ON d.id = t.database_id
            WHERE t.deleted_at IS NULL AND d.deleted_at IS NULL
            ORDER BY d.name, t.name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut schemas = Vec::with_capacity(pairs.len());
        for (database, table, table_id) in pairs {
            let columns = self.columns_for_table_id(table_id).await?;
            schemas.push(TableSchema {
                database,
                table,
                columns,
            });
        }
        Ok(schemas)
    }

    pub async fn retrieve_schema(&self, database: &str, table: &str) -> Result<TableSchema> {
        let mut conn = self.pool.acquire().await?;
        let database_id = fetch_database_id(&mut conn, database).await?;
        let table_id: i64 = sqlx::query_scalar(
            "SELECT id FROM tables WHERE database_id = ? AND name = ? AND deleted_at IS NULL",
        )
        .bind(database_id)
        .bind(table)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::TableNotFound(database.to_string(), table.to_string()))?;

        let columns = self.columns_for_table_id(table_id).await?;
        Ok(TableSchema {
            database: database.to_string(),
            table: table.to_string(),
            columns,
        })
    }

    async fn columns_for_table_id(&self, table_id: i64) -> Result<Vec<TableColumn>> {
        let columns = sqlx::query_as::<_, TableColumn>(
            "SELECT * FROM table_columns WHERE table_id = ? ORDER BY ordinal_position",
        )
        .bind(table_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(columns)
    }

    /// Rows appended since `cursor`, ordered by id (spec.md §4.3: "readers
    /// use `id > cursor` ordering"). Consumed by the Astha poller.
    pub async fn read_change_log_since(&self, cursor: i64, limit: i64) -> Result<Vec<ChangeLogRow>> {
        let rows = sqlx::query_as::<_, ChangeLogRow>(
            "SELECT * FROM change_log WHERE id > ? ORDER BY id ASC LIMIT ?",
        )
        .bind(cursor)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

async fn fetch_database_by_id(tx: &mut Transaction<'_, Sqlite>, id: i64) -> Result<Database> {
    let database = sqlx::query_as::<_, Database>("SELECT * FROM databases WHERE id = ?")
        .bind(id)
        .fetch_one(&mut **tx)
        .await?;
    Ok(database)
}

async fn fetch_table_by_id(tx: &mut Transaction<'_, Sqlite>, id: i64) -> Result<Table> {
    let table = sqlx::query_as::<_, Table>("SELECT * FROM tables WHERE id = ?")
        .bind(id)
        .fetch_one(&mut **tx)
        .await?;
    Ok(table)
}

async fn fetch_database_id(
    executor: &mut sqlx::SqliteConnection,
    name: &str,
) -> Result<i64> {
    sqlx::query_scalar("SELECT id FROM databases WHERE name = ? AND deleted_at IS NULL")
        .bind(name)
        .fetch_optional(executor)
        .await?
        .ok_or_else(|| Error::DatabaseNotFound(name.to_string()))
}

async fn remove_dir_if_exists(path: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
