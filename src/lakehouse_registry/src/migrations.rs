//! Schema DDL, the migration ledger, and the CDC trigger installer
//! (spec.md §4.2 migration management, §4.3 CDC Trigger Installer).

use crate::error::{Error, Result};
use sqlx::SqlitePool;
use tracing::info;

/// Monitored tables: every one gets insert/update/delete/updated_at triggers.
pub const MONITORED_TABLES: &[&str] = &["tables", "table_files", "table_metadata"];

/// Current schema version. Bumped whenever DDL or migrations change.
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// Base DDL applied as migration 1. Later migrations are appended to
/// `MIGRATIONS` below and tracked in `schema_versions`.
const MIGRATION_1_NAME: &str = "001_initial_schema";
const MIGRATION_1_SQL: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS databases (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        name        TEXT NOT NULL UNIQUE,
        is_system   INTEGER NOT NULL DEFAULT 0,
        is_read_only INTEGER NOT NULL DEFAULT 0,
        table_count INTEGER NOT NULL DEFAULT 0,
        total_size  INTEGER NOT NULL DEFAULT 0,
        created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
        updated_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
        deleted_at  TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS tables (
        id            INTEGER PRIMARY KEY AUTOINCREMENT,
        database_id   INTEGER NOT NULL REFERENCES databases(id) ON DELETE CASCADE,
        name          TEXT NOT NULL,
        display_name  TEXT NOT NULL DEFAULT '',
        description   TEXT NOT NULL DEFAULT '',
        table_type    TEXT NOT NULL DEFAULT 'user',
        is_temporary  INTEGER NOT NULL DEFAULT 0,
        is_external   INTEGER NOT NULL DEFAULT 0,
        row_count     INTEGER NOT NULL DEFAULT 0,
        file_count    INTEGER NOT NULL DEFAULT 0,
        total_size    INTEGER NOT NULL DEFAULT 0,
        created_at    TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
        updated_at    TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
        deleted_at    TEXT,
        UNIQUE(database_id, name)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_tables_database ON tables(database_id)",
    r#"
    CREATE TABLE IF NOT EXISTS table_columns (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        table_id         INTEGER NOT NULL REFERENCES tables(id) ON DELETE CASCADE,
        column_name      TEXT NOT NULL,
        data_type        TEXT NOT NULL,
        is_nullable      INTEGER NOT NULL DEFAULT 1,
        is_primary       INTEGER NOT NULL DEFAULT 0,
        is_unique        INTEGER NOT NULL DEFAULT 0,
        default_value    TEXT,
        ordinal_position INTEGER NOT NULL,
        max_length       INTEGER,
        precision        INTEGER,
        scale            INTEGER,
        created_at       TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
        updated_at       TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
        UNIQUE(table_id, ordinal_position),
        UNIQUE(table_id, column_name)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_table_columns_table ON table_columns(table_id)",
    r#"
    CREATE TABLE IF NOT EXISTS table_metadata (
        table_id        INTEGER PRIMARY KEY REFERENCES tables(id) ON DELETE CASCADE,
        schema_version  INTEGER NOT NULL DEFAULT 1,
        storage_engine  TEXT NOT NULL,
        engine_config   TEXT NOT NULL DEFAULT '{}',
        format          TEXT NOT NULL DEFAULT 'parquet',
        compression     TEXT NOT NULL DEFAULT 'snappy',
        partition_by    TEXT,
        sort_by         TEXT,
        settings        TEXT NOT NULL DEFAULT '{}',
        last_modified   TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
        created_at      TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
        updated_at      TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS table_files (
        id                     INTEGER PRIMARY KEY AUTOINCREMENT,
        table_id               INTEGER NOT NULL REFERENCES tables(id) ON DELETE CASCADE,
        file_name              TEXT NOT NULL,
        file_path              TEXT NOT NULL,
        file_size              INTEGER NOT NULL,
        file_type              TEXT NOT NULL DEFAULT 'parquet',
        partition_path         TEXT,
        row_count              INTEGER NOT NULL DEFAULT 0,
        checksum               TEXT,
        is_compressed          INTEGER NOT NULL DEFAULT 0,
        iceberg_metadata_state TEXT NOT NULL DEFAULT 'pending',
        created_at             TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
        updated_at             TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_table_files_table ON table_files(table_id)",
    "CREATE INDEX IF NOT EXISTS idx_table_files_state ON table_files(iceberg_metadata_state)",
    r#"
    CREATE TABLE IF NOT EXISTS change_log (
        id         INTEGER PRIMARY KEY AUTOINCREMENT,
        timestamp  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
        table_name TEXT NOT NULL,
        operation  TEXT NOT NULL,
        before     TEXT,
        after      TEXT,
        created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_change_log_table ON change_log(table_name)",
    r#"
    CREATE TABLE IF NOT EXISTS schema_versions (
        version    INTEGER PRIMARY KEY,
        name       TEXT NOT NULL,
        applied_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
        checksum   TEXT NOT NULL
    )
    "#,
];

/// Migrations applied after the initial schema, each tracked once in `schema_versions`.
/// Future migrations are appended here as `(version, name, statements)` tuples.
const MIGRATIONS: &[(i64, &str, &[&str])] = &[];

/// Tables whose rows must exist after migration, or the store refuses to open
/// (spec.md §4.2: "Failure to migrate or verify is fatal").
const EXPECTED_TABLES: &[&str] = &[
    "databases",
    "tables",
    "table_columns",
    "table_metadata",
    "table_files",
    "change_log",
    "schema_versions",
];

/// Applies all pending migrations and installs CDC/updated_at triggers.
/// Idempotent: safe to call on every store open.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query("PRAGMA journal_mode = WAL").execute(pool).await?;
    sqlx::query("PRAGMA busy_timeout = 5000").execute(pool).await?;
    sqlx::query("PRAGMA foreign_keys = ON").execute(pool).await?;

    let mut tx = pool.begin().await?;

    let applied: Option<i64> =
        sqlx::query_scalar("SELECT MAX(version) FROM schema_versions")
            .fetch_optional(&mut *tx)
            .await
            .unwrap_or(None)
            .flatten();

    if applied.is_none() {
        for stmt in MIGRATION_1_SQL {
            sqlx::query(stmt).execute(&mut *tx).await?;
        }
        let checksum = format!("{:x}", md5_like_checksum(MIGRATION_1_SQL));
        sqlx::query("INSERT INTO schema_versions (version, name, checksum) VALUES (?, ?, ?)")
            .bind(1_i64)
            .bind(MIGRATION_1_NAME)
            .bind(checksum)
            .execute(&mut *tx)
            .await?;
    }

    let current = applied.unwrap_or(0).max(1);
    for (version, name, statements) in MIGRATIONS {
        if *version <= current {
            continue;
        }
        for stmt in *statements {
            sqlx::query(stmt).execute(&mut *tx).await?;
        }
        let checksum = format!("{:x}", md5_like_checksum(statements));
        sqlx::query("INSERT INTO schema_versions (version, name, checksum) VALUES (?, ?, ?)")
            .bind(version)
            .bind(*name)
            .bind(checksum)
            .execute(&mut *tx)
            .await?;
    }

    install_cdc_triggers(&mut tx).await?;

    tx.commit().await?;

    verify_expected_tables(pool).await?;

    info!(version = CURRENT_SCHEMA_VERSION, "registry migrations applied");
    Ok(())
}

async fn verify_expected_tables(pool: &SqlitePool) -> Result<()> {
    for table in EXPECTED_TABLES {
        let exists: Option<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type='table' AND name = ?",
        )
        .bind(table)
        .fetch_optional(pool)
        .await?;
        if exists.is_none() {
            return Err(Error::migration_failed(format!(
                "expected table missing after migration: {table}"
            )));
        }
    }
    Ok(())
}

/// Installs, for each monitored table: `<t>__cdc_insert`, `<t>__cdc_update`,
/// `<t>__cdc_delete`, `<t>__updated_at` (spec.md §4.3).
async fn install_cdc_triggers(tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>) -> Result<()> {
    for table in MONITORED_TABLES {
        let columns = columns_for(table);
        let new_json = json_object_expr("NEW", columns);
        let old_json = json_object_expr("OLD", columns);

        let insert_trigger = format!(
            r#"
            CREATE TRIGGER IF NOT EXISTS {table}__cdc_insert
            AFTER INSERT ON {table}
            BEGIN
                INSERT INTO change_log (table_name, operation, before, after)
                VALUES ('{table}', 'INSERT', NULL, {new_json});
            END
            "#
        );
        let update_trigger = format!(
            r#"
            CREATE TRIGGER IF NOT EXISTS {table}__cdc_update
            AFTER UPDATE ON {table}
            BEGIN
                INSERT INTO change_log (table_name, operation, before, after)
                VALUES ('{table}', 'UPDATE', {old_json}, {new_json});
            END
            "#
        );
        let delete_trigger = format!(
            r#"
            CREATE TRIGGER IF NOT EXISTS {table}__cdc_delete
            AFTER DELETE ON {table}
            BEGIN
                INSERT INTO change_log (table_name, operation, before, after)
                VALUES ('{table}', 'DELETE', {old_json}, NULL);
            END
            "#
        );
        let updated_at_trigger = format!(
            r#"
            CREATE TRIGGER IF NOT EXISTS {table}__updated_at
            AFTER UPDATE ON {table}
            WHEN NEW.updated_at = OLD.updated_at
            BEGIN
                UPDATE {table}
                SET updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                WHERE rowid = NEW.rowid;
            END
            "#
        );

        for stmt in [insert_trigger, update_trigger, delete_trigger, updated_at_trigger] {
            sqlx::query(&stmt).execute(&mut **tx).await?;
        }
    }
    Ok(())
}

/// Columns to include in the change-log's `json(NEW)`/`json(OLD)` payload per
/// table. Only called from [`install_cdc_triggers`] with entries of
/// [`MONITORED_TABLES`]; the `panic!` below is unreachable as long as every
/// name added there also gets a match arm here.
fn columns_for(table: &str) -> &'static [&'static str] {
    match table {
        "tables" => &[
            "id",
            "database_id",
            "name",
            "display_name",
            "description",
            "table_type",
            "is_temporary",
            "is_external",
            "row_count",
            "file_count",
            "total_size",
            "created_at",
            "updated_at",
            "deleted_at",
        ],
        "table_files" => &[
            "id",
            "table_id",
            "file_name",
            "file_path",
            "file_size",
            "file_type",
            "partition_path",
            "row_count",
            "checksum",
            "is_compressed",
            "iceberg_metadata_state",
            "created_at",
            "updated_at",
        ],
        "table_metadata" => &[
            "table_id",
            "schema_version",
            "storage_engine",
            "engine_config",
            "format",
            "compression",
            "partition_by",
            "sort_by",
            "settings",
            "last_modified",
            "created_at",
            "updated_at",
        ],
        other => panic!("no column list registered for monitored table {other}"),
    }
}

/// Columns backed by an `INTEGER` 0/1 column but modeled as Rust `bool`
/// fields. SQLite has no boolean type, so `json_object` would otherwise emit
/// these as JSON numbers and break `serde_json`'s decode into the row type.
/// Covers every boolean column of every table currently in
/// [`MONITORED_TABLES`]. `databases.is_system`/`is_read_only` (`Database`'s
/// bool fields) have the same hazard but are dormant today since
/// `databases` isn't monitored — add them here first if that ever changes.
const BOOLEAN_COLUMNS: &[&str] = &["is_temporary", "is_external", "is_compressed"];

/// Builds a `json_object('col', alias.col, ...)` SQL expression, which SQLite's
/// `json()` understands directly. Column-scoped so it works across SQLite
/// versions without relying on `json(NEW)`/`json(OLD)` row-wide shorthand.
/// Columns in [`BOOLEAN_COLUMNS`] are cast through `json(CASE WHEN ... )` so
/// they serialize as JSON `true`/`false` rather than `0`/`1`.
fn json_object_expr(alias: &str, columns: &[&str]) -> String {
    let pairs: Vec<String> = columns
        .iter()
        .map(|c| {
            if BOOLEAN_COLUMNS.contains(c) {
                format!(
                    "'{c}', json(CASE WHEN {alias}.{c} THEN 'true' ELSE 'false' END)"
                )
            } else {
                format!("'{c}', {alias}.{c}")
            }
        })
        .collect();
    format!("json_object({})", pairs.join(", "))
}

/// Cheap content checksum for the migration ledger (not cryptographic; the
/// ledger only needs to detect accidental drift between replicas).
fn md5_like_checksum(statements: &[&str]) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    for stmt in statements {
        stmt.hash(&mut hasher);
    }
    hasher.finish()
}
