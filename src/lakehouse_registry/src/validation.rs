//! CREATE TABLE validation (spec.md §7): table-level, column-level, storage
//! engine, and engine-config rules. Fails fast on the first offending column.

use crate::entities::NewColumn;
use crate::error::{Error, Result};
use crate::iceberg_type::{parse_iceberg_type, IcebergType};

pub const VALID_STORAGE_ENGINES: &[&str] = &["iceberg", "parquet", "delta", "memory", "filesystem"];
pub const VALID_ICEBERG_FORMATS: &[&str] = &["parquet", "orc", "avro"];
pub const VALID_COMPRESSIONS: &[&str] = &["none", "snappy", "gzip", "lz4", "zstd"];

pub fn validate_table_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidInput("table name must not be empty".to_string()));
    }
    if name.len() > 255 {
        return Err(Error::InvalidInput(format!(
            "table name exceeds 255 characters: {name}"
        )));
    }
    if name.contains(' ') || name.contains('.') {
        return Err(Error::InvalidInput(format!(
            "table name must not contain ' ' or '.': {name}"
        )));
    }
    Ok(())
}

pub fn validate_database_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidInput(
            "database name must not be empty".to_string(),
        ));
    }
    if name.len() > 255 {
        return Err(Error::InvalidInput(format!(
            "database name exceeds 255 characters: {name}"
        )));
    }
    Ok(())
}

/// `is_temporary` and `is_external` are mutually exclusive; `table_type` must
/// be consistent with `is_temporary`.
pub fn validate_table_flags(table_type: &str, is_temporary: bool, is_external: bool) -> Result<()> {
    if is_temporary && is_external {
        return Err(Error::InvalidInput(
            "is_temporary and is_external are mutually exclusive".to_string(),
        ));
    }
    if is_temporary && table_type != "temporary" {
        return Err(Error::InvalidInput(format!(
            "is_temporary=true requires table_type='temporary', got {table_type}"
        )));
    }
    if !is_temporary && table_type == "temporary" {
        return Err(Error::InvalidInput(
            "table_type='temporary' requires is_temporary=true".to_string(),
        ));
    }
    Ok(())
}

pub fn validate_storage_engine(engine: &str) -> Result<()> {
    if !VALID_STORAGE_ENGINES.contains(&engine) {
        return Err(Error::InvalidInput(format!(
            "unknown storage engine '{engine}', expected one of {VALID_STORAGE_ENGINES:?}"
        )));
    }
    Ok(())
}

/// Validates an engine config JSON document against the rules for its engine.
/// Only `iceberg` currently constrains `format`/`compression`; other engines
/// accept any well-formed JSON object.
pub fn validate_engine_config(engine: &str, config: &serde_json::Value) -> Result<()> {
    if !config.is_object() {
        return Err(Error::InvalidInput(
            "engine_config must be a JSON object".to_string(),
        ));
    }
    if engine == "iceberg" {
        if let Some(format) = config.get("format").and_then(|v| v.as_str()) {
            if !VALID_ICEBERG_FORMATS.contains(&format) {
                return Err(Error::InvalidInput(format!(
                    "unknown iceberg format '{format}', expected one of {VALID_ICEBERG_FORMATS:?}"
                )));
            }
        }
        if let Some(compression) = config.get("compression").and_then(|v| v.as_str()) {
            if !VALID_COMPRESSIONS.contains(&compression) {
                return Err(Error::InvalidInput(format!(
                    "unknown compression '{compression}', expected one of {VALID_COMPRESSIONS:?}"
                )));
            }
        }
    }
    Ok(())
}

/// Validates a single column, fail-fast (spec.md §7 rules 1-5). Returns the
/// parsed Iceberg type so the caller can cross-check decimal precision/scale
/// without re-parsing.
pub fn validate_column(table: &str, column: &NewColumn) -> Result<IcebergType> {
    if column.column_name.is_empty() {
        return Err(schema_error(table, &column.column_name, "column name must not be empty"));
    }
    let parsed = parse_iceberg_type(&column.data_type).map_err(|e| {
        schema_error(
            table,
            &column.column_name,
            &format!("failed to parse data_type '{}': {e}", column.data_type),
        )
    })?;

    if let IcebergType::Decimal { precision, scale } = &parsed {
        let stored_precision = column.precision.unwrap_or(-1);
        let stored_scale = column.scale.unwrap_or(-1);
        if stored_precision != *precision as i64 || stored_scale != *scale as i64 {
            return Err(schema_error(
                table,
                &column.column_name,
                &format!(
                    "decimal precision/scale mismatch: column row has ({stored_precision},{stored_scale}), data_type parses to ({precision},{scale})"
                ),
            ));
        }
    }

    if column.ordinal_position < 1 {
        return Err(schema_error(
            table,
            &column.column_name,
            &format!("ordinal_position must be >= 1, got {}", column.ordinal_position),
        ));
    }

    Ok(parsed)
}

/// Validates a whole column set: each column individually (fail-fast), plus
/// name-uniqueness and dense/unique ordinal positions across the set
/// (spec.md §3 invariant 2).
pub fn validate_columns(table: &str, columns: &[NewColumn]) -> Result<()> {
    let mut seen_names = std::collections::HashSet::new();
    let mut seen_ordinals = std::collections::HashSet::new();

    for column in columns {
        validate_column(table, column)?;
        if !seen_names.insert(column.column_name.clone()) {
            return Err(schema_error(
                table,
                &column.column_name,
                "duplicate column name",
            ));
        }
        if !seen_ordinals.insert(column.ordinal_position) {
            return Err(schema_error(
                table,
                &column.column_name,
                &format!("duplicate ordinal_position {}", column.ordinal_position),
            ));
        }
    }

    let mut ordinals: Vec<i64> = columns.iter().map(|c| c.ordinal_position).collect();
    ordinals.sort_unstable();
    for (i, ordinal) in ordinals.iter().enumerate() {
        if *ordinal != (i as i64) + 1 {
            return Err(Error::InvalidInput(format!(
                "ordinal positions for table {table} must be dense starting at 1, got {ordinals:?}"
            )));
        }
    }

    Ok(())
}

fn schema_error(table: &str, column: &str, message: &str) -> Error {
    Error::SchemaValidation {
        table: table.to_string(),
        column: column.to_string(),
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("iceberg")]
    #[case("parquet")]
    #[case("delta")]
    #[case("memory")]
    #[case("filesystem")]
    fn accepts_known_storage_engines(#[case] engine: &str) {
        assert!(validate_storage_engine(engine).is_ok());
    }

    #[rstest]
    #[case("long")]
    #[case("decimal(5,2)")]
    #[case("list<string>")]
    fn accepts_known_column_types(#[case] data_type: &str) {
        let column = col("value", data_type, 1);
        assert!(validate_column("t", &column).is_ok());
    }

    fn col(name: &str, data_type: &str, ordinal: i64) -> NewColumn {
        NewColumn {
            column_name: name.to_string(),
            data_type: data_type.to_string(),
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

    #[test]
    fn rejects_empty_table_name() {
        assert!(validate_table_name("").is_err());
    }

    #[test]
    fn rejects_name_with_dot_or_space() {
        assert!(validate_table_name("a.b").is_err());
        assert!(validate_table_name("a b").is_err());
    }

    #[test]
    fn accepts_valid_columns_with_dense_ordinals() {
        let columns = vec![col("id", "long", 1), col("name", "string", 2)];
        assert!(validate_columns("orders", &columns).is_ok());
    }

    #[test]
    fn rejects_non_dense_ordinals() {
        let columns = vec![col("id", "long", 1), col("name", "string", 3)];
        assert!(validate_columns("orders", &columns).is_err());
    }

    #[test]
    fn rejects_decimal_mismatch() {
        let mut amount = col("amount", "decimal(10,2)", 2);
        amount.precision = Some(8);
        amount.scale = Some(2);
        let columns = vec![col("id", "long", 1), amount];
        let err = validate_columns("orders", &columns).unwrap_err();
        match err {
            Error::SchemaValidation { column, .. } => assert_eq!(column, "amount"),
            other => panic!("expected SchemaValidation, got {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_storage_engine() {
        assert!(validate_storage_engine("oracle").is_err());
    }

    #[test]
    fn mutually_exclusive_temp_and_external() {
        assert!(validate_table_flags("user", true, true).is_err());
    }
}
