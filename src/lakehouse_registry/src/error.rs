use lakehouse_error::{ErrorStatus, ErrorStruct};
use std::result;
use thiserror::Error;

/// Custom error type for `lakehouse_registry`.
#[derive(Clone, Debug, Error)]
pub enum Error {
    #[error("database not found: {0}")]
    DatabaseNotFound(String),

    #[error("table not found: {0}.{1}")]
    TableNotFound(String, String),

    #[error("database already exists: {0}")]
    DatabaseAlreadyExists(String),

    #[error("table already exists: {0}.{1}")]
    TableAlreadyExists(String, String),

    #[error("table file not found: {0}")]
    TableFileNotFound(i64),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("schema validation failed for column {column} of table {table}: {message}")]
    SchemaValidation {
        table: String,
        column: String,
        message: String,
    },

    #[error("illegal iceberg metadata state transition: {from} -> {to}")]
    IllegalStateTransition { from: String, to: String },

    #[error("{0}")]
    Sqlx(ErrorStruct),

    #[error("{0}")]
    SerdeJson(ErrorStruct),

    #[error("{0}")]
    Io(ErrorStruct),

    #[error("{0}")]
    MigrationFailed(ErrorStruct),
}

pub type Result<T> = result::Result<T, Error>;

impl From<sqlx::Error> for Error {
    #[track_caller]
    fn from(source: sqlx::Error) -> Self {
        let status = match &source {
            sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => ErrorStatus::Temporary,
            _ => ErrorStatus::Permanent,
        };
        Error::Sqlx(
            ErrorStruct::new(format!("sqlite error: {source}"), status).with_source(source),
        )
    }
}

impl From<serde_json::Error> for Error {
    #[track_caller]
    fn from(source: serde_json::Error) -> Self {
        let status = match source.classify() {
            serde_json::error::Category::Io => ErrorStatus::Temporary,
            _ => ErrorStatus::Permanent,
        };
        Error::SerdeJson(
            ErrorStruct::new(format!("serde json error: {source}"), status).with_source(source),
        )
    }
}

impl From<std::io::Error> for Error {
    #[track_caller]
    fn from(source: std::io::Error) -> Self {
        let status = match source.kind() {
            std::io::ErrorKind::TimedOut
            | std::io::ErrorKind::Interrupted
            | std::io::ErrorKind::WouldBlock => ErrorStatus::Temporary,
            _ => ErrorStatus::Permanent,
        };
        Error::Io(ErrorStruct::new(format!("IO error: {source}"), status).with_source(source))
    }
}

impl Error {
    #[track_caller]
    pub fn migration_failed(message: impl Into<String>) -> Self {
        Error::MigrationFailed(ErrorStruct::new(message.into(), ErrorStatus::Permanent))
    }
}
