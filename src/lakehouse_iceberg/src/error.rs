use lakehouse_error::{ErrorStatus, ErrorStruct};
use std::result;
use thiserror::Error;

/// Custom error type for `lakehouse_iceberg`.
#[derive(Clone, Debug, Error)]
pub enum Error {
    #[error("worker pool already running")]
    AlreadyRunning,

    #[error("worker pool not running")]
    NotRunning,

    #[error("task queue is full")]
    QueueFull,

    #[error("file {0} is already queued")]
    AlreadyQueued(i64),

    #[error("file {0} is not in the processing set")]
    NotProcessing(i64),

    #[error("unknown change-log operation: {0}")]
    UnknownOperation(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("{0}")]
    FileSystem(ErrorStruct),

    #[error("{0}")]
    Registry(ErrorStruct),

    #[error("{0}")]
    SerdeJson(ErrorStruct),

    #[error("{0}")]
    Astha(ErrorStruct),

    #[error("{0}")]
    Internal(ErrorStruct),
}

pub type Result<T> = result::Result<T, Error>;

impl From<std::io::Error> for Error {
    #[track_caller]
    fn from(source: std::io::Error) -> Self {
        let status = match source.kind() {
            std::io::ErrorKind::TimedOut
            | std::io::ErrorKind::Interrupted
            | std::io::ErrorKind::WouldBlock => ErrorStatus::Temporary,
            _ => ErrorStatus::Permanent,
        };
        Error::FileSystem(
            ErrorStruct::new(format!("filesystem error: {source}"), status).with_source(source),
        )
    }
}

impl From<lakehouse_registry::Error> for Error {
    #[track_caller]
    fn from(source: lakehouse_registry::Error) -> Self {
        Error::Registry(
            ErrorStruct::new(format!("registry error: {source}"), ErrorStatus::Temporary)
                .with_source(anyhow::Error::msg(source.to_string())),
        )
    }
}

impl From<serde_json::Error> for Error {
    #[track_caller]
    fn from(source: serde_json::Error) -> Self {
        Error::SerdeJson(
            ErrorStruct::new(format!("serde json error: {source}"), ErrorStatus::Permanent)
                .with_source(source),
        )
    }
}

impl From<lakehouse_astha::Error> for Error {
    #[track_caller]
    fn from(source: lakehouse_astha::Error) -> Self {
        Error::Astha(
            ErrorStruct::new(format!("dispatcher error: {source}"), ErrorStatus::Temporary)
                .with_source(anyhow::Error::msg(source.to_string())),
        )
    }
}

impl Error {
    #[track_caller]
    pub fn internal(message: impl Into<String>) -> Self {
        Error::Internal(ErrorStruct::new(message.into(), ErrorStatus::Permanent))
    }
}
