use lakehouse_error::{ErrorStatus, ErrorStruct};
use std::result;
use thiserror::Error;

/// Custom error type for `lakehouse_coordinator`.
#[derive(Clone, Debug, Error)]
pub enum Error {
    #[error("coordinator already running")]
    AlreadyRunning,

    #[error("coordinator not running")]
    NotRunning,

    #[error("{0}")]
    Registry(ErrorStruct),

    #[error("{0}")]
    Astha(ErrorStruct),

    #[error("{0}")]
    Iceberg(ErrorStruct),
}

pub type Result<T> = result::Result<T, Error>;

impl From<lakehouse_registry::Error> for Error {
    #[track_caller]
    fn from(source: lakehouse_registry::Error) -> Self {
        Error::Registry(
            ErrorStruct::new(format!("registry error: {source}"), ErrorStatus::Temporary)
                .with_source(anyhow::Error::msg(source.to_string())),
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

impl From<lakehouse_iceberg::Error> for Error {
    #[track_caller]
    fn from(source: lakehouse_iceberg::Error) -> Self {
        Error::Iceberg(
            ErrorStruct::new(format!("iceberg manager error: {source}"), ErrorStatus::Temporary)
                .with_source(anyhow::Error::msg(source.to_string())),
        )
    }
}
