use lakehouse_error::{ErrorStatus, ErrorStruct};
use std::result;
use thiserror::Error;

/// Custom error type for `lakehouse_astha`.
#[derive(Clone, Debug, Error)]
pub enum Error {
    #[error("dispatcher already running")]
    AlreadyRunning,

    #[error("dispatcher not running")]
    NotRunning,

    #[error("unknown change-log operation: {0}")]
    UnknownOperation(String),

    #[error("subscriber {component} failed on event {event_id}: {message}")]
    Subscriber {
        component: String,
        event_id: i64,
        message: String,
    },

    #[error("{0}")]
    Registry(ErrorStruct),

    #[error("{0}")]
    SerdeJson(ErrorStruct),
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

impl From<serde_json::Error> for Error {
    #[track_caller]
    fn from(source: serde_json::Error) -> Self {
        Error::SerdeJson(
            ErrorStruct::new(format!("serde json error: {source}"), ErrorStatus::Permanent)
                .with_source(source),
        )
    }
}
