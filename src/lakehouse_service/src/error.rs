#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("coordinator error: {0}")]
    Coordinator(#[from] lakehouse_coordinator::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
