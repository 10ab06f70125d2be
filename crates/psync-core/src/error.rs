use thiserror::Error;

pub type PsyncResult<T> = Result<T, PsyncError>;

#[derive(Debug, Error)]
pub enum PsyncError {
    #[error("sync error: {0}")]
    Sync(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
