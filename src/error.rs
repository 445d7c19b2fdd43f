//! Error taxonomy shared by jobs, the git facade and the stores.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Ledger or repository table could not be read or written.
    #[error("registry error: {0}")]
    Registry(#[from] sqlx::Error),

    /// Stored schema cannot be migrated by this build.
    #[error("schema error: {0}")]
    Schema(String),

    /// Clone, fetch, download, diff, extraction or object lookup failed.
    #[error("upstream error: {0}")]
    Upstream(String),

    /// A follow-on job could not be handed to the queue.
    #[error("enqueue error: {0}")]
    Enqueue(String),

    #[error("notification error: {0}")]
    Notify(String),

    #[error("scan error: {0}")]
    Scan(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("unknown task kind: {0}")]
    UnknownTaskKind(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("metrics error: {0}")]
    Metrics(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn upstream(msg: impl std::fmt::Display) -> Self {
        Error::Upstream(msg.to_string())
    }

    /// True when the work stopped because of an external cancellation signal.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

impl From<git2::Error> for Error {
    fn from(err: git2::Error) -> Self {
        Error::Upstream(err.message().to_string())
    }
}

impl From<prometheus::Error> for Error {
    fn from(err: prometheus::Error) -> Self {
        Error::Metrics(err.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Upstream(err.to_string())
    }
}

impl From<zip::result::ZipError> for Error {
    fn from(err: zip::result::ZipError) -> Self {
        Error::Upstream(format!("archive extraction failed: {}", err))
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::Upstream(format!("task join error: {}", err))
    }
}
