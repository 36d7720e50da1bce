use thiserror::Error;

pub type QgResult<T> = Result<T, QgError>;

#[derive(Error, Debug)]
pub enum QgError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// Rejected input; the message is shown to API clients verbatim.
    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    /// The request conflicts with the current state of a job or device.
    #[error("{0}")]
    Conflict(String),

    #[error("Device allocation error: {0}")]
    Allocation(String),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Test runner error: {0}")]
    Runner(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}
