use std::io;
use thiserror::Error;

/// Failures raised by an event feed or its authentication exchange.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeedError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("unexpected feed response: {0}")]
    Protocol(String),

    #[error("batch was not acknowledged within {0} ms")]
    AckTimeout(u64),

    #[error("batch redelivery ceiling reached after {attempts} attempts: {last_error}")]
    RedeliveryExhausted { attempts: u32, last_error: String },
}

/// Failures raised by the store sink.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    /// The store is closed or was never opened. Pipelines treat this as fatal.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A single statement failed; only the record it carried is affected.
    #[error("statement failed: {0}")]
    Statement(String),
}

#[derive(Error, Debug)]
pub enum ReadModelError {
    #[error("Database not initialized. Call initialize_store first.")]
    NotInitialized,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Projector load error: {0}")]
    Load(String),

    #[error("Feed error: {0}")]
    Feed(#[from] FeedError),

    #[error("Transform error: {0}")]
    Transform(String),

    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("Unrecoverable pipeline error: {0}")]
    Unrecoverable(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl ReadModelError {
    /// Whether the error must terminate a running pipeline instead of being
    /// recorded against a single event.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ReadModelError::NotInitialized
                | ReadModelError::Feed(_)
                | ReadModelError::Sink(SinkError::Unavailable(_))
                | ReadModelError::Unrecoverable(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ReadModelError>;
