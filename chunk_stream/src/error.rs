use std::sync::Arc;

use thiserror::Error;

/// Errors that can occur while streaming a file out of a chunked download.
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum StreamError {
    #[error("Configuration Error: {0}")]
    ConfigurationError(String),

    #[error("IO Error: {0}")]
    IoError(Arc<std::io::Error>),

    #[error("Transfer Engine Error: {0}")]
    EngineError(Arc<transfer_engine::EngineError>),

    #[error("Session Failure: {0}")]
    SessionFailure(String),

    #[error("Stream aborted by shutdown request")]
    Aborted,

    #[error("Internal Error: {0}")]
    InternalError(String),
}

pub type Result<T> = std::result::Result<T, StreamError>;

impl From<std::io::Error> for StreamError {
    fn from(err: std::io::Error) -> Self {
        StreamError::IoError(Arc::new(err))
    }
}

impl From<transfer_engine::EngineError> for StreamError {
    fn from(err: transfer_engine::EngineError) -> Self {
        StreamError::EngineError(Arc::new(err))
    }
}
