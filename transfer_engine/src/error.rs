use thiserror::Error;

/// Errors surfaced by a transfer engine implementation.
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum EngineError {
    #[error("Invalid file index {0} for this download")]
    InvalidFileIndex(usize),

    #[error("No active session")]
    SessionNotActive,

    #[error("Session Failure: {0}")]
    SessionFailure(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
