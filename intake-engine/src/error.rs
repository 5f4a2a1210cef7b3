use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Session {0} is finalized; start a new session for a new request")]
    SessionFinalized(String),

    #[error("Session storage error: {0}")]
    Storage(String),

    #[error("Case creation failed: {0}")]
    CaseCreation(String),

    #[error("Analysis enhancer failed: {0}")]
    Enhancer(String),

    #[error("Invalid scoring table: {0}")]
    InvalidScoringTable(String),

    #[error("Format error: {0}")]
    Format(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
