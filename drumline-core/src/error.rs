use thiserror::Error;

#[derive(Error, Debug)]
pub enum DrumlineError {
    #[error("Input error: {0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("No rule found for hostname {0}")]
    Precondition(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DrumlineError {
    /// Coarse category used by the dispatcher to pick a reporting policy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DrumlineError::Validation(_) => ErrorKind::Validation,
            DrumlineError::Storage(_) | DrumlineError::Database(_) | DrumlineError::Io(_) => {
                ErrorKind::Storage
            }
            DrumlineError::Protocol(_) | DrumlineError::Serialization(_) => ErrorKind::Protocol,
            DrumlineError::Precondition(_) => ErrorKind::Precondition,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Storage,
    Protocol,
    Precondition,
}

pub type Result<T> = std::result::Result<T, DrumlineError>;
