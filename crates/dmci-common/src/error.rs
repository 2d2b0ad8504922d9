//! Error types shared by the DMCI crates

use thiserror::Error;

/// Result type alias for DMCI operations
pub type Result<T> = std::result::Result<T, DmciError>;

/// Main error type for DMCI
#[derive(Error, Debug)]
pub enum DmciError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl DmciError {
    pub fn config(msg: impl Into<String>) -> Self {
        DmciError::Config(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        DmciError::Parse(msg.into())
    }
}
