//! Error taxonomy shared across channels.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication rejected: {0}")]
    Auth(String),

    #[error("Challenge not completed in time: {0}")]
    ChallengeTimeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Other error: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
