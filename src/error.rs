//! Error types for the hybrid manual search engine

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid corpus: {0}")]
    InvalidCorpus(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Node not found: {0}")]
    NotFound(String),

    #[error("Missing field `{field}` in record #{index}")]
    MissingField { index: usize, field: &'static str },

    #[error("Invalid record #{index}: {reason}")]
    InvalidRecord { index: usize, reason: String },

    #[error("Index directory is locked by another process")]
    IndexLocked,

    #[error("Failed to acquire index lock: {0}")]
    LockError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::ConfigError(err.to_string())
    }
}
