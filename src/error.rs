use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LabError {
    #[error("Storage error at {path:?}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Unsupported data format: {0}")]
    Format(String),
    #[error("Instrument error: {0}")]
    Instrument(String),
    #[error("Timeout: {0}")]
    Timeout(String),
    #[error("Operation cancelled")]
    Cancelled,
    #[error("Plot error: {0}")]
    Plot(String),
}

impl LabError {
    pub(crate) fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LabError::Storage {
            path: path.into(),
            source,
        }
    }
}

impl From<config::ConfigError> for LabError {
    fn from(e: config::ConfigError) -> Self {
        LabError::Config(e.to_string())
    }
}
