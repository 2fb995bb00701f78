//! Error types for the entity cache

use thiserror::Error;

use crate::validation::ValidationErrors;

/// Result type for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;

/// Entity cache errors
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Invalid XML in file {file}:\n{message}")]
    InvalidXml { file: String, message: String },

    #[error("Root element mismatch in {file}: expected <{expected}>, found <{found}>")]
    RootMismatch {
        file: String,
        expected: String,
        found: String,
    },

    #[error("{0}")]
    Validation(ValidationErrors),

    #[error("Invalid entity schema for scope {scope}: {message}")]
    InvalidSchema { scope: String, message: String },

    #[error("Unknown scope: {0}")]
    UnknownScope(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Walk error: {0}")]
    Walk(#[from] walkdir::Error),
}

impl CacheError {
    pub(crate) fn invalid_xml(file: &str, message: impl ToString) -> Self {
        Self::InvalidXml {
            file: file.to_string(),
            message: message.to_string(),
        }
    }
}
