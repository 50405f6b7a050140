use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Invalid metadata for file {file_id}: {reason}")]
    InvalidMetadata { file_id: String, reason: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
}

impl ModelError {
    pub(crate) fn metadata(file_id: &str, reason: impl Into<String>) -> Self {
        ModelError::InvalidMetadata {
            file_id: file_id.to_string(),
            reason: reason.into(),
        }
    }
}

pub type ModelResult<T> = Result<T, ModelError>;
