use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("STORAGE_UNAVAILABLE: {0}")]
    StorageUnavailable(String),
    #[error("STORAGE_FAILURE: {0}")]
    Storage(String),
    #[error("CONFIG_INVALID: {0}")]
    Config(String),
    #[error("IO_FAILURE: {0}")]
    Io(String),
    #[error("NOT_FOUND: {0}")]
    NotFound(String),
    #[error("PIPELINE_INVALID: {0}")]
    Pipeline(String),
    #[error("INTERNAL: {0}")]
    Internal(String),
}

impl AppError {
    /// True for failures that mean the networked store cannot be reached at all.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::StorageUnavailable(_))
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value.to_string())
    }
}

impl From<redis::RedisError> for AppError {
    fn from(value: redis::RedisError) -> Self {
        if value.is_connection_refusal() || value.is_timeout() || value.is_connection_dropped() || value.is_io_error() {
            Self::StorageUnavailable(value.to_string())
        } else {
            Self::Storage(value.to_string())
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(value: serde_json::Error) -> Self {
        Self::Internal(value.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(value: serde_yaml::Error) -> Self {
        Self::Pipeline(value.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;
