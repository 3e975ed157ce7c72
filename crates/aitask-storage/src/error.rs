//! Storage error types.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to configure storage client: {0}")]
    ConfigError(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Staging failed: {0}")]
    StagingFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("S3 SDK error: {0}")]
    AwsSdk(String),
}

impl StorageError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound(key.into())
    }

    pub fn upload_failed(msg: impl Into<String>) -> Self {
        Self::UploadFailed(msg.into())
    }

    pub fn download_failed(msg: impl Into<String>) -> Self {
        Self::DownloadFailed(msg.into())
    }

    pub fn staging_failed(msg: impl Into<String>) -> Self {
        Self::StagingFailed(msg.into())
    }

    /// A missing object will not appear by retrying; everything else might.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, StorageError::NotFound(_) | StorageError::ConfigError(_))
    }
}
