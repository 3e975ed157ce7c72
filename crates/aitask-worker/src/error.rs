//! Worker error types.

use std::time::Duration;

use aitask_backends::BackendError;
use aitask_queue::QueueError;
use aitask_storage::StorageError;
use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

/// Startup and wiring errors.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }
}

pub type TaskResult<T> = Result<T, TaskError>;

/// Why processing one task failed.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Invalid task payload: {0}")]
    Validation(String),

    #[error("Backend failed: {0}")]
    Backend(#[from] BackendError),

    #[error("Storage failed: {0}")]
    Storage(#[from] StorageError),

    #[error("Queue request failed: {0}")]
    Transport(#[from] QueueError),

    #[error("Task timed out after {0:?}")]
    Timeout(Duration),
}

/// Coarse failure classification, used for policy decisions and metric labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskErrorKind {
    Validation,
    Backend,
    Storage,
    Transport,
    Timeout,
}

impl TaskErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskErrorKind::Validation => "validation",
            TaskErrorKind::Backend => "backend",
            TaskErrorKind::Storage => "storage",
            TaskErrorKind::Transport => "transport",
            TaskErrorKind::Timeout => "timeout",
        }
    }
}

impl TaskError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn kind(&self) -> TaskErrorKind {
        match self {
            TaskError::Validation(_) => TaskErrorKind::Validation,
            TaskError::Backend(_) => TaskErrorKind::Backend,
            TaskError::Storage(_) => TaskErrorKind::Storage,
            TaskError::Transport(_) => TaskErrorKind::Transport,
            TaskError::Timeout(_) => TaskErrorKind::Timeout,
        }
    }

    /// Whether running the task again may succeed.
    pub fn is_retryable(&self) -> bool {
        self.kind() != TaskErrorKind::Validation
    }
}
