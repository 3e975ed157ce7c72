//! Structured task logging utilities.
//!
//! Every line carries the task id, task type and account so a single task
//! can be followed through fetch, invocation, upload and status write.

use aitask_models::{TaskId, TaskType};
use tracing::{error, info, warn, Span};

/// Task logger for structured logging with consistent formatting.
#[derive(Debug, Clone)]
pub struct TaskLogger {
    task_id: String,
    task_type: TaskType,
    account: String,
}

impl TaskLogger {
    pub fn new(task_id: &TaskId, task_type: TaskType, account: &str) -> Self {
        Self {
            task_id: task_id.to_string(),
            task_type,
            account: account.to_string(),
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            task_id = %self.task_id,
            task_type = %self.task_type,
            account = %self.account,
            "Task started: {}", message
        );
    }

    pub fn log_progress(&self, message: &str) {
        info!(
            task_id = %self.task_id,
            task_type = %self.task_type,
            account = %self.account,
            "Task progress: {}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            task_id = %self.task_id,
            task_type = %self.task_type,
            account = %self.account,
            "Task warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            task_id = %self.task_id,
            task_type = %self.task_type,
            account = %self.account,
            "Task error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            task_id = %self.task_id,
            task_type = %self.task_type,
            account = %self.account,
            "Task completed: {}", message
        );
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Span covering one pass over the task.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "task",
            task_id = %self.task_id,
            task_type = %self.task_type,
            account = %self.account
        )
    }
}
