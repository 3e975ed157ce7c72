//! Queue abstraction the worker drives.

use std::time::Duration;

use aitask_models::{Task, TaskStatus, TaskType};
use async_trait::async_trait;

use crate::error::QueueResult;

/// Result of an attempt to take ownership of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// This worker owns the task until the lease expires.
    Won,
    /// Another worker claimed it first, or it no longer exists.
    Lost,
}

/// Failure bookkeeping written back to a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureUpdate {
    /// Back to pending, not fetchable before `retry_after_ms`.
    Reschedule {
        attempts: u32,
        retry_after_ms: i64,
        error: String,
    },
    /// Terminal failed status.
    DeadLetter { attempts: u32, error: String },
}

impl FailureUpdate {
    pub fn status(&self) -> TaskStatus {
        match self {
            FailureUpdate::Reschedule { .. } => TaskStatus::Pending,
            FailureUpdate::DeadLetter { .. } => TaskStatus::Failed,
        }
    }
}

#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Up to `limit` tasks of `task_type` that are ready to be worked on.
    async fn fetch_pending(&self, task_type: TaskType, limit: usize) -> QueueResult<Vec<Task>>;

    /// Atomically take ownership of `task` for `lease`.
    ///
    /// Two writes: an increment of `claimSeq` that also sets the lease, then,
    /// for the winner only, the claimed status. The lease alone hides the task
    /// from lease-aware fetches between the two.
    async fn claim(&self, task: &Task, lease: Duration) -> QueueResult<ClaimOutcome>;

    /// Whether the claim won from the `task` snapshot is still the latest one.
    ///
    /// False once the lease was taken over, the task was released or finished,
    /// or another claim attempt bumped `claimSeq`.
    async fn holds_claim(&self, task: &Task) -> QueueResult<bool>;

    /// Give a claimed task back to the pending pool untouched.
    async fn release(&self, task: &Task) -> QueueResult<()>;

    /// Write status and result list. Idempotent.
    async fn report_result(&self, task: &Task, status: TaskStatus, results: &[String]) -> QueueResult<()>;

    async fn report_failure(&self, task: &Task, update: &FailureUpdate) -> QueueResult<()>;
}
