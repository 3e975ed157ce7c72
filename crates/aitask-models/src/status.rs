//! Integer-coded task status as stored by the queue service.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Task processing status.
///
/// The queue stores status as an integer; the codes are part of the wire
/// contract and must not be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(try_from = "i64", into = "i64")]
pub enum TaskStatus {
    /// Waiting for a worker
    #[default]
    Pending,
    /// Artifacts stored and result written
    Completed,
    /// Owned by a worker under a lease
    Claimed,
    /// Dead-lettered after a permanent error or exhausted attempts
    Failed,
}

impl TaskStatus {
    pub fn code(&self) -> i64 {
        match self {
            TaskStatus::Pending => 0,
            TaskStatus::Completed => 1,
            TaskStatus::Claimed => 2,
            TaskStatus::Failed => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Completed => "completed",
            TaskStatus::Claimed => "claimed",
            TaskStatus::Failed => "failed",
        }
    }

    /// Check if this is a terminal state (no more updates expected).
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Status code not defined by the wire contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unknown task status code {0}")]
pub struct UnknownStatus(pub i64);

impl TryFrom<i64> for TaskStatus {
    type Error = UnknownStatus;

    fn try_from(code: i64) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(TaskStatus::Pending),
            1 => Ok(TaskStatus::Completed),
            2 => Ok(TaskStatus::Claimed),
            3 => Ok(TaskStatus::Failed),
            other => Err(UnknownStatus(other)),
        }
    }
}

impl From<TaskStatus> for i64 {
    fn from(status: TaskStatus) -> Self {
        status.code()
    }
}
