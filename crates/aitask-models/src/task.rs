//! Queue task model.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use crate::status::TaskStatus;
use crate::task_type::TaskType;

/// Server-assigned task identifier (`objectId`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A unit of work fetched from the queue.
///
/// The worker holds a transient copy for the duration of one processing
/// pass. It is never mutated locally; all changes go through the queue client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    #[serde(rename = "objectId")]
    pub id: TaskId,

    #[serde(rename = "type")]
    pub task_type: TaskType,

    #[serde(default)]
    pub status: TaskStatus,

    /// Type-specific payload, forwarded to the backend as-is.
    ///
    /// `None` only when the key is absent; an explicit `null` is `Some(Value::Null)`.
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub data: Option<serde_json::Value>,

    /// Artifact URLs, empty until completion.
    #[serde(default)]
    pub result: Vec<String>,

    /// Failed attempts so far.
    #[serde(default)]
    pub attempts: u32,

    /// Monotonic claim counter, bumped atomically by each claim attempt.
    #[serde(default, rename = "claimSeq")]
    pub claim_seq: u64,

    /// Earliest time (epoch millis) a rescheduled task may be picked up again.
    #[serde(default, rename = "retryAfter", skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<i64>,

    #[serde(default, rename = "lastError", skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executor: Option<String>,

    /// End of the current claim (epoch millis). Set by the first claim write.
    #[serde(default, rename = "leaseExpiresAt", skip_serializing_if = "Option::is_none")]
    pub lease_expires_at: Option<i64>,
}

/// Keeps a present `null` apart from a missing key; `default` covers the latter.
fn present<'de, D>(deserializer: D) -> Result<Option<serde_json::Value>, D::Error>
where
    D: Deserializer<'de>,
{
    serde_json::Value::deserialize(deserializer).map(Some)
}

impl Task {
    /// Create a pending task with the given payload.
    pub fn new(id: impl Into<String>, task_type: TaskType, data: Option<serde_json::Value>) -> Self {
        Self {
            id: TaskId::from_string(id),
            task_type,
            status: TaskStatus::Pending,
            data,
            result: Vec::new(),
            attempts: 0,
            claim_seq: 0,
            retry_after: None,
            last_error: None,
            executor: None,
            lease_expires_at: None,
        }
    }

    /// Look up a string field in the payload.
    pub fn data_str(&self, field: &str) -> Option<&str> {
        self.data.as_ref()?.get(field)?.as_str()
    }
}
