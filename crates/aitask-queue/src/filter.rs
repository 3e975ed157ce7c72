//! `where` filters for fetching work.

use aitask_models::{Task, TaskStatus, TaskType};
use serde_json::{json, Map, Value};

/// Which tasks besides plain pending ones a fetch may return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FilterMode {
    /// Claims carry a lease. Pending tasks under an unexpired lease are
    /// hidden (a claim in flight), and claimed tasks whose lease has expired
    /// are returned again (crash recovery).
    pub lease_aware: bool,
    /// Skip pending tasks whose `retryAfter` is still in the future.
    pub respect_retry_after: bool,
}

impl FilterMode {
    /// Plain `{"type":T,"status":0}`.
    pub fn legacy() -> Self {
        Self::default()
    }

    fn is_legacy(&self) -> bool {
        !self.lease_aware && !self.respect_retry_after
    }
}

/// Filter for one fetch, evaluated at `now_ms`.
#[derive(Debug, Clone)]
pub struct TaskFilter {
    pub task_type: TaskType,
    pub mode: FilterMode,
    pub now_ms: i64,
}

/// `field` absent, or not after `now_ms`.
fn elapsed_or_unset(field: &str, now_ms: i64) -> [Value; 2] {
    [
        json!({ field: { "$exists": false } }),
        json!({ field: { "$lte": now_ms } }),
    ]
}

impl TaskFilter {
    pub fn new(task_type: TaskType, mode: FilterMode, now_ms: i64) -> Self {
        Self {
            task_type,
            mode,
            now_ms,
        }
    }

    /// The Parse `where` document.
    ///
    /// Parse has no negation we can rely on, so "not in the future" becomes
    /// two clauses per field and the pending clauses are their cross product.
    pub fn to_where(&self) -> Value {
        let pending = TaskStatus::Pending.code();

        if self.mode.is_legacy() {
            return json!({ "type": self.task_type.as_str(), "status": pending });
        }

        let mut conditions: Vec<Vec<Value>> = Vec::new();
        if self.mode.respect_retry_after {
            conditions.push(elapsed_or_unset("retryAfter", self.now_ms).to_vec());
        }
        if self.mode.lease_aware {
            conditions.push(elapsed_or_unset("leaseExpiresAt", self.now_ms).to_vec());
        }

        let mut clauses = vec![json!({ "status": pending })];
        for options in conditions {
            clauses = clauses
                .iter()
                .flat_map(|clause| options.iter().map(move |option| merge(clause, option)))
                .collect();
        }

        if self.mode.lease_aware {
            clauses.push(json!({
                "status": TaskStatus::Claimed.code(),
                "leaseExpiresAt": { "$lte": self.now_ms }
            }));
        }

        json!({ "type": self.task_type.as_str(), "$or": clauses })
    }

    /// Local evaluation of the same predicate.
    pub fn matches(&self, task: &Task) -> bool {
        if task.task_type != self.task_type {
            return false;
        }

        let lease_elapsed = task.lease_expires_at.map_or(true, |t| t <= self.now_ms);

        match task.status {
            TaskStatus::Pending => {
                let retry_due = task.retry_after.map_or(true, |t| t <= self.now_ms);
                (!self.mode.respect_retry_after || retry_due)
                    && (!self.mode.lease_aware || lease_elapsed)
            }
            TaskStatus::Claimed => {
                self.mode.lease_aware && task.lease_expires_at.is_some() && lease_elapsed
            }
            _ => false,
        }
    }
}

fn merge(a: &Value, b: &Value) -> Value {
    let mut out = Map::new();
    for part in [a, b] {
        if let Some(fields) = part.as_object() {
            out.extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
    }
    Value::Object(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legacy_filter_matches_wire_contract() {
        let filter = TaskFilter::new(TaskType::TextToImage, FilterMode::legacy(), 0);
        assert_eq!(filter.to_where(), json!({"type": "txt2img", "status": 0}));
    }

    #[test]
    fn test_lease_and_backoff_filter() {
        let mode = FilterMode {
            lease_aware: true,
            respect_retry_after: true,
        };
        let filter = TaskFilter::new(TaskType::SpeechToText, mode, 1000);

        assert_eq!(
            filter.to_where(),
            json!({
                "type": "speech2txt",
                "$or": [
                    {"status": 0, "retryAfter": {"$exists": false}, "leaseExpiresAt": {"$exists": false}},
                    {"status": 0, "retryAfter": {"$exists": false}, "leaseExpiresAt": {"$lte": 1000}},
                    {"status": 0, "retryAfter": {"$lte": 1000}, "leaseExpiresAt": {"$exists": false}},
                    {"status": 0, "retryAfter": {"$lte": 1000}, "leaseExpiresAt": {"$lte": 1000}},
                    {"status": 2, "leaseExpiresAt": {"$lte": 1000}}
                ]
            })
        );
    }

    #[test]
    fn test_lease_only_filter_hides_claims_in_flight() {
        let mode = FilterMode {
            lease_aware: true,
            respect_retry_after: false,
        };
        let w = TaskFilter::new(TaskType::TextToSpeech, mode, 5).to_where();
        assert_eq!(
            w["$or"],
            json!([
                {"status": 0, "leaseExpiresAt": {"$exists": false}},
                {"status": 0, "leaseExpiresAt": {"$lte": 5}},
                {"status": 2, "leaseExpiresAt": {"$lte": 5}}
            ])
        );
    }

    #[test]
    fn test_backoff_only_filter() {
        let mode = FilterMode {
            lease_aware: false,
            respect_retry_after: true,
        };
        let w = TaskFilter::new(TaskType::TextToImage, mode, 7).to_where();
        assert_eq!(
            w["$or"],
            json!([
                {"status": 0, "retryAfter": {"$exists": false}},
                {"status": 0, "retryAfter": {"$lte": 7}}
            ])
        );
    }

    #[test]
    fn test_local_matching() {
        let mode = FilterMode {
            lease_aware: true,
            respect_retry_after: true,
        };
        let filter = TaskFilter::new(TaskType::TextToImage, mode, 1000);

        let pending = Task::new("a", TaskType::TextToImage, None);
        assert!(filter.matches(&pending));

        let mut later = pending.clone();
        later.retry_after = Some(2000);
        assert!(!filter.matches(&later));

        // First claim write landed, status write not yet.
        let mut in_flight = pending.clone();
        in_flight.lease_expires_at = Some(5000);
        assert!(!filter.matches(&in_flight));
        in_flight.lease_expires_at = Some(999);
        assert!(filter.matches(&in_flight));

        let mut claimed = pending.clone();
        claimed.status = TaskStatus::Claimed;
        claimed.lease_expires_at = Some(5000);
        assert!(!filter.matches(&claimed));
        claimed.lease_expires_at = Some(999);
        assert!(filter.matches(&claimed));

        let other_type = Task::new("b", TaskType::ImageToImage, None);
        assert!(!filter.matches(&other_type));

        let mut done = pending;
        done.status = TaskStatus::Completed;
        assert!(!filter.matches(&done));
    }

    #[test]
    fn test_legacy_matching_ignores_leases() {
        let filter = TaskFilter::new(TaskType::TextToImage, FilterMode::legacy(), 1000);
        let mut task = Task::new("a", TaskType::TextToImage, None);
        task.lease_expires_at = Some(5000);
        task.retry_after = Some(5000);
        assert!(filter.matches(&task));
    }
}
