//! In-process task queue.
//!
//! Same fetch, claim and write-back semantics as the Parse client, including
//! the two separate writes a claim takes. Clones share one store, so several
//! workers can race on the same tasks.

use std::sync::Arc;
use std::time::Duration;

use aitask_models::{Task, TaskId, TaskStatus, TaskType};
use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::{QueueError, QueueResult};
use crate::filter::{FilterMode, TaskFilter};
use crate::metrics::record_claim_lost;
use crate::queue::{ClaimOutcome, FailureUpdate, TaskQueue};

/// One `report_result` call as received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultReport {
    pub task_id: TaskId,
    pub status: TaskStatus,
    pub results: Vec<String>,
    pub executor: String,
}

#[derive(Debug, Default)]
struct State {
    tasks: Vec<Task>,
    result_reports: Vec<ResultReport>,
    failure_reports: Vec<(TaskId, FailureUpdate)>,
    fetch_count: usize,
    fail_fetch: bool,
    failing_reports: u32,
}

impl State {
    fn find_mut(&mut self, id: &TaskId) -> QueueResult<&mut Task> {
        self.tasks
            .iter_mut()
            .find(|t| &t.id == id)
            .ok_or_else(|| QueueError::NotFound(format!("task {}", id)))
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Task queue held in memory.
#[derive(Debug, Clone)]
pub struct InMemoryQueue {
    state: Arc<Mutex<State>>,
    executor: String,
    filter_mode: FilterMode,
    claim_gap: Duration,
}

impl Default for InMemoryQueue {
    fn default() -> Self {
        Self::new("memory")
    }
}

impl InMemoryQueue {
    pub fn new(executor: impl Into<String>) -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            executor: executor.into(),
            filter_mode: FilterMode::legacy(),
            claim_gap: Duration::ZERO,
        }
    }

    /// Another handle on the same store, writing as `executor`.
    pub fn for_executor(&self, executor: impl Into<String>) -> Self {
        Self {
            state: Arc::clone(&self.state),
            executor: executor.into(),
            filter_mode: self.filter_mode,
            claim_gap: self.claim_gap,
        }
    }

    pub fn with_filter_mode(mut self, mode: FilterMode) -> Self {
        self.filter_mode = mode;
        self
    }

    /// Delay between the two writes of a claim, like a slow second round trip.
    pub fn with_claim_gap(mut self, gap: Duration) -> Self {
        self.claim_gap = gap;
        self
    }

    pub async fn insert(&self, task: Task) {
        let mut state = self.state.lock().await;
        state.tasks.retain(|t| t.id != task.id);
        state.tasks.push(task);
    }

    pub async fn get(&self, id: &str) -> Option<Task> {
        let state = self.state.lock().await;
        state.tasks.iter().find(|t| t.id.as_str() == id).cloned()
    }

    /// Force a lease into the past.
    pub async fn expire_lease(&self, id: &str) {
        let mut state = self.state.lock().await;
        if let Some(task) = state.tasks.iter_mut().find(|t| t.id.as_str() == id) {
            task.lease_expires_at = Some(0);
        }
    }

    pub async fn result_reports(&self) -> Vec<ResultReport> {
        self.state.lock().await.result_reports.clone()
    }

    pub async fn failure_reports(&self) -> Vec<(TaskId, FailureUpdate)> {
        self.state.lock().await.failure_reports.clone()
    }

    pub async fn fetch_count(&self) -> usize {
        self.state.lock().await.fetch_count
    }

    /// Make every fetch fail with a 500 until turned off.
    pub async fn set_fail_fetch(&self, fail: bool) {
        self.state.lock().await.fail_fetch = fail;
    }

    /// Make the next `n` status writes fail with a 503.
    pub async fn fail_next_reports(&self, n: u32) {
        self.state.lock().await.failing_reports = n;
    }

    fn take_report_failure(state: &mut State) -> QueueResult<()> {
        if state.failing_reports > 0 {
            state.failing_reports -= 1;
            return Err(QueueError::from_http_status(503, "injected report failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl TaskQueue for InMemoryQueue {
    async fn fetch_pending(&self, task_type: TaskType, limit: usize) -> QueueResult<Vec<Task>> {
        let mut state = self.state.lock().await;
        state.fetch_count += 1;

        if state.fail_fetch {
            return Err(QueueError::from_http_status(500, "injected fetch failure"));
        }

        let filter = TaskFilter::new(task_type, self.filter_mode, now_ms());
        Ok(state
            .tasks
            .iter()
            .filter(|t| filter.matches(t))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn claim(&self, task: &Task, lease: Duration) -> QueueResult<ClaimOutcome> {
        // First write: increment and lease, status untouched.
        {
            let mut state = self.state.lock().await;
            let stored = match state.find_mut(&task.id) {
                Ok(stored) => stored,
                Err(_) => return Ok(ClaimOutcome::Lost),
            };

            stored.claim_seq += 1;
            stored.lease_expires_at = Some(now_ms() + lease.as_millis() as i64);
            if stored.claim_seq != task.claim_seq + 1 {
                record_claim_lost();
                return Ok(ClaimOutcome::Lost);
            }
        }

        if !self.claim_gap.is_zero() {
            tokio::time::sleep(self.claim_gap).await;
        }

        // Second write, winner only.
        let mut state = self.state.lock().await;
        let stored = state.find_mut(&task.id)?;
        stored.status = TaskStatus::Claimed;
        stored.executor = Some(self.executor.clone());
        Ok(ClaimOutcome::Won)
    }

    async fn holds_claim(&self, task: &Task) -> QueueResult<bool> {
        let state = self.state.lock().await;
        Ok(state.tasks.iter().find(|t| t.id == task.id).is_some_and(|current| {
            current.status == TaskStatus::Claimed && current.claim_seq == task.claim_seq + 1
        }))
    }

    async fn release(&self, task: &Task) -> QueueResult<()> {
        let mut state = self.state.lock().await;
        let stored = state.find_mut(&task.id)?;
        stored.status = TaskStatus::Pending;
        stored.lease_expires_at = None;
        Ok(())
    }

    async fn report_result(&self, task: &Task, status: TaskStatus, results: &[String]) -> QueueResult<()> {
        let mut state = self.state.lock().await;
        Self::take_report_failure(&mut state)?;

        let stored = state.find_mut(&task.id)?;
        stored.status = status;
        stored.result = results.to_vec();
        stored.executor = Some(self.executor.clone());

        state.result_reports.push(ResultReport {
            task_id: task.id.clone(),
            status,
            results: results.to_vec(),
            executor: self.executor.clone(),
        });
        Ok(())
    }

    async fn report_failure(&self, task: &Task, update: &FailureUpdate) -> QueueResult<()> {
        let mut state = self.state.lock().await;
        Self::take_report_failure(&mut state)?;

        let executor = self.executor.clone();
        let stored = state.find_mut(&task.id)?;
        stored.status = update.status();
        stored.executor = Some(executor);
        match update {
            FailureUpdate::Reschedule {
                attempts,
                retry_after_ms,
                error,
            } => {
                stored.attempts = *attempts;
                stored.retry_after = Some(*retry_after_ms);
                stored.last_error = Some(error.clone());
                stored.lease_expires_at = None;
            }
            FailureUpdate::DeadLetter { attempts, error } => {
                stored.attempts = *attempts;
                stored.last_error = Some(error.clone());
            }
        }

        state.failure_reports.push((task.id.clone(), update.clone()));
        Ok(())
    }
}
