//! Task dispatcher.
//!
//! Runs one task through claim, invocation and status write-back. Every
//! failure is classified and absorbed here, so the loop only sees outcomes.

use std::sync::Arc;
use std::time::{Duration, Instant};

use aitask_models::{Task, TaskStatus, TaskType};
use aitask_queue::{ClaimOutcome, FailureUpdate, TaskQueue};
use tracing::Instrument;

use crate::config::{ClaimMode, FailurePolicy, WorkerConfig};
use crate::error::{TaskError, TaskErrorKind};
use crate::invokers::Invoker;
use crate::logging::TaskLogger;
use crate::metrics;
use crate::retry::Backoff;

/// What `process` did with a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Artifacts stored and the task reported completed.
    Completed(Vec<String>),
    /// No payload; left untouched.
    Skipped,
    /// Another worker owns the task.
    ClaimLost,
    /// Invocation or write-back failed; handled per the failure policy.
    Failed(TaskErrorKind),
}

pub struct TaskDispatcher {
    queue: Arc<dyn TaskQueue>,
    invoker: Arc<dyn Invoker>,
    task_type: TaskType,
    account: String,
    claim_mode: ClaimMode,
    claim_lease: Duration,
    task_timeout: Duration,
    failure_policy: FailurePolicy,
    max_attempts: u32,
    backoff: Backoff,
}

impl TaskDispatcher {
    pub fn new(
        config: &WorkerConfig,
        task_type: TaskType,
        account: impl Into<String>,
        queue: Arc<dyn TaskQueue>,
        invoker: Arc<dyn Invoker>,
    ) -> Self {
        Self {
            queue,
            invoker,
            task_type,
            account: account.into(),
            claim_mode: config.claim_mode,
            claim_lease: config.claim_lease,
            task_timeout: config.task_timeout,
            failure_policy: config.failure_policy,
            max_attempts: config.max_attempts,
            backoff: Backoff::new(config.retry_base, config.retry_max),
        }
    }

    /// Process one task. Never fails; the outcome says what happened.
    pub async fn process(&self, task: &Task) -> DispatchOutcome {
        let logger = TaskLogger::new(&task.id, self.task_type, &self.account);
        let span = logger.create_span();
        self.process_inner(task, &logger).instrument(span).await
    }

    async fn process_inner(&self, task: &Task, logger: &TaskLogger) -> DispatchOutcome {
        if task.data.is_none() {
            logger.log_warning("task has no data, skipping");
            metrics::record_skipped(self.task_type);
            return DispatchOutcome::Skipped;
        }

        if task.data.as_ref().is_some_and(|d| d.is_null()) {
            let error = TaskError::validation("task data is null");
            return self.handle_failure(task, error, false, logger).await;
        }

        if let Err(e) = self.invoker.validate(task) {
            return self.handle_failure(task, e, false, logger).await;
        }

        let claimed = match self.claim_mode {
            ClaimMode::None => false,
            ClaimMode::Lease => match self.queue.claim(task, self.claim_lease).await {
                Ok(ClaimOutcome::Won) => true,
                Ok(ClaimOutcome::Lost) => {
                    logger.log_progress("claimed by another worker");
                    metrics::record_claim_lost(self.task_type);
                    return DispatchOutcome::ClaimLost;
                }
                Err(e) => {
                    logger.log_error(&format!("claim failed: {}", e));
                    metrics::record_failed(self.task_type, TaskErrorKind::Transport);
                    return DispatchOutcome::Failed(TaskErrorKind::Transport);
                }
            },
        };

        logger.log_start(&format!("invoking {} backend", self.task_type));
        let started = Instant::now();

        let result = match tokio::time::timeout(self.task_timeout, self.invoker.invoke(task)).await {
            Ok(result) => result,
            Err(_) => {
                self.invoker.cleanup(task).await;
                Err(TaskError::Timeout(self.task_timeout))
            }
        };

        let urls = match result {
            Ok(urls) => urls,
            Err(e) => return self.handle_failure(task, e, claimed, logger).await,
        };

        // Artifacts are stored; only now may the task be reported.
        if let Err(e) = self
            .queue
            .report_result(task, TaskStatus::Completed, &urls)
            .await
        {
            logger.log_error(&format!(
                "{} artifacts stored but status update failed: {}",
                urls.len(),
                e
            ));
            metrics::record_failed(self.task_type, TaskErrorKind::Transport);
            return DispatchOutcome::Failed(TaskErrorKind::Transport);
        }

        let elapsed = started.elapsed();
        metrics::record_completed(self.task_type, elapsed.as_secs_f64());
        logger.log_completion(&format!("{} artifacts in {:.1}s", urls.len(), elapsed.as_secs_f64()));
        DispatchOutcome::Completed(urls)
    }

    async fn handle_failure(
        &self,
        task: &Task,
        error: TaskError,
        claimed: bool,
        logger: &TaskLogger,
    ) -> DispatchOutcome {
        let kind = error.kind();
        metrics::record_failed(self.task_type, kind);
        logger.log_error(&format!("{} failure: {}", kind.as_str(), error));

        // A lease that lapsed mid-run may belong to another worker by now.
        if claimed && !self.still_owned(task, logger).await {
            return DispatchOutcome::Failed(kind);
        }

        match self.failure_policy {
            FailurePolicy::LeavePending => {
                if claimed {
                    if let Err(e) = self.queue.release(task).await {
                        logger.log_warning(&format!("release failed, lease will expire: {}", e));
                    }
                }
            }
            FailurePolicy::MarkFailed => {
                let update = self.failure_update(task, &error);
                if let Err(e) = self.queue.report_failure(task, &update).await {
                    logger.log_warning(&format!("failure update not written: {}", e));
                }
            }
        }

        DispatchOutcome::Failed(kind)
    }

    async fn still_owned(&self, task: &Task, logger: &TaskLogger) -> bool {
        match self.queue.holds_claim(task).await {
            Ok(true) => true,
            Ok(false) => {
                logger.log_warning("claim no longer ours, leaving task to its current owner");
                false
            }
            Err(e) => {
                logger.log_warning(&format!("could not confirm claim, leaving task as is: {}", e));
                false
            }
        }
    }

    fn failure_update(&self, task: &Task, error: &TaskError) -> FailureUpdate {
        let attempts = task.attempts.saturating_add(1);

        if !error.is_retryable() || attempts >= self.max_attempts {
            return FailureUpdate::DeadLetter {
                attempts,
                error: error.to_string(),
            };
        }

        let delay = self.backoff.delay_for_attempt(attempts);
        FailureUpdate::Reschedule {
            attempts,
            retry_after_ms: chrono::Utc::now().timestamp_millis() + delay.as_millis() as i64,
            error: error.to_string(),
        }
    }
}
