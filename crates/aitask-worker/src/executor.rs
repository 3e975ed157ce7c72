//! Fulfillment loop.
//!
//! Fetch a batch, process it in order, fetch again. An empty batch (or a
//! failed fetch) means exactly one idle sleep before the next fetch.

use std::sync::Arc;
use std::time::Duration;

use aitask_models::TaskType;
use aitask_queue::TaskQueue;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::dispatcher::{DispatchOutcome, TaskDispatcher};
use crate::metrics;
use crate::retry::FailureTracker;

/// Result of one fetch/process cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Nothing to do; the caller should sleep.
    Idle,
    /// Tasks were fetched; outcomes in processing order.
    Drained(Vec<DispatchOutcome>),
}

pub struct FulfillmentLoop {
    queue: Arc<dyn TaskQueue>,
    dispatcher: TaskDispatcher,
    task_type: TaskType,
    batch_size: usize,
    idle_interval: Duration,
    shutdown: watch::Receiver<bool>,
    fetch_failures: FailureTracker,
}

impl FulfillmentLoop {
    pub fn new(
        queue: Arc<dyn TaskQueue>,
        dispatcher: TaskDispatcher,
        task_type: TaskType,
        batch_size: usize,
        idle_interval: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            queue,
            dispatcher,
            task_type,
            batch_size,
            idle_interval,
            shutdown,
            fetch_failures: FailureTracker::new(3),
        }
    }

    fn shutdown_requested(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Run until shutdown is signalled. An in-flight task always finishes.
    pub async fn run(&mut self) {
        info!(
            task_type = %self.task_type,
            batch_size = self.batch_size,
            idle_secs = self.idle_interval.as_secs(),
            "Starting fulfillment loop"
        );

        while !self.shutdown_requested() {
            match self.run_cycle().await {
                CycleOutcome::Drained(outcomes) => {
                    debug!("Processed {} tasks, fetching again", outcomes.len());
                }
                CycleOutcome::Idle => {
                    if self.idle().await {
                        break;
                    }
                }
            }
        }

        info!(task_type = %self.task_type, "Fulfillment loop stopped");
    }

    /// One fetch followed by sequential processing of the batch.
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        let tasks = match self.queue.fetch_pending(self.task_type, self.batch_size).await {
            Ok(tasks) => {
                self.fetch_failures.record_success();
                tasks
            }
            Err(e) => {
                metrics::record_fetch_error(self.task_type);
                if self.fetch_failures.record_failure() {
                    warn!(task_type = %self.task_type, "Failed to fetch tasks: {}", e);
                }
                return CycleOutcome::Idle;
            }
        };

        if tasks.is_empty() {
            debug!(task_type = %self.task_type, "No pending tasks");
            return CycleOutcome::Idle;
        }

        metrics::record_fetched(self.task_type, tasks.len());

        let mut outcomes = Vec::with_capacity(tasks.len());
        for task in &tasks {
            if self.shutdown_requested() {
                info!("Shutdown requested, leaving {} tasks for later", tasks.len() - outcomes.len());
                break;
            }
            outcomes.push(self.dispatcher.process(task).await);
        }

        CycleOutcome::Drained(outcomes)
    }

    /// Sleep one idle interval. Returns `true` if shutdown was requested.
    async fn idle(&mut self) -> bool {
        if self.shutdown_requested() {
            return true;
        }

        debug!("Idle for {:?}", self.idle_interval);
        let sleep = tokio::time::sleep(self.idle_interval);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = &mut sleep => return false,
                changed = self.shutdown.changed() => {
                    if changed.is_err() {
                        // Sender gone: no signal can arrive any more.
                        (&mut sleep).await;
                        return false;
                    }
                    if self.shutdown_requested() {
                        return true;
                    }
                }
            }
        }
    }
}
