//! Worker metrics and the optional Prometheus exporter.

use std::net::{Ipv4Addr, SocketAddr};

use aitask_models::TaskType;
use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::error::{TaskErrorKind, WorkerError, WorkerResult};

/// Metric names as constants for consistency.
pub mod names {
    pub const TASKS_FETCHED_TOTAL: &str = "aitask_tasks_fetched_total";
    pub const TASKS_COMPLETED_TOTAL: &str = "aitask_tasks_completed_total";
    pub const TASKS_FAILED_TOTAL: &str = "aitask_tasks_failed_total";
    pub const TASKS_SKIPPED_TOTAL: &str = "aitask_tasks_skipped_total";
    pub const CLAIMS_LOST_TOTAL: &str = "aitask_claims_lost_total";
    pub const FETCH_ERRORS_TOTAL: &str = "aitask_fetch_errors_total";
    pub const INVOCATION_DURATION_SECONDS: &str = "aitask_invocation_duration_seconds";
}

/// Serve `/metrics` on `0.0.0.0:<port>`.
pub fn install_prometheus(port: u16) -> WorkerResult<()> {
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| WorkerError::config_error(format!("metrics exporter on {}: {}", addr, e)))
}

pub fn record_fetched(task_type: TaskType, count: usize) {
    counter!(names::TASKS_FETCHED_TOTAL, "task_type" => task_type.as_str()).increment(count as u64);
}

pub fn record_fetch_error(task_type: TaskType) {
    counter!(names::FETCH_ERRORS_TOTAL, "task_type" => task_type.as_str()).increment(1);
}

pub fn record_completed(task_type: TaskType, duration_secs: f64) {
    counter!(names::TASKS_COMPLETED_TOTAL, "task_type" => task_type.as_str()).increment(1);
    histogram!(names::INVOCATION_DURATION_SECONDS, "task_type" => task_type.as_str())
        .record(duration_secs);
}

pub fn record_failed(task_type: TaskType, kind: TaskErrorKind) {
    counter!(
        names::TASKS_FAILED_TOTAL,
        "task_type" => task_type.as_str(),
        "kind" => kind.as_str()
    )
    .increment(1);
}

pub fn record_skipped(task_type: TaskType) {
    counter!(names::TASKS_SKIPPED_TOTAL, "task_type" => task_type.as_str()).increment(1);
}

pub fn record_claim_lost(task_type: TaskType) {
    counter!(names::CLAIMS_LOST_TOTAL, "task_type" => task_type.as_str()).increment(1);
}
