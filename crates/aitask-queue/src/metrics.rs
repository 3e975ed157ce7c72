//! Queue client metrics.

use metrics::{counter, histogram};

/// Metric name constants for consistency.
pub mod names {
    /// Total queue requests by operation and status.
    pub const REQUESTS_TOTAL: &str = "aitask_queue_requests_total";

    /// Total retry attempts by operation.
    pub const RETRIES_TOTAL: &str = "aitask_queue_retries_total";

    /// Request latency in seconds by operation.
    pub const LATENCY_SECONDS: &str = "aitask_queue_latency_seconds";

    /// Claims lost to another worker.
    pub const CLAIMS_LOST_TOTAL: &str = "aitask_queue_claims_lost_total";
}

/// Record metrics for a completed queue request.
pub fn record_request(operation: &str, status: u16, latency_ms: f64) {
    counter!(
        names::REQUESTS_TOTAL,
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    histogram!(
        names::LATENCY_SECONDS,
        "operation" => operation.to_string()
    )
    .record(latency_ms / 1000.0);
}

/// Record a retry attempt.
pub fn record_retry(operation: &str) {
    counter!(
        names::RETRIES_TOTAL,
        "operation" => operation.to_string()
    )
    .increment(1);
}

pub fn record_claim_lost() {
    counter!(names::CLAIMS_LOST_TOTAL).increment(1);
}
