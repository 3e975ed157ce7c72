//! Worker configuration.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use aitask_queue::FilterMode;

use crate::error::{WorkerError, WorkerResult};

/// Whether a task is claimed before its backend is invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimMode {
    /// Atomic claim with a time-bounded lease.
    Lease,
    /// No claim. Concurrent workers may process the same task twice.
    None,
}

impl FromStr for ClaimMode {
    type Err = WorkerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lease" => Ok(ClaimMode::Lease),
            "none" => Ok(ClaimMode::None),
            other => Err(WorkerError::config_error(format!(
                "unknown claim mode '{}', expected lease or none",
                other
            ))),
        }
    }
}

impl fmt::Display for ClaimMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClaimMode::Lease => write!(f, "lease"),
            ClaimMode::None => write!(f, "none"),
        }
    }
}

/// What happens to a task whose invocation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Write nothing; the task is picked up again on a later poll.
    LeavePending,
    /// Count attempts, back off, and dead-letter after `max_attempts`.
    MarkFailed,
}

impl FromStr for FailurePolicy {
    type Err = WorkerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "leave_pending" => Ok(FailurePolicy::LeavePending),
            "mark_failed" => Ok(FailurePolicy::MarkFailed),
            other => Err(WorkerError::config_error(format!(
                "unknown failure policy '{}', expected leave_pending or mark_failed",
                other
            ))),
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailurePolicy::LeavePending => write!(f, "leave_pending"),
            FailurePolicy::MarkFailed => write!(f, "mark_failed"),
        }
    }
}

/// Headroom a lease keeps beyond `task_timeout` for uploads and the status write.
pub const LEASE_MARGIN: Duration = Duration::from_secs(120);

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum tasks fetched per poll
    pub batch_size: usize,
    /// Sleep after an empty poll
    pub idle_interval: Duration,
    /// Directory for staged files
    pub staging_dir: PathBuf,
    /// Upper bound for one backend invocation, uploads included
    pub task_timeout: Duration,
    pub claim_mode: ClaimMode,
    /// How long a claim stays exclusive; at least `task_timeout + LEASE_MARGIN`
    pub claim_lease: Duration,
    pub failure_policy: FailurePolicy,
    /// Attempts before a retryable failure is dead-lettered (mark_failed only)
    pub max_attempts: u32,
    /// Reschedule delay after the first failure, doubled per attempt
    pub retry_base: Duration,
    /// Reschedule delay cap
    pub retry_max: Duration,
    /// Prometheus listener port; no exporter when unset
    pub metrics_port: Option<u16>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            batch_size: 2,
            idle_interval: Duration::from_secs(60),
            staging_dir: PathBuf::from("/tmp/aitask"),
            task_timeout: Duration::from_secs(900), // 15 minutes
            claim_mode: ClaimMode::Lease,
            claim_lease: Duration::from_secs(1200), // 20 minutes
            failure_policy: FailurePolicy::LeavePending,
            max_attempts: 5,
            retry_base: Duration::from_secs(30),
            retry_max: Duration::from_secs(3600),
            metrics_port: None,
        }
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

impl WorkerConfig {
    /// Create config from environment variables.
    ///
    /// Unparseable numbers fall back to defaults; an unknown mode or policy
    /// name, or a lease that cannot outlast a task, is a configuration error.
    pub fn from_env() -> WorkerResult<Self> {
        let defaults = Self::default();

        let claim_mode = match std::env::var("WORKER_CLAIM_MODE") {
            Ok(s) => s.parse()?,
            Err(_) => defaults.claim_mode,
        };
        let failure_policy = match std::env::var("WORKER_FAILURE_POLICY") {
            Ok(s) => s.parse()?,
            Err(_) => defaults.failure_policy,
        };

        let config = Self {
            batch_size: env_parse::<usize>("TASK_BATCH_SIZE")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.batch_size),
            idle_interval: env_parse("WORKER_IDLE_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.idle_interval),
            staging_dir: std::env::var("WORKER_STAGING_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.staging_dir),
            task_timeout: env_parse("WORKER_TASK_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.task_timeout),
            claim_mode,
            claim_lease: env_parse("WORKER_CLAIM_LEASE_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.claim_lease),
            failure_policy,
            max_attempts: env_parse::<u32>("WORKER_MAX_ATTEMPTS")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_attempts),
            retry_base: env_parse("WORKER_RETRY_BASE_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.retry_base),
            retry_max: env_parse("WORKER_RETRY_MAX_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.retry_max),
            metrics_port: env_parse("METRICS_PORT"),
        };
        config.validate()?;
        Ok(config)
    }

    /// Check settings that only make sense together.
    pub fn validate(&self) -> WorkerResult<()> {
        if self.claim_mode == ClaimMode::Lease && self.claim_lease < self.task_timeout + LEASE_MARGIN {
            return Err(WorkerError::config_error(format!(
                "claim lease {}s must be at least task timeout {}s plus {}s",
                self.claim_lease.as_secs(),
                self.task_timeout.as_secs(),
                LEASE_MARGIN.as_secs()
            )));
        }
        Ok(())
    }

    /// Fetch filter matching this claim mode and failure policy.
    pub fn filter_mode(&self) -> FilterMode {
        FilterMode {
            lease_aware: self.claim_mode == ClaimMode::Lease,
            respect_retry_after: self.failure_policy == FailurePolicy::MarkFailed,
        }
    }
}
