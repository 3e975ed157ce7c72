//! Task queue client.
//!
//! This crate provides:
//! - Parse REST client for the task collection (fetch, claim, report)
//! - Query filter construction for pending and lease-expired tasks
//! - Claim protocol based on the server's atomic increment
//! - Retry with exponential backoff for transient failures
//! - In-memory queue with the same semantics, for tests and dry runs

pub mod client;
pub mod error;
pub mod filter;
pub mod memory;
pub mod metrics;
pub mod queue;
pub mod retry;

pub use client::{ParseQueueClient, QueueConfig};
pub use error::{QueueError, QueueResult};
pub use filter::{FilterMode, TaskFilter};
pub use memory::{InMemoryQueue, ResultReport};
pub use queue::{ClaimOutcome, FailureUpdate, TaskQueue};
pub use retry::RetryConfig;
