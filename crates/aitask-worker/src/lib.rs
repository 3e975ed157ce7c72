//! AITask fulfillment worker.
//!
//! Polls the task queue for one task type, runs each task against its
//! backend, stores the artifacts and reports the result.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod invokers;
pub mod logging;
pub mod metrics;
pub mod retry;

#[cfg(test)]
mod test_support;

pub use config::{ClaimMode, FailurePolicy, WorkerConfig};
pub use dispatcher::{DispatchOutcome, TaskDispatcher};
pub use error::{TaskError, TaskErrorKind, TaskResult, WorkerError, WorkerResult};
pub use executor::{CycleOutcome, FulfillmentLoop};
pub use invokers::{invoker_for, Invoker, InvokerContext};
pub use logging::TaskLogger;
