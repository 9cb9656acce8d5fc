//! Abstract worker pool.
//!
//! The scheduler treats the execution substrate as an opaque
//! submit/poll capability; task bodies never run on the control thread.
//! Descriptors are the only currency across the boundary.

pub mod threads;

use std::time::Duration;

use thiserror::Error;

use crate::task::descriptor::TaskDescriptor;

pub use threads::ThreadPool;

/// Opaque identifier for a submitted job.
pub type JobHandle = u64;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("worker pool unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("transient result fetch failure: {0}")]
    Transient(String),
}

pub trait WorkerPool: Send {
    /// Hand a task descriptor to the pool for execution.
    fn submit(&self, descriptor: TaskDescriptor) -> Result<JobHandle, PoolError>;

    /// Wait at most `wait` for completions, then partition `in_flight`
    /// into (completed, still pending).
    fn poll(&self, in_flight: &[JobHandle], wait: Duration) -> (Vec<JobHandle>, Vec<JobHandle>);

    /// Handles submitted but not yet finished.
    fn outstanding(&self) -> Vec<JobHandle>;

    /// Retrieve the completed descriptor for a handle. Transient failures
    /// are retried by the scheduler on a later iteration.
    fn fetch(&self, handle: JobHandle) -> Result<TaskDescriptor, FetchError>;

    /// Block until no work remains in flight.
    fn drain(&self) -> Result<(), PoolError>;

    /// Cooperatively cancel: queued-but-unstarted work is discarded,
    /// running work finishes.
    fn abort(&self);
}
