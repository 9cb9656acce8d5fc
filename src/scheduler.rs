//! Scheduler control loop.
//!
//! One thread drives a cooperative polling loop: drain the queue
//! (priority-listed task names first, arrival order preserved within
//! each class), submit to the worker pool, reconcile completions, and
//! re-enqueue follow-on tasks resolved through the registry. Transient
//! result-fetch failures are retried on later iterations with a bounded
//! budget; exhausted handles are dead-lettered. Only worker-pool
//! connectivity failures are fatal.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::pool::{FetchError, JobHandle, PoolError, WorkerPool};
use crate::queue::{QueueProducer, TaskQueue};
use crate::registry::Registry;
use crate::results::ResultLog;
use crate::task::Task;
use crate::task::descriptor::{DescriptorError, TaskDescriptor};

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("worker pool unavailable: {0}")]
    PoolUnavailable(#[from] PoolError),
    #[error("cannot encode task for submission: {0}")]
    Descriptor(#[from] DescriptorError),
}

pub struct Scheduler {
    queue: TaskQueue,
    pool: Box<dyn WorkerPool>,
    registry: Arc<Registry>,
    config: Arc<Config>,
    results: ResultLog,
    stop: Arc<AtomicBool>,
    in_flight: Vec<JobHandle>,
    retries: HashMap<JobHandle, u32>,
    dead_letters: Vec<JobHandle>,
}

impl Scheduler {
    pub fn new(pool: Box<dyn WorkerPool>, registry: Arc<Registry>, config: Arc<Config>) -> Self {
        Self {
            queue: TaskQueue::new(),
            pool,
            registry,
            config,
            results: ResultLog::new(),
            stop: Arc::new(AtomicBool::new(false)),
            in_flight: Vec::new(),
            retries: HashMap::new(),
            dead_letters: Vec::new(),
        }
    }

    pub fn enqueue(&self, task: Task) {
        debug!("enqueueing task {} ({})", task.name(), task.path().display());
        self.queue.push(task);
    }

    /// Producer handle for enqueueing seeds from other threads.
    pub fn producer(&self) -> QueueProducer {
        self.queue.producer()
    }

    /// Shared stop flag. Setting it makes the loop abort further
    /// submission, wait for the pool to drain, and return.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    pub fn results(&self) -> &ResultLog {
        &self.results
    }

    pub fn into_results(self) -> ResultLog {
        self.results
    }

    /// Handles whose results could not be fetched within the retry
    /// budget.
    pub fn dead_letters(&self) -> &[JobHandle] {
        &self.dead_letters
    }

    /// Run the control loop until the queue is empty and no work is in
    /// flight, or until stop is requested.
    pub fn run(&mut self) -> Result<(), SchedulerError> {
        let wait = Duration::from_millis(self.config.poll_interval_ms);
        info!("starting scheduler loop (poll interval {}ms)", self.config.poll_interval_ms);

        loop {
            if self.stop.load(Ordering::Relaxed) {
                info!("stop requested; aborting queued pool work");
                self.pool.abort();
                break;
            }

            let (completed, pending) = self.pool.poll(&self.in_flight, wait);
            self.in_flight = pending;

            self.submit_drained()?;

            let mut to_fetch: Vec<JobHandle> = self.retries.keys().copied().collect();
            to_fetch.sort_unstable();
            to_fetch.extend(completed);
            for handle in to_fetch {
                self.fetch_and_reconcile(handle);
            }

            if self.idle() {
                break;
            }
        }

        self.pool.drain()?;
        info!(
            "scheduler loop finished: {} results, {} dead-lettered",
            self.results.len(),
            self.dead_letters.len()
        );
        Ok(())
    }

    fn idle(&self) -> bool {
        self.queue.is_empty() && self.in_flight.is_empty() && self.retries.is_empty()
    }

    /// Drain the queue non-blockingly and submit, priority-listed task
    /// names first. Arrival order is preserved within each class so a
    /// burst of ordinary tasks cannot starve priority work, and FIFO
    /// fairness holds inside each class.
    fn submit_drained(&mut self) -> Result<(), SchedulerError> {
        let drained = self.queue.drain();
        if drained.is_empty() {
            return Ok(());
        }

        let priority_names = &self.config.priority;
        let (mut batch, remaining): (Vec<Task>, Vec<Task>) = drained
            .into_iter()
            .partition(|task| priority_names.iter().any(|name| name == task.name()));
        batch.extend(remaining);

        for task in batch {
            debug!(
                "submitting task {} ({} @ {})",
                task.name(),
                task.path().display(),
                task.offset()
            );
            let descriptor = task.to_descriptor()?;
            let handle = self.pool.submit(descriptor)?;
            self.in_flight.push(handle);
        }
        Ok(())
    }

    fn fetch_and_reconcile(&mut self, handle: JobHandle) {
        match self.pool.fetch(handle) {
            Ok(descriptor) => {
                self.retries.remove(&handle);
                self.reconcile(descriptor);
            }
            Err(FetchError::Transient(reason)) => {
                let attempts = self.retries.entry(handle).or_insert(0);
                *attempts += 1;
                if *attempts > self.config.max_fetch_retries {
                    error!(
                        "job {handle} dead-lettered after {} failed result fetches: {reason}",
                        self.config.max_fetch_retries
                    );
                    self.retries.remove(&handle);
                    self.dead_letters.push(handle);
                } else {
                    debug!("job {handle} result not ready ({reason}); will retry");
                }
            }
        }
    }

    /// Merge one finished descriptor: re-enqueue its follow-ons and
    /// append it to the result log. Unresolvable follow-ons become
    /// warnings on the parent, never scheduler faults.
    fn reconcile(&mut self, mut descriptor: TaskDescriptor) {
        for raw in descriptor.next_tasks.clone() {
            match self.materialize(&raw) {
                Ok(task) => self.queue.push(task),
                Err(err) => {
                    warn!("dropping unresolvable follow-on task: {err}");
                    descriptor.warnings.push(format!("follow-on dropped: {err}"));
                }
            }
        }
        info!(
            "task {} finished ({} warnings, {} follow-ons)",
            descriptor.name.first().map(String::as_str).unwrap_or("?"),
            descriptor.warnings.len(),
            descriptor.next_tasks.len()
        );
        self.results.append(descriptor);
    }

    fn materialize(&self, raw: &str) -> Result<Task, DescriptorError> {
        let descriptor = TaskDescriptor::from_json(raw)?;
        Task::from_descriptor(descriptor, &self.registry)
    }
}
