//! In-process worker pool running task bodies on spawned threads.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use tracing::debug;

use crate::task::descriptor::TaskDescriptor;
use crate::task::{RunEnv, Task};

use super::{FetchError, JobHandle, PoolError, WorkerPool};

const DRAIN_POLL: Duration = Duration::from_millis(50);

struct Job {
    handle: JobHandle,
    descriptor: TaskDescriptor,
}

struct PoolShared {
    results: Mutex<HashMap<JobHandle, TaskDescriptor>>,
    outstanding: Mutex<HashSet<JobHandle>>,
    aborted: AtomicBool,
}

pub struct ThreadPool {
    job_tx: Option<Sender<Job>>,
    done_rx: Receiver<JobHandle>,
    shared: Arc<PoolShared>,
    next_handle: AtomicU64,
    completed: Mutex<HashSet<JobHandle>>,
    workers: Vec<thread::JoinHandle<()>>,
}

impl ThreadPool {
    pub fn new(workers: usize, env: Arc<RunEnv>) -> Self {
        let worker_count = workers.max(1);
        let (job_tx, job_rx) = unbounded::<Job>();
        let (done_tx, done_rx) = unbounded::<JobHandle>();
        let shared = Arc::new(PoolShared {
            results: Mutex::new(HashMap::new()),
            outstanding: Mutex::new(HashSet::new()),
            aborted: AtomicBool::new(false),
        });

        let mut handles = Vec::new();
        for _ in 0..worker_count {
            let job_rx = job_rx.clone();
            let done_tx = done_tx.clone();
            let shared = Arc::clone(&shared);
            let env = Arc::clone(&env);

            handles.push(thread::spawn(move || {
                for job in job_rx {
                    if shared.aborted.load(Ordering::Relaxed) {
                        shared.outstanding.lock().unwrap().remove(&job.handle);
                        continue;
                    }
                    let done = run_job(job.descriptor, &env);
                    shared.results.lock().unwrap().insert(job.handle, done);
                    shared.outstanding.lock().unwrap().remove(&job.handle);
                    if done_tx.send(job.handle).is_err() {
                        break;
                    }
                }
            }));
        }

        Self {
            job_tx: Some(job_tx),
            done_rx,
            shared,
            next_handle: AtomicU64::new(1),
            completed: Mutex::new(HashSet::new()),
            workers: handles,
        }
    }
}

/// Materialize and run one task; always yields a completed descriptor.
fn run_job(descriptor: TaskDescriptor, env: &RunEnv) -> TaskDescriptor {
    let mut task = match Task::from_descriptor(descriptor.clone(), &env.registry) {
        Ok(task) => task,
        Err(err) => {
            let mut failed = descriptor;
            failed.completed = true;
            failed
                .warnings
                .push(format!("worker could not materialize task: {err}"));
            return failed;
        }
    };
    if let Err(err) = task.start(env) {
        // Descriptor arrived already completed; echo it back.
        debug!("task {} not runnable: {err}", task.name());
    }
    match task.to_descriptor() {
        Ok(done) => done,
        Err(err) => {
            let mut failed = descriptor;
            failed.completed = true;
            failed
                .warnings
                .push(format!("worker could not project task result: {err}"));
            failed
        }
    }
}

impl WorkerPool for ThreadPool {
    fn submit(&self, descriptor: TaskDescriptor) -> Result<JobHandle, PoolError> {
        let tx = self
            .job_tx
            .as_ref()
            .ok_or_else(|| PoolError::Unavailable("pool is shut down".to_string()))?;
        let handle = self.next_handle.fetch_add(1, Ordering::Relaxed);
        self.shared.outstanding.lock().unwrap().insert(handle);
        if tx.send(Job { handle, descriptor }).is_err() {
            self.shared.outstanding.lock().unwrap().remove(&handle);
            return Err(PoolError::Unavailable("job channel closed".to_string()));
        }
        Ok(handle)
    }

    fn poll(&self, in_flight: &[JobHandle], wait: Duration) -> (Vec<JobHandle>, Vec<JobHandle>) {
        let mut seen = self.completed.lock().unwrap();
        if let Ok(handle) = self.done_rx.recv_timeout(wait) {
            seen.insert(handle);
            while let Ok(handle) = self.done_rx.try_recv() {
                seen.insert(handle);
            }
        }

        let mut completed = Vec::new();
        let mut pending = Vec::new();
        for &handle in in_flight {
            if seen.remove(&handle) {
                completed.push(handle);
            } else {
                pending.push(handle);
            }
        }
        (completed, pending)
    }

    fn outstanding(&self) -> Vec<JobHandle> {
        let mut handles: Vec<JobHandle> = self
            .shared
            .outstanding
            .lock()
            .unwrap()
            .iter()
            .copied()
            .collect();
        handles.sort_unstable();
        handles
    }

    fn fetch(&self, handle: JobHandle) -> Result<TaskDescriptor, FetchError> {
        self.shared
            .results
            .lock()
            .unwrap()
            .remove(&handle)
            .ok_or_else(|| FetchError::Transient(format!("result for job {handle} not committed yet")))
    }

    fn drain(&self) -> Result<(), PoolError> {
        loop {
            if self.shared.outstanding.lock().unwrap().is_empty() {
                return Ok(());
            }
            match self.done_rx.recv_timeout(DRAIN_POLL) {
                Ok(handle) => {
                    self.completed.lock().unwrap().insert(handle);
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    if self.shared.outstanding.lock().unwrap().is_empty() {
                        return Ok(());
                    }
                    return Err(PoolError::Unavailable(
                        "workers exited with jobs outstanding".to_string(),
                    ));
                }
            }
        }
    }

    fn abort(&self) {
        self.shared.aborted.store(true, Ordering::Relaxed);
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.job_tx.take();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}
