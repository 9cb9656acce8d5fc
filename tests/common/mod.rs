//! Shared test infrastructure: byte-level image builders and scripted
//! worker pools for exercising the scheduler without threads.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use siftwork::TaskDescriptor;
use siftwork::classify::MagicClassifier;
use siftwork::config::Config;
use siftwork::pool::{FetchError, JobHandle, PoolError, WorkerPool};
use siftwork::registry::Registry;
use siftwork::task::{RunEnv, SystemClock, Task};

// ============================================================================
// Image builders
// ============================================================================

/// Pack a CHS triple into its 3-byte on-disk form.
pub fn chs_bytes(cylinder: u16, head: u8, sector: u8) -> [u8; 3] {
    [
        head,
        (sector & 0x3F) | (((cylinder >> 2) as u8) & 0xC0),
        (cylinder & 0xFF) as u8,
    ]
}

#[derive(Debug, Clone, Copy)]
pub struct PartitionSpec {
    pub status: u8,
    pub chs_first: [u8; 3],
    pub partition_type: u8,
    pub chs_last: [u8; 3],
    pub lba_start: u32,
    pub sector_count: u32,
}

impl PartitionSpec {
    pub fn empty() -> Self {
        Self {
            status: 0,
            chs_first: [0; 3],
            partition_type: 0,
            chs_last: [0; 3],
            lba_start: 0,
            sector_count: 0,
        }
    }
}

/// Build a 512-byte MBR sector with the given partition entries and a
/// valid boot signature.
pub fn mbr_sector(partitions: &[PartitionSpec]) -> [u8; 512] {
    assert!(partitions.len() <= 4);
    let mut sector = [0u8; 512];
    for (idx, part) in partitions.iter().enumerate() {
        let base = 446 + idx * 16;
        sector[base] = part.status;
        sector[base + 1..base + 4].copy_from_slice(&part.chs_first);
        sector[base + 4] = part.partition_type;
        sector[base + 5..base + 8].copy_from_slice(&part.chs_last);
        sector[base + 8..base + 12].copy_from_slice(&part.lba_start.to_le_bytes());
        sector[base + 12..base + 16].copy_from_slice(&part.sector_count.to_le_bytes());
    }
    sector[510] = 0x55;
    sector[511] = 0xAA;
    sector
}

/// Build a plausible FAT16 boot sector.
pub fn fat16_sector() -> [u8; 512] {
    let mut sector = [0u8; 512];
    sector[0] = 0xEB;
    sector[3..11].copy_from_slice(b"MSDOS5.0");
    sector[11..13].copy_from_slice(&512u16.to_le_bytes());
    sector[13] = 4;
    sector[14..16].copy_from_slice(&1u16.to_le_bytes());
    sector[16] = 2;
    sector[17..19].copy_from_slice(&512u16.to_le_bytes());
    sector[21] = 0xF8;
    sector[22..24].copy_from_slice(&32u16.to_le_bytes());
    sector[510] = 0x55;
    sector[511] = 0xAA;
    sector
}

pub fn insert_bytes(target: &mut Vec<u8>, offset: usize, data: &[u8]) {
    let end = offset + data.len();
    if end > target.len() {
        target.resize(end, 0u8);
    }
    target[offset..end].copy_from_slice(data);
}

pub fn write_image(dir: &tempfile::TempDir, name: &str, data: &[u8]) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, data).unwrap();
    path
}

// ============================================================================
// Environment helpers
// ============================================================================

pub fn run_env(registry: Arc<Registry>, config: Arc<Config>) -> Arc<RunEnv> {
    Arc::new(RunEnv {
        registry,
        classifier: Arc::new(MagicClassifier),
        config,
        clock: Arc::new(SystemClock),
    })
}

// ============================================================================
// Scripted worker pools
// ============================================================================

/// Runs each submitted task synchronously on the caller's thread. Poll
/// reports every in-flight handle as completed.
pub struct InlinePool {
    env: Arc<RunEnv>,
    results: Mutex<HashMap<JobHandle, TaskDescriptor>>,
    next_handle: Mutex<JobHandle>,
    submitted: Arc<Mutex<Vec<String>>>,
}

impl InlinePool {
    pub fn new(env: Arc<RunEnv>) -> Self {
        Self {
            env,
            results: Mutex::new(HashMap::new()),
            next_handle: Mutex::new(1),
            submitted: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Shared log of submitted authoritative names, in submission order.
    pub fn submission_log(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.submitted)
    }
}

impl WorkerPool for InlinePool {
    fn submit(&self, descriptor: TaskDescriptor) -> Result<JobHandle, PoolError> {
        self.submitted
            .lock()
            .unwrap()
            .push(descriptor.name.first().cloned().unwrap_or_default());

        let done = match Task::from_descriptor(descriptor.clone(), &self.env.registry) {
            Ok(mut task) => {
                let _ = task.start(&self.env);
                task.to_descriptor()
                    .map_err(|err| PoolError::Unavailable(err.to_string()))?
            }
            Err(err) => {
                let mut failed = descriptor;
                failed.completed = true;
                failed.warnings.push(err.to_string());
                failed
            }
        };

        let mut next = self.next_handle.lock().unwrap();
        let handle = *next;
        *next += 1;
        self.results.lock().unwrap().insert(handle, done);
        Ok(handle)
    }

    fn poll(&self, in_flight: &[JobHandle], _wait: Duration) -> (Vec<JobHandle>, Vec<JobHandle>) {
        (in_flight.to_vec(), Vec::new())
    }

    fn outstanding(&self) -> Vec<JobHandle> {
        Vec::new()
    }

    fn fetch(&self, handle: JobHandle) -> Result<TaskDescriptor, FetchError> {
        self.results
            .lock()
            .unwrap()
            .remove(&handle)
            .ok_or_else(|| FetchError::Transient(format!("no result for job {handle}")))
    }

    fn drain(&self) -> Result<(), PoolError> {
        Ok(())
    }

    fn abort(&self) {}
}

/// Delegates to an inner pool, but the first `failures` fetches of each
/// handle report a transient miss.
pub struct FlakyFetchPool {
    inner: InlinePool,
    failures: u32,
    attempts: Mutex<HashMap<JobHandle, u32>>,
}

impl FlakyFetchPool {
    pub fn new(inner: InlinePool, failures: u32) -> Self {
        Self {
            inner,
            failures,
            attempts: Mutex::new(HashMap::new()),
        }
    }
}

impl WorkerPool for FlakyFetchPool {
    fn submit(&self, descriptor: TaskDescriptor) -> Result<JobHandle, PoolError> {
        self.inner.submit(descriptor)
    }

    fn poll(&self, in_flight: &[JobHandle], wait: Duration) -> (Vec<JobHandle>, Vec<JobHandle>) {
        self.inner.poll(in_flight, wait)
    }

    fn outstanding(&self) -> Vec<JobHandle> {
        self.inner.outstanding()
    }

    fn fetch(&self, handle: JobHandle) -> Result<TaskDescriptor, FetchError> {
        let mut attempts = self.attempts.lock().unwrap();
        let seen = attempts.entry(handle).or_insert(0);
        if *seen < self.failures {
            *seen += 1;
            return Err(FetchError::Transient(format!(
                "scripted failure {seen} for job {handle}"
            )));
        }
        self.inner.fetch(handle)
    }

    fn drain(&self) -> Result<(), PoolError> {
        self.inner.drain()
    }

    fn abort(&self) {
        self.inner.abort()
    }
}
