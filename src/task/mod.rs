//! Task lifecycle and handler interface.
//!
//! A task moves `created -> running -> done`, one-directional. The work
//! body runs inside a worker pool execution context; failures there are
//! contained as warnings so a single bad artifact never stops the
//! pipeline. Tasks cross the worker boundary only as descriptors.

pub mod descriptor;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::classify::SignatureClassifier;
use crate::config::Config;
use crate::registry::{Registry, RegistryError};

use descriptor::{DescriptorError, TaskDescriptor};

/// Wire values for the three priority classes, matching the descriptor's
/// integer `priority` field.
pub const PRIO_LOW: i64 = -10;
pub const PRIO_NORMAL: i64 = 0;
pub const PRIO_HIGH: i64 = 10;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

impl Priority {
    pub fn from_wire(value: i64) -> Self {
        match value {
            v if v < 0 => Priority::Low,
            0 => Priority::Normal,
            _ => Priority::High,
        }
    }

    pub fn to_wire(self) -> i64 {
        match self {
            Priority::Low => PRIO_LOW,
            Priority::Normal => PRIO_NORMAL,
            Priority::High => PRIO_HIGH,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Created,
    Running,
    Done,
}

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("task is still running")]
    StillRunning,
    #[error("invalid lifecycle transition from {0:?}")]
    InvalidTransition(TaskState),
    #[error("task is not running")]
    NotRunning,
}

/// Injectable time source so lifecycle timestamps stay deterministic in
/// tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Shared collaborators available to running task bodies.
pub struct RunEnv {
    pub registry: Arc<Registry>,
    pub classifier: Arc<dyn SignatureClassifier>,
    pub config: Arc<Config>,
    pub clock: Arc<dyn Clock>,
}

/// Immutable view of the task a handler body is running for.
#[derive(Debug, Clone)]
pub struct TaskSpec {
    pub name: String,
    pub path: PathBuf,
    pub offset: u64,
    pub priority: Priority,
}

/// What a handler body produced: an opaque result plus any warnings and
/// follow-on descriptors discovered along the way.
#[derive(Debug, Default)]
pub struct Outcome {
    pub result: Value,
    pub warnings: Vec<String>,
    pub follow_ons: Vec<TaskDescriptor>,
}

pub trait TaskHandler: Send + Sync {
    fn run(&self, spec: &TaskSpec, env: &RunEnv) -> anyhow::Result<Outcome>;
}

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

fn next_task_id() -> u64 {
    NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed)
}

/// A unit of work. Owned exclusively by the scheduler from enqueue until
/// its completed descriptor is merged into the result log.
pub struct Task {
    id: u64,
    candidates: Vec<String>,
    handler: Arc<dyn TaskHandler>,
    path: PathBuf,
    offset: u64,
    priority: Priority,
    state: TaskState,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    result: Value,
    warnings: Vec<String>,
    follow_ons: Vec<TaskDescriptor>,
}

impl Task {
    /// Create a seed task for a registered task type.
    pub fn resolve(
        registry: &Registry,
        name: &str,
        path: &Path,
        offset: u64,
        priority: Priority,
    ) -> Result<Self, RegistryError> {
        let ty = registry.find_by_name(name)?;
        Ok(Self {
            id: next_task_id(),
            candidates: vec![ty.name().to_string()],
            handler: ty.handler(),
            path: path.to_path_buf(),
            offset,
            priority,
            state: TaskState::Created,
            started_at: None,
            finished_at: None,
            result: Value::Null,
            warnings: Vec::new(),
            follow_ons: Vec::new(),
        })
    }

    /// Materialize a task from its wire descriptor, resolving the handler
    /// through the registry by the first candidate name.
    pub fn from_descriptor(
        descriptor: TaskDescriptor,
        registry: &Registry,
    ) -> Result<Self, DescriptorError> {
        if descriptor.name.is_empty() {
            return Err(DescriptorError::EmptyName);
        }
        let ty = registry.resolve_candidates(&descriptor.name)?;
        let handler = ty.handler();
        let follow_ons = descriptor
            .next_tasks
            .iter()
            .map(|raw| TaskDescriptor::from_json(raw))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            id: next_task_id(),
            candidates: descriptor.name,
            handler,
            path: PathBuf::from(descriptor.path),
            offset: descriptor.offset,
            priority: Priority::from_wire(descriptor.priority),
            state: if descriptor.completed {
                TaskState::Done
            } else {
                TaskState::Created
            },
            started_at: descriptor.start,
            finished_at: descriptor.end,
            result: descriptor.result,
            warnings: descriptor.warnings,
            follow_ons,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Authoritative name: first entry of the candidate list.
    pub fn name(&self) -> &str {
        &self.candidates[0]
    }

    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn is_done(&self) -> bool {
        self.state == TaskState::Done
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn follow_ons(&self) -> &[TaskDescriptor] {
        &self.follow_ons
    }

    /// Run the task body. Records the running transition and start
    /// timestamp, invokes the handler, and unconditionally records the
    /// done transition and end timestamp. A failing body becomes a
    /// warning, never an error.
    pub fn start(&mut self, env: &RunEnv) -> Result<(), TaskError> {
        if self.state != TaskState::Created {
            return Err(TaskError::InvalidTransition(self.state));
        }
        self.state = TaskState::Running;
        self.started_at = Some(env.clock.now());

        let handler = Arc::clone(&self.handler);
        let spec = TaskSpec {
            name: self.candidates[0].clone(),
            path: self.path.clone(),
            offset: self.offset,
            priority: self.priority,
        };
        match handler.run(&spec, env) {
            Ok(outcome) => {
                self.result = outcome.result;
                self.warnings.extend(outcome.warnings);
                self.follow_ons.extend(outcome.follow_ons);
            }
            Err(err) => {
                warn!("task {} failed on {}: {err:#}", spec.name, self.path.display());
                self.warnings.push(format!("task body failed: {err:#}"));
            }
        }

        self.state = TaskState::Done;
        self.finished_at = Some(env.clock.now());
        Ok(())
    }

    /// Append a warning. Valid only while running.
    pub fn add_warning(&mut self, message: impl Into<String>) -> Result<(), TaskError> {
        if self.state != TaskState::Running {
            return Err(TaskError::NotRunning);
        }
        self.warnings.push(message.into());
        Ok(())
    }

    /// Append a follow-on descriptor. Valid only while running.
    pub fn add_follow_on(&mut self, descriptor: TaskDescriptor) -> Result<(), TaskError> {
        if self.state != TaskState::Running {
            return Err(TaskError::NotRunning);
        }
        self.follow_ons.push(descriptor);
        Ok(())
    }

    /// The task's result. Fails until the task is done; never returns a
    /// placeholder silently.
    pub fn result(&self) -> Result<&Value, TaskError> {
        if self.state != TaskState::Done {
            return Err(TaskError::StillRunning);
        }
        Ok(&self.result)
    }

    /// Project the full task state onto its wire descriptor.
    pub fn to_descriptor(&self) -> Result<TaskDescriptor, DescriptorError> {
        let mut descriptor = TaskDescriptor::new(
            self.candidates.clone(),
            self.path.to_string_lossy().into_owned(),
        );
        descriptor.offset = self.offset;
        descriptor.priority = self.priority.to_wire();
        descriptor.completed = self.state == TaskState::Done;
        descriptor.result = self.result.clone();
        descriptor.warnings = self.warnings.clone();
        descriptor.start = self.started_at;
        descriptor.end = self.finished_at;
        for follow_on in &self.follow_ons {
            descriptor.next_tasks.push(follow_on.to_json()?);
        }
        Ok(descriptor)
    }
}
