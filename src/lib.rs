//! # siftwork
//!
//! Forensic artifact triage pipeline. Artifacts (disk images, files,
//! directories) are classified and routed to registered task handlers;
//! handlers discover further artifacts (partitions, directory entries,
//! extracted files) and feed them back into the scheduler as serializable
//! task descriptors, growing the task graph until no work remains.

pub mod classify;
pub mod cli;
pub mod config;
pub mod logging;
pub mod pool;
pub mod queue;
pub mod registry;
pub mod results;
pub mod scheduler;
pub mod task;
pub mod tasks;

pub use registry::{Registry, TaskType};
pub use results::ResultLog;
pub use scheduler::Scheduler;
pub use task::descriptor::TaskDescriptor;
pub use task::{Priority, RunEnv, Task};
