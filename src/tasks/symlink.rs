//! Terminal handler for symbolic links.
//!
//! Links are recorded with their target and never followed, so a link
//! cycle inside a scanned directory cannot grow the task graph.

use serde_json::{Value, json};

use crate::task::{Outcome, RunEnv, TaskHandler, TaskSpec};

pub const SYMLINK_TASK_NAME: &str = "symlink";
pub const SYMLINK_SIGNATURE_PATTERN: &str = "^symbolic link";

pub struct SymlinkTaskHandler;

impl TaskHandler for SymlinkTaskHandler {
    fn run(&self, spec: &TaskSpec, _env: &RunEnv) -> anyhow::Result<Outcome> {
        let target = std::fs::read_link(&spec.path)?;
        Ok(Outcome {
            result: json!({ "target": target.to_string_lossy() }),
            warnings: Vec::new(),
            follow_ons: Vec::new(),
        })
    }
}
