//! Directory walker task: one follow-on per classified entry.

use std::fs;

use serde_json::Value;
use tracing::debug;

use crate::task::descriptor::TaskDescriptor;
use crate::task::{Outcome, RunEnv, TaskHandler, TaskSpec};

pub const DIR_TASK_NAME: &str = "dir";
pub const DIR_SIGNATURE_PATTERN: &str = "^directory$";

pub struct DirScannerHandler;

impl TaskHandler for DirScannerHandler {
    fn run(&self, spec: &TaskSpec, env: &RunEnv) -> anyhow::Result<Outcome> {
        let mut entries: Vec<_> = fs::read_dir(&spec.path)?
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .map(|e| e.path())
            .collect();
        entries.sort();

        let mut warnings = Vec::new();
        let mut follow_ons = Vec::new();
        for path in &entries {
            let signature = match env.classifier.classify(path) {
                Ok(signature) => signature,
                Err(err) => {
                    warnings.push(format!("cannot classify {}: {err}", path.display()));
                    continue;
                }
            };
            let candidates = env.registry.find_by_signature(&signature, false);
            if candidates.is_empty() {
                warnings.push(format!(
                    "no handler for {} (signature {signature:?})",
                    path.display()
                ));
                continue;
            }
            debug!("scheduling {} as {signature:?}", path.display());
            follow_ons.push(
                TaskDescriptor::new(candidates, path.to_string_lossy().into_owned())
                    .with_priority(spec.priority),
            );
        }

        let result = Value::String(format!(
            "found {} entries, scheduled {} follow-on tasks",
            entries.len(),
            follow_ons.len()
        ));
        Ok(Outcome {
            result,
            warnings,
            follow_ons,
        })
    }
}
