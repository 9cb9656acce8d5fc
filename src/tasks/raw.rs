//! Seed classification task.
//!
//! Registered last with a catch-all pattern, so it only wins when no
//! concrete handler matches. It classifies the artifact and, when the
//! signature maps to other handlers, re-addresses the work to them.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};

use serde_json::Value;
use tracing::debug;

use crate::classify::classify_bytes;
use crate::task::descriptor::TaskDescriptor;
use crate::task::{Outcome, RunEnv, TaskHandler, TaskSpec};

pub const RAW_TASK_NAME: &str = "raw";
pub const RAW_SIGNATURE_PATTERN: &str = ".*";

const PROBE_BYTES: usize = 512;

pub struct RawTaskHandler;

impl RawTaskHandler {
    fn classify(&self, spec: &TaskSpec, env: &RunEnv) -> std::io::Result<String> {
        if spec.offset == 0 {
            return env.classifier.classify(&spec.path);
        }
        // Offset views bypass the path classifier; probe bytes directly.
        let mut file = File::open(&spec.path)?;
        file.seek(SeekFrom::Start(spec.offset))?;
        let mut probe = [0u8; PROBE_BYTES];
        let read = file.read(&mut probe)?;
        Ok(classify_bytes(&probe[..read]).to_string())
    }
}

impl TaskHandler for RawTaskHandler {
    fn run(&self, spec: &TaskSpec, env: &RunEnv) -> anyhow::Result<Outcome> {
        let signature = self.classify(spec, env)?;
        debug!(
            "classified {} @ {} as {signature:?}",
            spec.path.display(),
            spec.offset
        );

        let mut candidates = env.registry.find_by_signature(&signature, false);
        // Never re-address to ourselves; that would loop forever.
        candidates.retain(|name| name != RAW_TASK_NAME);

        let mut warnings = Vec::new();
        let mut follow_ons = Vec::new();
        if candidates.is_empty() {
            warnings.push(format!("no handler for signature {signature:?}"));
        } else {
            follow_ons.push(
                TaskDescriptor::new(candidates, spec.path.to_string_lossy().into_owned())
                    .with_offset(spec.offset)
                    .with_priority(spec.priority),
            );
        }

        Ok(Outcome {
            result: Value::String(signature),
            warnings,
            follow_ons,
        })
    }
}
