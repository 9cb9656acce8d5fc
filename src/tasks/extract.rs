//! Generic extraction seam.
//!
//! Container formats plug in an [`Extractor`] that unpacks an artifact
//! into files on disk. The wrapping handler feeds every produced path
//! back through the seed classification task, so extracted content flows
//! through the same pipeline as the original artifact.

use std::path::PathBuf;

use serde_json::{Value, json};
use thiserror::Error;

use crate::task::descriptor::TaskDescriptor;
use crate::task::{Outcome, RunEnv, TaskHandler, TaskSpec};
use crate::tasks::raw::RAW_TASK_NAME;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed container: {0}")]
    Malformed(String),
}

/// What an extractor produced: paths now on disk plus format-specific
/// metadata to record in the task result.
#[derive(Debug, Default)]
pub struct Extraction {
    pub produced_paths: Vec<PathBuf>,
    pub metadata: Value,
}

pub trait Extractor: Send + Sync {
    /// Unpack the artifact described by `spec`. `options` is the
    /// config modifier map for this task name.
    fn extract(&self, spec: &TaskSpec, options: &Value) -> Result<Extraction, ExtractError>;
}

/// Adapts any [`Extractor`] into a task handler.
pub struct ExtractHandler {
    extractor: Box<dyn Extractor>,
}

impl ExtractHandler {
    pub fn new(extractor: Box<dyn Extractor>) -> Self {
        Self { extractor }
    }
}

impl TaskHandler for ExtractHandler {
    fn run(&self, spec: &TaskSpec, env: &RunEnv) -> anyhow::Result<Outcome> {
        let options = env.config.modifiers_for(&spec.name);
        let extraction = self.extractor.extract(spec, &options)?;

        let follow_ons = extraction
            .produced_paths
            .iter()
            .map(|path| {
                TaskDescriptor::new(
                    vec![RAW_TASK_NAME.to_string()],
                    path.to_string_lossy().into_owned(),
                )
                .with_priority(spec.priority)
            })
            .collect();

        Ok(Outcome {
            result: json!({
                "produced": extraction.produced_paths.len(),
                "metadata": extraction.metadata,
            }),
            warnings: Vec::new(),
            follow_ons,
        })
    }
}
