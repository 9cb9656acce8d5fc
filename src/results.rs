use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use thiserror::Error;

use crate::task::descriptor::TaskDescriptor;

#[derive(Debug, Error)]
pub enum ResultsError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serde error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Append-only record of finished tasks, in completion order. Persisted
/// as a single JSON array of descriptor-shaped objects carrying their
/// start/end timestamps.
#[derive(Debug, Default)]
pub struct ResultLog {
    entries: Vec<TaskDescriptor>,
}

impl ResultLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, descriptor: TaskDescriptor) {
        self.entries.push(descriptor);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[TaskDescriptor] {
        &self.entries
    }

    /// Entries whose authoritative name matches.
    pub fn by_name(&self, name: &str) -> Vec<&TaskDescriptor> {
        self.entries
            .iter()
            .filter(|d| d.name.first().is_some_and(|n| n == name))
            .collect()
    }

    /// Persist the full document. Writes a sibling temp file and renames
    /// it into place, so readers never observe a partial document.
    pub fn save(&self, path: &Path) -> Result<(), ResultsError> {
        let mut tmp_name = path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = std::path::PathBuf::from(tmp_name);

        let file = File::create(&tmp_path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, &self.entries)?;
        writer.flush()?;
        std::fs::rename(&tmp_path, path)?;
        Ok(())
    }
}
