//! Wire-safe projection of a task.
//!
//! Live tasks never cross the worker boundary; descriptors do. The
//! `name` field accepts either a bare string (compatibility alias) or an
//! ordered array of candidate handler names, and is always normalized to
//! the array form. Nested follow-on descriptors travel as JSON-encoded
//! strings, giving one level of indirection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::registry::RegistryError;
use crate::task::Priority;

#[derive(Debug, Error)]
pub enum DescriptorError {
    #[error("descriptor json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("descriptor has no candidate handler names")]
    EmptyName,
    #[error(transparent)]
    Handler(#[from] RegistryError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    /// Ordered candidate handler names, first authoritative.
    #[serde(deserialize_with = "name_candidates")]
    pub name: Vec<String>,
    pub path: String,
    #[serde(default)]
    pub offset: u64,
    #[serde(default)]
    pub priority: i64,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub result: Value,
    /// Follow-on descriptors, each JSON-encoded as a string.
    #[serde(default)]
    pub next_tasks: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
}

fn name_candidates<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(name) => vec![name],
        OneOrMany::Many(names) => names,
    })
}

impl TaskDescriptor {
    pub fn new(candidates: Vec<String>, path: String) -> Self {
        Self {
            name: candidates,
            path,
            offset: 0,
            priority: 0,
            completed: false,
            result: Value::Null,
            next_tasks: Vec::new(),
            warnings: Vec::new(),
            start: None,
            end: None,
        }
    }

    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority.to_wire();
        self
    }

    pub fn to_json(&self) -> Result<String, DescriptorError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(raw: &str) -> Result<Self, DescriptorError> {
        Ok(serde_json::from_str(raw)?)
    }
}
