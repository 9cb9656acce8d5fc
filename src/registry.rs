use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use regex::Regex;
use thiserror::Error;
use tracing::debug;

use crate::task::TaskHandler;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("no handler registered under name {0:?}")]
    UnknownHandler(String),
    #[error("signature {signature:?} matches more than one handler: {candidates:?}")]
    AmbiguousHandler {
        signature: String,
        candidates: Vec<String>,
    },
    #[error("invalid signature pattern for {name:?}: {source}")]
    InvalidPattern {
        name: String,
        #[source]
        source: regex::Error,
    },
}

/// A registered task type: name, anchored signature pattern, the set of
/// configuration modifier keys the handler understands, and the handler
/// constructor itself. Immutable once registered.
pub struct TaskType {
    name: String,
    pattern: Regex,
    modifiers: BTreeSet<String>,
    handler: Arc<dyn TaskHandler>,
}

impl TaskType {
    /// Build a task type. The signature pattern is anchored at the start;
    /// a leading `^` in `pattern` is honored as-is.
    pub fn new(
        name: &str,
        pattern: &str,
        handler: Arc<dyn TaskHandler>,
    ) -> Result<Self, RegistryError> {
        let anchored = if pattern.starts_with('^') {
            pattern.to_string()
        } else {
            format!("^(?:{pattern})")
        };
        let pattern = Regex::new(&anchored).map_err(|source| RegistryError::InvalidPattern {
            name: name.to_string(),
            source,
        })?;
        Ok(Self {
            name: name.to_string(),
            pattern,
            modifiers: BTreeSet::new(),
            handler,
        })
    }

    pub fn with_modifiers<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.modifiers = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn matches(&self, signature: &str) -> bool {
        self.pattern.is_match(signature)
    }

    pub fn recognizes_modifier(&self, key: &str) -> bool {
        self.modifiers.contains(key)
    }

    pub fn handler(&self) -> Arc<dyn TaskHandler> {
        Arc::clone(&self.handler)
    }
}

impl std::fmt::Debug for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskType")
            .field("name", &self.name)
            .field("pattern", &self.pattern.as_str())
            .field("modifiers", &self.modifiers)
            .finish()
    }
}

/// Maps task-type names to constructors and signature predicates. Built
/// once at startup by explicit registration calls; shared read-only with
/// the scheduler and with task handlers afterwards.
#[derive(Default)]
pub struct Registry {
    order: Vec<String>,
    types: HashMap<String, TaskType>,
    cache: Mutex<HashMap<String, Vec<String>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task type. Idempotent by name: a second registration
    /// under the same name is ignored.
    pub fn register(&mut self, ty: TaskType) {
        if self.types.contains_key(ty.name()) {
            debug!("task type {:?} already registered; keeping the first", ty.name());
            return;
        }
        self.order.push(ty.name().to_string());
        self.types.insert(ty.name().to_string(), ty);
        self.cache.lock().unwrap().clear();
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.order
    }

    pub fn find_by_name(&self, name: &str) -> Result<&TaskType, RegistryError> {
        self.types
            .get(name)
            .ok_or_else(|| RegistryError::UnknownHandler(name.to_string()))
    }

    /// Return the names of all task types whose pattern matches the
    /// signature, in registration order. An empty result is not an error:
    /// it signals "no handler" and callers record it as a warning.
    pub fn find_by_signature(&self, signature: &str, first_only: bool) -> Vec<String> {
        let mut cache = self.cache.lock().unwrap();
        let names = cache.entry(signature.to_string()).or_insert_with(|| {
            self.order
                .iter()
                .filter(|name| {
                    self.types
                        .get(name.as_str())
                        .is_some_and(|ty| ty.matches(signature))
                })
                .cloned()
                .collect()
        });
        if first_only {
            names.iter().take(1).cloned().collect()
        } else {
            names.clone()
        }
    }

    /// Resolve a signature that must map to exactly one task type.
    pub fn resolve_unique(&self, signature: &str) -> Result<&TaskType, RegistryError> {
        let matches = self.find_by_signature(signature, false);
        match matches.as_slice() {
            [] => Err(RegistryError::UnknownHandler(signature.to_string())),
            [one] => self.find_by_name(one),
            many => Err(RegistryError::AmbiguousHandler {
                signature: signature.to_string(),
                candidates: many.to_vec(),
            }),
        }
    }

    /// Resolve an ordered candidate-name list, first name authoritative.
    /// Later candidates are only consulted when earlier ones are not
    /// registered.
    pub fn resolve_candidates(&self, candidates: &[String]) -> Result<&TaskType, RegistryError> {
        for (idx, name) in candidates.iter().enumerate() {
            if let Some(ty) = self.types.get(name) {
                if idx > 0 {
                    debug!(
                        "authoritative handler {:?} not registered; using candidate {name:?}",
                        candidates[0]
                    );
                }
                return Ok(ty);
            }
        }
        Err(RegistryError::UnknownHandler(
            candidates.first().cloned().unwrap_or_default(),
        ))
    }

    /// Drop the signature-match cache. Matching falls back to a full scan
    /// on the next lookup.
    pub fn rebuild(&self) {
        self.cache.lock().unwrap().clear();
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry").field("order", &self.order).finish()
    }
}
