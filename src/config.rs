use std::collections::HashMap;
use std::path::Path;

use anyhow::Result;
use serde::Deserialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::registry::Registry;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    pub run_id: String,
    /// Task names drained ahead of everything else on each scheduler
    /// iteration.
    pub priority: Vec<String>,
    pub poll_interval_ms: u64,
    pub max_fetch_retries: u32,
    /// Worker thread count; 0 means one per logical CPU.
    pub workers: usize,
    pub results_file: String,
    /// Per-task-name option maps, passed through to handlers verbatim.
    pub modifiers: HashMap<String, HashMap<String, Value>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            run_id: String::new(),
            priority: Vec::new(),
            poll_interval_ms: 100,
            max_fetch_retries: 5,
            workers: 0,
            results_file: "results.json".to_string(),
            modifiers: HashMap::new(),
        }
    }
}

impl Config {
    pub fn worker_count(&self) -> usize {
        if self.workers == 0 {
            num_cpus::get()
        } else {
            self.workers
        }
    }

    /// Modifier map for one task name, as a JSON object. Absent entries
    /// yield an empty object so handlers can index without special cases.
    pub fn modifiers_for(&self, name: &str) -> Value {
        match self.modifiers.get(name) {
            Some(map) => Value::Object(map.clone().into_iter().collect()),
            None => Value::Object(serde_json::Map::new()),
        }
    }

    /// Warn about modifier sections addressed to task names the registry
    /// does not know. Typos here are otherwise silent.
    pub fn validate_modifiers(&self, registry: &Registry) {
        for (name, options) in &self.modifiers {
            match registry.find_by_name(name) {
                Err(_) => warn!("modifiers configured for unknown task {name:?}"),
                Ok(task_type) => {
                    for key in options.keys() {
                        if !task_type.recognizes_modifier(key) {
                            warn!("task {name:?} does not recognize modifier {key:?}");
                        }
                    }
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: Config,
    pub config_hash: String,
}

pub fn load_config(path: Option<&Path>) -> Result<LoadedConfig> {
    let bytes: Vec<u8> = if let Some(p) = path {
        std::fs::read(p)?
    } else {
        include_bytes!("../config/default.yml").to_vec()
    };

    let mut config: Config = serde_yaml::from_slice(&bytes)?;
    if config.run_id.trim().is_empty() {
        config.run_id = generate_run_id();
    }

    let config_hash = hash_bytes(&bytes);

    Ok(LoadedConfig { config, config_hash })
}

fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    hex::encode(digest)
}

fn generate_run_id() -> String {
    let now = chrono::Utc::now();
    format!("{}_{}", now.format("%Y%m%dT%H%M%SZ"), rand_suffix())
}

fn rand_suffix() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    format!("{:08x}", nanos)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_to_missing_fields() {
        let config: Config = serde_yaml::from_str("priority:\n  - mbr\n").unwrap();
        assert_eq!(config.priority, vec!["mbr"]);
        assert_eq!(config.poll_interval_ms, 100);
        assert_eq!(config.max_fetch_retries, 5);
        assert_eq!(config.results_file, "results.json");
    }

    #[test]
    fn blank_run_id_is_generated() {
        let loaded = load_config(None).unwrap();
        assert!(!loaded.config.run_id.trim().is_empty());
        assert_eq!(loaded.config_hash.len(), 64);
    }

    #[test]
    fn modifiers_for_missing_name_is_empty_object() {
        let config = Config::default();
        assert_eq!(config.modifiers_for("mbr"), Value::Object(Default::default()));
    }

    #[test]
    fn validate_modifiers_walks_known_and_unknown_names() {
        use crate::registry::TaskType;
        use crate::task::{Outcome, RunEnv, TaskHandler, TaskSpec};
        use std::sync::Arc;

        struct NullHandler;

        impl TaskHandler for NullHandler {
            fn run(&self, _spec: &TaskSpec, _env: &RunEnv) -> anyhow::Result<Outcome> {
                Ok(Outcome::default())
            }
        }

        let mut registry = Registry::new();
        registry.register(
            TaskType::new("extract", "^Zip archive data", Arc::new(NullHandler))
                .unwrap()
                .with_modifiers(["target_dir"]),
        );

        let yaml = concat!(
            "modifiers:\n",
            "  extract:\n",
            "    target_dir: /tmp/out\n",
            "    bogus_key: 1\n",
            "  mistyped_name:\n",
            "    anything: true\n",
        );
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        // Unknown names and keys are warnings, never errors.
        config.validate_modifiers(&registry);
    }

    #[test]
    fn modifiers_for_returns_configured_options() {
        let yaml = "modifiers:\n  extract:\n    target_dir: /tmp/out\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        let options = config.modifiers_for("extract");
        assert_eq!(options["target_dir"], Value::String("/tmp/out".to_string()));
    }
}
