use crate::error::{Error, Result};
use crate::exports::ExportOptions;
use crate::scheduler::DEFAULT_MAX_PARALLEL_TASKS;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Conditions accepted by default, highest priority first.
pub const DEFAULT_CONDITION_KEYS: &[&str] = &["browser", "module", "import", "default"];

/// Calls slower than this are logged.
pub const DEFAULT_SLOW_CALL_WARNING_MS: u64 = 500;

/// Resolver configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Ceiling on concurrent filesystem operations per walk.
    pub max_parallel_tasks: usize,

    /// Export conditions to accept, highest priority first.
    pub condition_keys: Vec<String>,

    /// Export maps used instead of a package's own, keyed by package name.
    pub export_overrides: BTreeMap<String, Map<String, Value>>,

    /// Threshold for the slow-call warning, in milliseconds.
    pub slow_call_warning_ms: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_parallel_tasks: DEFAULT_MAX_PARALLEL_TASKS,
            condition_keys: DEFAULT_CONDITION_KEYS
                .iter()
                .map(ToString::to_string)
                .collect(),
            export_overrides: BTreeMap::new(),
            slow_call_warning_ms: DEFAULT_SLOW_CALL_WARNING_MS,
        }
    }
}

impl ResolverConfig {
    /// Load a JSON config file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path).map_err(|source| Error::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&source).map_err(|source| Error::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parse config from JSON source.
    pub fn from_json(source: &str) -> serde_json::Result<Self> {
        let mut config: Self = serde_json::from_str(source)?;
        config.max_parallel_tasks = config.max_parallel_tasks.max(1);
        Ok(config)
    }

    #[must_use]
    pub fn with_max_parallel_tasks(mut self, max_parallel_tasks: usize) -> Self {
        self.max_parallel_tasks = max_parallel_tasks.max(1);
        self
    }

    #[must_use]
    pub fn with_condition_keys(mut self, keys: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.condition_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Replace the export map of the package called `name`.
    #[must_use]
    pub fn with_export_override(mut self, name: impl Into<String>, map: Map<String, Value>) -> Self {
        self.export_overrides.insert(name.into(), map);
        self
    }

    #[must_use]
    pub fn with_slow_call_warning_ms(mut self, ms: u64) -> Self {
        self.slow_call_warning_ms = ms;
        self
    }

    #[must_use]
    pub fn slow_call_warning(&self) -> Duration {
        Duration::from_millis(self.slow_call_warning_ms)
    }

    /// Export options for the package called `name`.
    #[must_use]
    pub fn export_options_for(&self, name: &str) -> ExportOptions {
        ExportOptions {
            allowed_condition_keys: self.condition_keys.clone(),
            override_export_map: self.export_overrides.get(name).cloned(),
        }
    }
}
