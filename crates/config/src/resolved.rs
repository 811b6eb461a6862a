//! Resolved experiment config
//!
//! Built once per resolution run and read-only afterwards, apart from the
//! explicit [`ResolvedConfig::with_replacements`] used to shrink configs for
//! fast test runs.

use std::fmt;

use marl_core::{find_replace, lookup, ConfigMap, ConfigValue, KeyPath, Scalar};
use serde::de::DeserializeOwned;
use serde::{Serialize, Serializer};

use crate::error::ConfigError;
use crate::settings::ExperimentSettings;

/// One config merged during composition, in merge order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositionStep {
    pub id: String,
    pub origin: String,
    /// Where the config's own keys were merged
    pub package: KeyPath,
}

impl fmt::Display for CompositionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let package = if self.package.is_root() {
            "_global_".to_string()
        } else {
            self.package.to_string()
        };
        write!(f, "{:<32} {:<24} {}", self.id, package, self.origin)
    }
}

/// The single nested mapping produced by resolution
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    root: ConfigMap,
    trace: Vec<CompositionStep>,
}

impl ResolvedConfig {
    pub fn new(root: ConfigMap, trace: Vec<CompositionStep>) -> Self {
        Self { root, trace }
    }

    pub fn root(&self) -> &ConfigMap {
        &self.root
    }

    pub fn into_inner(self) -> ConfigMap {
        self.root
    }

    /// Configs merged to build this one, in merge order
    pub fn trace(&self) -> &[CompositionStep] {
        &self.trace
    }

    /// Value at a dotted path (`env.scenario.task_name`)
    pub fn get(&self, dotted: &str) -> Option<&ConfigValue> {
        let path = KeyPath::parse(dotted).ok()?;
        self.get_path(&path)
    }

    pub fn get_path(&self, path: &KeyPath) -> Option<&ConfigValue> {
        lookup(&self.root, path)
    }

    pub fn contains(&self, dotted: &str) -> bool {
        self.get(dotted).is_some()
    }

    /// Deserialize the value at `dotted` into `T`
    pub fn get_as<T: DeserializeOwned>(&self, dotted: &str) -> Result<T, ConfigError> {
        let value = self.get(dotted).cloned().unwrap_or_default();
        value
            .deserialize_into()
            .map_err(|e| ConfigError::settings(dotted, e))
    }

    /// Deserialize a top-level section; an absent section uses `T::default()`
    pub fn section<T: DeserializeOwned + Default>(&self, name: &str) -> Result<T, ConfigError> {
        match self.root.get(name) {
            Some(value) if !value.is_null() => value
                .deserialize_into()
                .map_err(|e| ConfigError::settings(name, e)),
            _ => Ok(T::default()),
        }
    }

    /// Typed view of the `env`, `system`, `arch` and `logger` sections
    pub fn settings(&self) -> Result<ExperimentSettings, ConfigError> {
        Ok(ExperimentSettings {
            env: self.section("env")?,
            system: self.section("system")?,
            arch: self.section("arch")?,
            logger: self.section("logger")?,
        })
    }

    /// Paths of `???` values still present, in key order
    pub fn missing_keys(&self) -> Vec<KeyPath> {
        let mut missing = Vec::new();
        collect_missing(&self.root, &KeyPath::root(), &mut missing);
        missing
    }

    /// Fail if any `???` values remain
    pub fn ensure_complete(&self) -> Result<(), ConfigError> {
        let paths = self.missing_keys();
        if paths.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::MissingValue { paths })
        }
    }

    /// Copy with every non-mapping value under a key in `replacements` swapped out
    pub fn with_replacements(&self, replacements: &ConfigMap) -> (Self, usize) {
        let mut root = self.root.clone();
        let count = find_replace(&mut root, replacements);
        (
            Self {
                root,
                trace: self.trace.clone(),
            },
            count,
        )
    }

    pub fn to_yaml_string(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(&self.root)
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.root)
    }
}

impl Serialize for ResolvedConfig {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.root.serialize(serializer)
    }
}

fn collect_missing(map: &ConfigMap, at: &KeyPath, out: &mut Vec<KeyPath>) {
    for (key, value) in map {
        let path = at.child(key);
        match value {
            ConfigValue::Scalar(Scalar::Missing) => out.push(path),
            ConfigValue::Mapping(child) => collect_missing(child, &path, out),
            ConfigValue::Sequence(items) => {
                for (i, item) in items.iter().enumerate() {
                    let item_path = path.child(&i.to_string());
                    match item {
                        ConfigValue::Scalar(Scalar::Missing) => out.push(item_path),
                        ConfigValue::Mapping(child) => collect_missing(child, &item_path, out),
                        _ => {}
                    }
                }
            }
            ConfigValue::Scalar(_) => {}
        }
    }
}
