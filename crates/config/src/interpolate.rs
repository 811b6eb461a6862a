//! `${...}` interpolation
//!
//! Runs once on the composed config, after overrides:
//! - a string that is exactly `${a.b}` takes the referenced value, type included
//! - references embedded in a longer string are stringified (scalars only)
//! - `${oc.env:NAME}` and `${oc.env:NAME,default}` read the environment
//!
//! Referenced values are resolved transitively. Paths are absolute.

use std::collections::HashMap;

use marl_core::{lookup, ConfigMap, ConfigValue, KeyPath, Scalar};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::ConfigError;

/// Looks up an environment variable
pub type EnvLookup = fn(&str) -> Option<String>;

const ENV_RESOLVER: &str = "oc.env:";

static REFERENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([^${}]*)\}").expect("reference pattern is a valid regex"));

/// Whether a string contains an interpolation
pub fn has_interpolation(text: &str) -> bool {
    REFERENCE.is_match(text)
}

/// Resolve every interpolation in `root`
pub fn resolve(root: &ConfigMap, env: EnvLookup) -> Result<ConfigMap, ConfigError> {
    let mut interpolator = Interpolator {
        source: root,
        env,
        resolved: HashMap::new(),
        in_progress: Vec::new(),
    };
    let mut output = ConfigMap::new();
    for (key, value) in root {
        let path = KeyPath::root().child(key);
        output.insert(key.clone(), interpolator.resolve_value(value, &path)?);
    }
    Ok(output)
}

struct Interpolator<'a> {
    source: &'a ConfigMap,
    env: EnvLookup,
    resolved: HashMap<KeyPath, ConfigValue>,
    in_progress: Vec<KeyPath>,
}

impl Interpolator<'_> {
    fn resolve_value(&mut self, value: &ConfigValue, at: &KeyPath) -> Result<ConfigValue, ConfigError> {
        match value {
            ConfigValue::Scalar(Scalar::Str(text)) if has_interpolation(text) => {
                self.resolve_string(text, at)
            }
            ConfigValue::Sequence(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| self.resolve_value(item, &at.child(&i.to_string())))
                .collect::<Result<Vec<_>, _>>()
                .map(ConfigValue::Sequence),
            ConfigValue::Mapping(map) => {
                let mut output = ConfigMap::new();
                for (key, item) in map {
                    output.insert(key.clone(), self.resolve_value(item, &at.child(key))?);
                }
                Ok(ConfigValue::Mapping(output))
            }
            other => Ok(other.clone()),
        }
    }

    fn resolve_string(&mut self, text: &str, at: &KeyPath) -> Result<ConfigValue, ConfigError> {
        // a lone reference keeps the referenced type
        if let Some(captures) = REFERENCE.captures(text) {
            let whole = captures.get(0).map(|m| m.as_str()).unwrap_or_default();
            if whole.len() == text.len() {
                return self.resolve_expression(&captures[1], at);
            }
        }

        let mut output = String::with_capacity(text.len());
        let mut last = 0;
        for captures in REFERENCE.captures_iter(text) {
            let Some(whole) = captures.get(0) else {
                continue;
            };
            output.push_str(&text[last..whole.start()]);
            match self.resolve_expression(&captures[1], at)? {
                ConfigValue::Scalar(scalar) => output.push_str(&scalar.to_string()),
                other => {
                    return Err(ConfigError::interpolation(
                        at.clone(),
                        format!(
                            "'{}' is a {} and cannot be embedded in a string",
                            &captures[1],
                            other.kind()
                        ),
                    ))
                }
            }
            last = whole.end();
        }
        output.push_str(&text[last..]);
        Ok(ConfigValue::from(output))
    }

    fn resolve_expression(&mut self, expression: &str, at: &KeyPath) -> Result<ConfigValue, ConfigError> {
        let expression = expression.trim();
        if let Some(args) = expression.strip_prefix(ENV_RESOLVER) {
            let (name, default) = match args.split_once(',') {
                Some((name, default)) => (name.trim(), Some(default.trim())),
                None => (args.trim(), None),
            };
            return match ((self.env)(name), default) {
                (Some(value), _) => Ok(ConfigValue::from(value)),
                (None, Some(default)) => Ok(ConfigValue::from(default)),
                (None, None) => Err(ConfigError::interpolation(
                    at.clone(),
                    format!("environment variable '{}' is not set", name),
                )),
            };
        }

        let target = KeyPath::parse(expression).map_err(|e| {
            ConfigError::interpolation(at.clone(), e.to_string())
        })?;
        if target.is_root() {
            return Err(ConfigError::interpolation(at.clone(), "empty reference"));
        }
        self.value_at(&target, at)
    }

    fn value_at(&mut self, target: &KeyPath, at: &KeyPath) -> Result<ConfigValue, ConfigError> {
        if let Some(value) = self.resolved.get(target) {
            return Ok(value.clone());
        }
        if self.in_progress.contains(target) {
            let mut chain: Vec<String> = self.in_progress.iter().map(ToString::to_string).collect();
            chain.push(target.to_string());
            return Err(ConfigError::interpolation(
                at.clone(),
                format!("cyclic reference {}", chain.join(" -> ")),
            ));
        }
        let raw = lookup(self.source, target).ok_or_else(|| {
            ConfigError::interpolation(at.clone(), format!("unknown key '{}'", target))
        })?;

        self.in_progress.push(target.clone());
        let value = self.resolve_value(raw, target);
        self.in_progress.pop();

        let value = value?;
        self.resolved.insert(target.clone(), value.clone());
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(yaml: &str) -> ConfigMap {
        let raw: serde_yaml::Value = serde_yaml::from_str(yaml).unwrap();
        match ConfigValue::from_yaml(raw, &KeyPath::root()).unwrap() {
            ConfigValue::Mapping(map) => map,
            other => panic!("expected mapping, got {:?}", other),
        }
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn get<'a>(root: &'a ConfigMap, dotted: &str) -> &'a ConfigValue {
        lookup(root, &KeyPath::parse(dotted).unwrap()).unwrap()
    }

    #[test]
    fn test_whole_reference_keeps_type() {
        let root = map(
            r#"
arch:
  num_envs: 16
  num_eval_episodes: "${arch.num_envs}"
network:
  layers: [64, 64]
critic:
  layers: "${network.layers}"
"#,
        );
        let out = resolve(&root, no_env).unwrap();
        assert_eq!(get(&out, "arch.num_eval_episodes").as_i64(), Some(16));
        assert_eq!(get(&out, "critic.layers").as_sequence().unwrap().len(), 2);
    }

    #[test]
    fn test_embedded_references_are_stringified() {
        let root = map(
            r#"
env:
  env_name: RobotWarehouse
  scenario:
    task_name: tiny-2ag
logger:
  run_name: "${env.env_name}_${env.scenario.task_name}"
"#,
        );
        let out = resolve(&root, no_env).unwrap();
        assert_eq!(get(&out, "logger.run_name").as_str(), Some("RobotWarehouse_tiny-2ag"));
    }

    #[test]
    fn test_transitive_references() {
        let root = map("a: 1\nb: \"${a}\"\nc: \"${b}\"\n");
        let out = resolve(&root, no_env).unwrap();
        assert_eq!(out["c"].as_i64(), Some(1));
    }

    #[test]
    fn test_reference_into_list() {
        let root = map(
            r#"
arch:
  num_envs: 16
network:
  layer_sizes: [128, "${arch.num_envs}"]
  hidden: "${network.layer_sizes.1}"
  label: "first-${network.layer_sizes.0}"
"#,
        );
        let out = resolve(&root, no_env).unwrap();
        assert_eq!(get(&out, "network.hidden").as_i64(), Some(16));
        assert_eq!(get(&out, "network.label").as_str(), Some("first-128"));
        assert_eq!(get(&out, "network.layer_sizes.1").as_i64(), Some(16));

        let root = map("layers: [1]\nx: \"${layers.3}\"\n");
        let err = resolve(&root, no_env).unwrap_err();
        assert!(err.to_string().contains("layers.3"));
    }

    #[test]
    fn test_cycle_detected() {
        let root = map("a: \"${b}\"\nb: \"${a}\"\n");
        let err = resolve(&root, no_env).unwrap_err();
        assert!(err.to_string().contains("cyclic reference"));

        let root = map("a: \"${a}\"\n");
        assert!(resolve(&root, no_env).is_err());
    }

    #[test]
    fn test_unknown_key() {
        let root = map("a: \"${system.seed}\"\n");
        let err = resolve(&root, no_env).unwrap_err();
        assert!(err.to_string().contains("system.seed"));
    }

    #[test]
    fn test_mapping_cannot_be_embedded() {
        let root = map("kwargs:\n  x: 1\nname: \"run-${kwargs}\"\n");
        assert!(resolve(&root, no_env).is_err());
    }

    #[test]
    fn test_env_resolver() {
        fn fake_env(name: &str) -> Option<String> {
            (name == "MARL_RESULTS").then(|| "/tmp/results".to_string())
        }
        let root = map(
            r#"
base_exp_path: "${oc.env:MARL_RESULTS}"
fallback: "${oc.env:UNSET_VAR,results}"
"#,
        );
        let out = resolve(&root, fake_env).unwrap();
        assert_eq!(out["base_exp_path"].as_str(), Some("/tmp/results"));
        assert_eq!(out["fallback"].as_str(), Some("results"));

        let root = map("x: \"${oc.env:UNSET_VAR}\"\n");
        assert!(resolve(&root, fake_env).is_err());
    }

    #[test]
    fn test_plain_strings_untouched() {
        let root = map("cost: \"$5\"\nname: rware\n");
        let out = resolve(&root, no_env).unwrap();
        assert_eq!(out, root);
    }
}
