//! Recursive key replacement
//!
//! Used to shrink a full experiment config into a fast one for smoke tests:
//! every leaf whose key appears in the replacement table takes the
//! replacement value, wherever it sits in the tree.

use crate::value::{ConfigMap, ConfigValue};

/// Replace every non-mapping value whose key is in `replacements`.
///
/// Mapping-valued keys are descended into, never replaced. Returns the
/// number of values replaced.
pub fn find_replace(map: &mut ConfigMap, replacements: &ConfigMap) -> usize {
    let mut replaced = 0;
    for (key, value) in map.iter_mut() {
        match value {
            ConfigValue::Mapping(inner) => replaced += find_replace(inner, replacements),
            _ => {
                if let Some(replacement) = replacements.get(key) {
                    *value = replacement.clone();
                    replaced += 1;
                }
            }
        }
    }
    replaced
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::KeyPath;

    fn map(yaml: &str) -> ConfigMap {
        let raw: serde_yaml::Value = serde_yaml::from_str(yaml).unwrap();
        match ConfigValue::from_yaml(raw, &KeyPath::root()).unwrap() {
            ConfigValue::Mapping(map) => map,
            other => panic!("expected mapping, got {:?}", other),
        }
    }

    #[test]
    fn test_replaces_at_every_depth() {
        let mut config = map(
            r#"
system:
  buffer_size: 100000
  batch_size: 128
arch:
  num_envs: 64
network:
  layer_sizes: [128, 128]
"#,
        );
        let fast = map("buffer_size: 8\nbatch_size: 1\nnum_envs: 1\nlayer_sizes: [4]\n");

        let replaced = find_replace(&mut config, &fast);
        assert_eq!(replaced, 4);
        assert_eq!(config["system"].as_mapping().unwrap()["buffer_size"].as_i64(), Some(8));
        assert_eq!(config["arch"].as_mapping().unwrap()["num_envs"].as_i64(), Some(1));
        let layers = config["network"].as_mapping().unwrap()["layer_sizes"]
            .as_sequence()
            .unwrap();
        assert_eq!(layers.len(), 1);
    }

    #[test]
    fn test_mapping_keys_are_descended_not_replaced() {
        let mut config = map("kwargs:\n  time_limit: 500\n");
        let replacements = map("kwargs: 1\ntime_limit: 5\n");

        assert_eq!(find_replace(&mut config, &replacements), 1);
        let kwargs = config["kwargs"].as_mapping().unwrap();
        assert_eq!(kwargs["time_limit"].as_i64(), Some(5));
    }
}
