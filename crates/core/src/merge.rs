//! Structural merge
//!
//! Merge rules, applied recursively:
//! - mapping onto mapping merges key by key
//! - anything onto a placeholder (`null`, `???`), or a placeholder onto
//!   anything, replaces the existing value
//! - scalar onto scalar and sequence onto sequence replace the existing value
//! - every other pairing is a [`ValueError::TypeConflict`]

use crate::error::ValueError;
use crate::path::KeyPath;
use crate::value::{ConfigMap, ConfigValue, ValueKind};

/// Merge `incoming` into `existing`. `path` is the location of `existing`.
pub fn merge_value(
    existing: &mut ConfigValue,
    incoming: ConfigValue,
    path: &KeyPath,
) -> Result<(), ValueError> {
    match (existing, incoming) {
        (ConfigValue::Mapping(base), ConfigValue::Mapping(overlay)) => {
            merge_maps(base, overlay, path)
        }
        (slot, incoming) => {
            if !slot.kind().accepts(incoming.kind()) {
                return Err(ValueError::type_conflict(
                    path.clone(),
                    slot.kind(),
                    incoming.kind(),
                ));
            }
            *slot = incoming;
            Ok(())
        }
    }
}

/// Merge every key of `overlay` into `base`. `path` is the location of `base`.
pub fn merge_maps(
    base: &mut ConfigMap,
    overlay: ConfigMap,
    path: &KeyPath,
) -> Result<(), ValueError> {
    for (key, value) in overlay {
        let child = path.child(&key);
        match base.get_mut(&key) {
            Some(slot) => merge_value(slot, value, &child)?,
            None => {
                base.insert(key, value);
            }
        }
    }
    Ok(())
}

/// Merge `overlay` into the mapping found at `package`, creating
/// intermediate mappings as needed.
pub fn merge_at(
    root: &mut ConfigMap,
    package: &KeyPath,
    overlay: ConfigMap,
) -> Result<(), ValueError> {
    let target = descend_or_create(root, package)?;
    merge_maps(target, overlay, package)
}

/// Set a single value at `path` using the merge rules
pub fn assign(root: &mut ConfigMap, path: &KeyPath, value: ConfigValue) -> Result<(), ValueError> {
    let leaf = path
        .leaf()
        .ok_or_else(|| ValueError::InvalidPath(path.to_string()))?;
    let mut overlay = ConfigMap::new();
    overlay.insert(leaf.to_string(), value);
    merge_at(root, &path.parent(), overlay)
}

/// Look up the value at `path`. Numeric segments index into lists.
pub fn lookup<'a>(root: &'a ConfigMap, path: &KeyPath) -> Option<&'a ConfigValue> {
    let (first, rest) = path.segments().split_first()?;
    rest.iter()
        .try_fold(root.get(first)?, |current, segment| current.child(segment))
}

/// Remove and return the value at `path`
pub fn remove(root: &mut ConfigMap, path: &KeyPath) -> Option<ConfigValue> {
    let (leaf, parents) = path.segments().split_last()?;
    let mut current = root;
    for segment in parents {
        current = current.get_mut(segment)?.as_mapping_mut()?;
    }
    current.remove(leaf)
}

fn descend_or_create<'a>(
    root: &'a mut ConfigMap,
    path: &KeyPath,
) -> Result<&'a mut ConfigMap, ValueError> {
    let mut current = root;
    let mut walked = KeyPath::root();
    for segment in path.segments() {
        walked = walked.child(segment);
        let slot = current
            .entry(segment.clone())
            .or_insert_with(ConfigValue::empty_mapping);
        if slot.is_placeholder() {
            *slot = ConfigValue::empty_mapping();
        }
        current = match slot {
            ConfigValue::Mapping(map) => map,
            other => {
                return Err(ValueError::type_conflict(
                    walked,
                    other.kind(),
                    ValueKind::Mapping,
                ))
            }
        };
    }
    Ok(current)
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

    fn path(dotted: &str) -> KeyPath {
        KeyPath::parse(dotted).unwrap()
    }

    #[test]
    fn test_later_value_wins() {
        let mut base = map("x: 1\ny: keep\n");
        merge_maps(&mut base, map("x: 2\n"), &KeyPath::root()).unwrap();
        assert_eq!(base["x"].as_i64(), Some(2));
        assert_eq!(base["y"].as_str(), Some("keep"));
    }

    #[test]
    fn test_nested_mappings_merge_deeply() {
        let mut base = map("kwargs:\n  time_limit: 500\n  msg_bits: 0\n");
        merge_maps(&mut base, map("kwargs:\n  time_limit: 100\n"), &KeyPath::root()).unwrap();
        assert_eq!(lookup(&base, &path("kwargs.time_limit")).unwrap().as_i64(), Some(100));
        assert_eq!(lookup(&base, &path("kwargs.msg_bits")).unwrap().as_i64(), Some(0));
    }

    #[test]
    fn test_sequences_replace() {
        let mut base = map("layer_sizes: [128, 128]\n");
        merge_maps(&mut base, map("layer_sizes: [64]\n"), &KeyPath::root()).unwrap();
        assert_eq!(base["layer_sizes"].as_sequence().unwrap().len(), 1);
    }

    #[test]
    fn test_scalar_onto_mapping_conflicts() {
        let mut base = map("kwargs:\n  time_limit: 500\n");
        let err = merge_maps(&mut base, map("kwargs: 3\n"), &KeyPath::root()).unwrap_err();
        match err {
            ValueError::TypeConflict {
                path: at,
                existing,
                incoming,
            } => {
                assert_eq!(at, path("kwargs"));
                assert_eq!(existing, ValueKind::Mapping);
                assert_eq!(incoming, ValueKind::Scalar);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_sequence_onto_scalar_conflicts() {
        let mut base = map("net:\n  layers: 3\n");
        let err = merge_maps(&mut base, map("net:\n  layers: [1]\n"), &KeyPath::root()).unwrap_err();
        assert_eq!(err.path(), Some(&path("net.layers")));
    }

    #[test]
    fn test_placeholders_accept_any_kind() {
        let mut base = map("recurrent_chunk_size: ~\nscenario: ???\n");
        merge_maps(
            &mut base,
            map("recurrent_chunk_size: 16\nscenario:\n  name: 3m\n"),
            &KeyPath::root(),
        )
        .unwrap();
        assert_eq!(base["recurrent_chunk_size"].as_i64(), Some(16));
        assert!(base["scenario"].as_mapping().is_some());

        merge_maps(&mut base, map("scenario: ~\n"), &KeyPath::root()).unwrap();
        assert!(base["scenario"].is_null());
    }

    #[test]
    fn test_merge_at_creates_package() {
        let mut root = ConfigMap::new();
        merge_at(&mut root, &path("env.scenario"), map("name: RobotWarehouse\n")).unwrap();
        assert_eq!(
            lookup(&root, &path("env.scenario.name")).unwrap().as_str(),
            Some("RobotWarehouse")
        );
    }

    #[test]
    fn test_merge_at_through_scalar_conflicts() {
        let mut root = map("env: rware\n");
        let err = merge_at(&mut root, &path("env.scenario"), map("name: x\n")).unwrap_err();
        assert_eq!(err.path(), Some(&path("env")));
    }

    #[test]
    fn test_assign_and_remove() {
        let mut root = map("system:\n  actor_lr: 0.001\n");
        assign(&mut root, &path("system.actor_lr"), ConfigValue::from(0.0005)).unwrap();
        assert_eq!(lookup(&root, &path("system.actor_lr")).unwrap().as_f64(), Some(0.0005));

        let removed = remove(&mut root, &path("system.actor_lr")).unwrap();
        assert_eq!(removed.as_f64(), Some(0.0005));
        assert!(lookup(&root, &path("system.actor_lr")).is_none());
        assert!(remove(&mut root, &path("system.nothing")).is_none());
    }

    #[test]
    fn test_lookup_indexes_lists() {
        let root = map("network:\n  layer_sizes: [128, 64]\n  heads:\n    - {dim: 8}\n");
        assert_eq!(lookup(&root, &path("network.layer_sizes.1")).unwrap().as_i64(), Some(64));
        assert_eq!(lookup(&root, &path("network.heads.0.dim")).unwrap().as_i64(), Some(8));
        assert!(lookup(&root, &path("network.layer_sizes.2")).is_none());
        assert!(lookup(&root, &path("network.layer_sizes.first")).is_none());
        assert!(lookup(&root, &path("network.layer_sizes.1.x")).is_none());
    }

    #[test]
    fn test_assign_root_rejected() {
        let mut root = ConfigMap::new();
        assert!(assign(&mut root, &KeyPath::root(), ConfigValue::from(1i64)).is_err());
    }
}
