//! Configuration errors

use std::path::PathBuf;

use marl_core::{KeyPath, ValueError, ValueKind};
use thiserror::Error;

/// Every way loading an experiment config can fail.
///
/// None of these are retried: they abort resolution with the offending
/// config and, where there is one, the key path.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read a config file
    #[error("failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML syntax error
    #[error("failed to parse config '{origin}': {source}")]
    Parse {
        origin: String,
        #[source]
        source: serde_yaml::Error,
    },

    /// Document parsed but cannot be used as a config node
    #[error("invalid config document '{origin}': {message}")]
    InvalidDocument { origin: String, message: String },

    /// Malformed entry in a defaults list
    #[error("invalid defaults entry in '{origin}': {message}")]
    InvalidDefaults { origin: String, message: String },

    /// A defaults entry names a config that does not exist
    #[error("'{origin}' lists '{entry}' in its defaults, but config '{missing}' was not found")]
    MissingReference {
        origin: String,
        entry: String,
        missing: String,
    },

    /// Defaults chain revisits a config already being resolved
    #[error("cyclic defaults: {}", .chain.join(" -> "))]
    CyclicDefaults { chain: Vec<String> },

    /// Same key resolves to incompatible structural kinds
    #[error("type conflict while applying '{origin}' at '{path}': cannot merge {incoming} into {existing}")]
    TypeConflict {
        origin: String,
        path: KeyPath,
        existing: ValueKind,
        incoming: ValueKind,
    },

    /// A `group: ???` default that nothing selected
    #[error("config group '{group}' in '{origin}' needs a selection (pass {group}=<option>)")]
    MandatorySelection { origin: String, group: String },

    /// Malformed or inapplicable command-line override
    #[error("invalid override '{raw}': {message}")]
    InvalidOverride { raw: String, message: String },

    /// `${...}` could not be resolved
    #[error("interpolation failed at '{path}': {message}")]
    Interpolation { path: KeyPath, message: String },

    /// `???` leaves remain where a complete config is required
    #[error("missing mandatory values: {}", join_paths(.paths))]
    MissingValue { paths: Vec<KeyPath> },

    /// A config section does not match its typed settings
    #[error("invalid '{section}' settings: {source}")]
    Settings {
        section: String,
        #[source]
        source: serde_yaml::Error,
    },

    /// Training schedule constraint violated
    #[error("invalid training schedule: {0}")]
    Schedule(String),
}

impl ConfigError {
    pub fn read_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ReadFile {
            path: path.into(),
            source,
        }
    }

    pub fn parse(origin: impl Into<String>, source: serde_yaml::Error) -> Self {
        Self::Parse {
            origin: origin.into(),
            source,
        }
    }

    pub fn invalid_document(origin: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidDocument {
            origin: origin.into(),
            message: message.into(),
        }
    }

    pub fn invalid_defaults(origin: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidDefaults {
            origin: origin.into(),
            message: message.into(),
        }
    }

    pub fn invalid_override(raw: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidOverride {
            raw: raw.into(),
            message: message.into(),
        }
    }

    pub fn interpolation(path: KeyPath, message: impl Into<String>) -> Self {
        Self::Interpolation {
            path,
            message: message.into(),
        }
    }

    pub fn settings(section: impl Into<String>, source: serde_yaml::Error) -> Self {
        Self::Settings {
            section: section.into(),
            source,
        }
    }

    /// Attach the config being applied to a value-level error
    pub fn from_value(origin: impl Into<String>, err: ValueError) -> Self {
        let origin = origin.into();
        match err {
            ValueError::TypeConflict {
                path,
                existing,
                incoming,
            } => Self::TypeConflict {
                origin,
                path,
                existing,
                incoming,
            },
            other => Self::InvalidDocument {
                origin,
                message: other.to_string(),
            },
        }
    }
}

fn join_paths(paths: &[KeyPath]) -> String {
    paths
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_display_lists_chain() {
        let err = ConfigError::CyclicDefaults {
            chain: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "cyclic defaults: a -> b -> a");
    }

    #[test]
    fn test_type_conflict_keeps_origin_and_path() {
        let value_err = ValueError::type_conflict(
            KeyPath::parse("env.kwargs").unwrap(),
            ValueKind::Mapping,
            ValueKind::Scalar,
        );
        let err = ConfigError::from_value("configs/env/rware.yaml", value_err);
        let msg = err.to_string();
        assert!(matches!(err, ConfigError::TypeConflict { .. }));
        assert!(msg.contains("configs/env/rware.yaml"));
        assert!(msg.contains("env.kwargs"));
    }

    #[test]
    fn test_missing_value_lists_paths() {
        let err = ConfigError::MissingValue {
            paths: vec![
                KeyPath::parse("system.seed").unwrap(),
                KeyPath::parse("env.scenario").unwrap(),
            ],
        };
        assert_eq!(
            err.to_string(),
            "missing mandatory values: system.seed, env.scenario"
        );
    }
}
