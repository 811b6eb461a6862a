//! Parsed config documents

use marl_core::{ConfigMap, ConfigValue, KeyPath};

use crate::defaults::DefaultsEntry;
use crate::error::ConfigError;

/// Key holding the defaults list
pub const DEFAULTS_KEY: &str = "defaults";

/// One YAML document, split into its defaults list and its own keys
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigSource {
    /// `/`-separated id without extension (`env/scenario/tiny-2ag`)
    pub id: String,
    /// Where the document came from, for messages
    pub origin: String,
    /// `# @package` header, if any
    pub package: Option<String>,
    pub defaults: Vec<DefaultsEntry>,
    /// Own keys, without `defaults`
    pub body: ConfigMap,
}

impl ConfigSource {
    pub fn parse(id: &str, origin: &str, text: &str) -> Result<Self, ConfigError> {
        let package = package_header(text);

        let raw: serde_yaml::Value = if !has_content(text) {
            serde_yaml::Value::Null
        } else {
            serde_yaml::from_str(text).map_err(|e| ConfigError::parse(origin, e))?
        };

        let mut body = match ConfigValue::from_yaml(raw, &KeyPath::root())
            .map_err(|e| ConfigError::from_value(origin, e))?
        {
            ConfigValue::Mapping(map) => map,
            ConfigValue::Scalar(marl_core::Scalar::Null) => ConfigMap::new(),
            other => {
                return Err(ConfigError::invalid_document(
                    origin,
                    format!("top level must be a mapping, found {}", other.kind()),
                ))
            }
        };

        let defaults = match body.remove(DEFAULTS_KEY) {
            Some(value) => DefaultsEntry::parse_list(&value, origin)?,
            None => Vec::new(),
        };

        Ok(Self {
            id: id.to_string(),
            origin: origin.to_string(),
            package,
            defaults,
            body,
        })
    }

    /// Group directory the config lives in (`env/scenario` for
    /// `env/scenario/tiny-2ag`, empty at the repository root)
    pub fn group_dir(&self) -> &str {
        self.id.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
    }

    pub fn lists_self(&self) -> bool {
        self.defaults.contains(&DefaultsEntry::SelfRef)
    }
}

/// Whether the document has anything besides blank lines and comments
fn has_content(text: &str) -> bool {
    text.lines().any(|line| {
        let line = line.trim();
        !line.is_empty() && !line.starts_with('#')
    })
}

/// Read a `# @package <name>` directive from the leading comment block
pub fn package_header(text: &str) -> Option<String> {
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let comment = line.strip_prefix('#')?;
        if let Some(package) = comment.trim().strip_prefix("@package") {
            let package = package.trim();
            if !package.is_empty() {
                return Some(package.to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_split_from_body() {
        let source = ConfigSource::parse(
            "env/rware",
            "env/rware.yaml",
            r#"
defaults:
  - _self_
  - scenario: tiny-2ag

env_name: RobotWarehouse
kwargs:
  time_limit: 500
"#,
        )
        .unwrap();
        assert_eq!(source.defaults.len(), 2);
        assert!(source.lists_self());
        assert!(!source.body.contains_key("defaults"));
        assert_eq!(source.body["env_name"].as_str(), Some("RobotWarehouse"));
        assert_eq!(source.group_dir(), "env");
    }

    #[test]
    fn test_empty_and_comment_only_documents() {
        let empty = ConfigSource::parse("x", "x.yaml", "").unwrap();
        assert!(empty.body.is_empty());
        let comments = ConfigSource::parse("x", "x.yaml", "# nothing here\n").unwrap();
        assert!(comments.body.is_empty());
    }

    #[test]
    fn test_non_mapping_document_rejected() {
        let err = ConfigSource::parse("x", "x.yaml", "- a\n- b\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidDocument { .. }));
    }

    #[test]
    fn test_syntax_error_names_origin() {
        let err = ConfigSource::parse("x", "configs/x.yaml", "a: [1, 2\n").unwrap_err();
        assert!(err.to_string().contains("configs/x.yaml"));
    }

    #[test]
    fn test_package_header() {
        assert_eq!(
            package_header("# The tiny scenario\n# @package _global_\nname: x\n"),
            Some("_global_".to_string())
        );
        assert_eq!(package_header("name: x\n# @package _global_\n"), None);
        assert_eq!(package_header("\n\n#@package env.extra\n"), Some("env.extra".to_string()));
    }

    #[test]
    fn test_root_group_dir_is_empty() {
        let source = ConfigSource::parse("rware", "rware.yaml", "env_name: x\n").unwrap();
        assert_eq!(source.group_dir(), "");
    }
}
