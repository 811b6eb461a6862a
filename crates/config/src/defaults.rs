//! Defaults lists
//!
//! A config's `defaults` key lists what gets merged around its own keys:
//!
//! ```yaml
//! defaults:
//!   - _self_                 # this config's own keys
//!   - base                   # sibling config in the same group directory
//!   - scenario: tiny-2ag     # option `tiny-2ag` of group `scenario`
//!   - net@network.actor: mlp # explicit package
//!   - optional extra: foo    # skipped when the file does not exist
//!   - override env: smax     # replace an earlier selection of `env`
//!   - logger: null           # no selection
//!   - env: ???               # selection must come from the command line
//! ```

use std::fmt;

use marl_core::{ConfigValue, Scalar};

use crate::error::ConfigError;

/// Sentinel marking where a config's own keys are merged
pub const SELF_ENTRY: &str = "_self_";

/// Selection made for a config group
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupOption {
    Named(String),
    /// `group: null`
    Unset,
    /// `group: ???`
    Mandatory,
}

impl fmt::Display for GroupOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => f.write_str(name),
            Self::Unset => f.write_str("null"),
            Self::Mandatory => f.write_str("???"),
        }
    }
}

/// One entry of a defaults list
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefaultsEntry {
    /// `_self_`
    SelfRef,
    /// Bare name of a config in the same group directory
    Config { name: String, optional: bool },
    /// `group: option`
    Group {
        group: String,
        package: Option<String>,
        option: GroupOption,
        optional: bool,
        is_override: bool,
    },
}

impl DefaultsEntry {
    /// Parse the value of a `defaults` key. `origin` names the config for errors.
    pub fn parse_list(value: &ConfigValue, origin: &str) -> Result<Vec<Self>, ConfigError> {
        let items = match value {
            ConfigValue::Sequence(items) => items,
            ConfigValue::Scalar(Scalar::Null) => return Ok(Vec::new()),
            other => {
                return Err(ConfigError::invalid_defaults(
                    origin,
                    format!("`defaults` must be a list, found {}", other.kind()),
                ))
            }
        };

        let entries = items
            .iter()
            .map(|item| Self::parse_item(item, origin))
            .collect::<Result<Vec<_>, _>>()?;

        let self_count = entries.iter().filter(|e| **e == Self::SelfRef).count();
        if self_count > 1 {
            return Err(ConfigError::invalid_defaults(
                origin,
                "`_self_` may appear at most once",
            ));
        }

        Ok(entries)
    }

    fn parse_item(item: &ConfigValue, origin: &str) -> Result<Self, ConfigError> {
        match item {
            ConfigValue::Scalar(Scalar::Str(name)) => {
                let name = name.trim();
                if name == SELF_ENTRY {
                    return Ok(Self::SelfRef);
                }
                let (optional, name) = strip_keyword(name, "optional");
                if name.is_empty() {
                    return Err(ConfigError::invalid_defaults(origin, "empty config name"));
                }
                Ok(Self::Config {
                    name: strip_extension(name).to_string(),
                    optional,
                })
            }
            ConfigValue::Mapping(map) if map.len() == 1 => {
                let (key, value) = map.iter().next().ok_or_else(|| {
                    ConfigError::invalid_defaults(origin, "empty defaults mapping")
                })?;
                Self::parse_group(key, value, origin)
            }
            ConfigValue::Mapping(map) => Err(ConfigError::invalid_defaults(
                origin,
                format!(
                    "a group entry must have exactly one key, found {}",
                    map.len()
                ),
            )),
            other => Err(ConfigError::invalid_defaults(
                origin,
                format!("unsupported entry of kind {}", other.kind()),
            )),
        }
    }

    fn parse_group(key: &str, value: &ConfigValue, origin: &str) -> Result<Self, ConfigError> {
        let mut optional = false;
        let mut is_override = false;
        let mut rest = key.trim();
        loop {
            let (found, remaining) = strip_keyword(rest, "optional");
            if found {
                optional = true;
                rest = remaining;
                continue;
            }
            let (found, remaining) = strip_keyword(rest, "override");
            if found {
                is_override = true;
                rest = remaining;
                continue;
            }
            break;
        }

        let (group, package) = match rest.split_once('@') {
            Some((group, package)) => (group.trim(), Some(package.trim().to_string())),
            None => (rest, None),
        };
        if group.is_empty() || group == "/" {
            return Err(ConfigError::invalid_defaults(
                origin,
                format!("missing group name in '{}'", key),
            ));
        }
        if matches!(package.as_deref(), Some("")) {
            return Err(ConfigError::invalid_defaults(
                origin,
                format!("empty package in '{}'", key),
            ));
        }

        let option = match value {
            ConfigValue::Scalar(Scalar::Null) => GroupOption::Unset,
            ConfigValue::Scalar(Scalar::Missing) => GroupOption::Mandatory,
            ConfigValue::Scalar(Scalar::Str(name)) => {
                GroupOption::Named(strip_extension(name.trim()).to_string())
            }
            ConfigValue::Scalar(scalar) => GroupOption::Named(scalar.to_string()),
            ConfigValue::Sequence(_) => {
                return Err(ConfigError::invalid_defaults(
                    origin,
                    format!("group '{}' selects a list of options, which is not supported", group),
                ))
            }
            ConfigValue::Mapping(_) => {
                return Err(ConfigError::invalid_defaults(
                    origin,
                    format!("group '{}' must select an option name", group),
                ))
            }
        };

        Ok(Self::Group {
            group: group.to_string(),
            package,
            option,
            optional,
            is_override,
        })
    }

    pub fn is_override(&self) -> bool {
        matches!(self, Self::Group { is_override: true, .. })
    }
}

impl fmt::Display for DefaultsEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SelfRef => f.write_str(SELF_ENTRY),
            Self::Config { name, optional } => {
                if *optional {
                    write!(f, "optional ")?;
                }
                f.write_str(name)
            }
            Self::Group {
                group,
                package,
                option,
                optional,
                is_override,
            } => {
                if *optional {
                    write!(f, "optional ")?;
                }
                if *is_override {
                    write!(f, "override ")?;
                }
                f.write_str(group)?;
                if let Some(package) = package {
                    write!(f, "@{}", package)?;
                }
                write!(f, ": {}", option)
            }
        }
    }
}

fn strip_keyword<'a>(text: &'a str, keyword: &str) -> (bool, &'a str) {
    match text.strip_prefix(keyword) {
        Some(rest) if rest.starts_with(char::is_whitespace) => (true, rest.trim_start()),
        _ => (false, text),
    }
}

pub(crate) fn strip_extension(name: &str) -> &str {
    name.strip_suffix(".yaml")
        .or_else(|| name.strip_suffix(".yml"))
        .unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use marl_core::KeyPath;

    fn parse(yaml: &str) -> Result<Vec<DefaultsEntry>, ConfigError> {
        let raw: serde_yaml::Value = serde_yaml::from_str(yaml).unwrap();
        let value = ConfigValue::from_yaml(raw, &KeyPath::root()).unwrap();
        DefaultsEntry::parse_list(&value, "test.yaml")
    }

    fn named(group: &str, option: &str) -> DefaultsEntry {
        DefaultsEntry::Group {
            group: group.to_string(),
            package: None,
            option: GroupOption::Named(option.to_string()),
            optional: false,
            is_override: false,
        }
    }

    #[test]
    fn test_parse_mixed_entries() {
        let entries = parse(
            r#"
- _self_
- base
- scenario: tiny-2ag
- system: sac/ff_masac.yaml
"#,
        )
        .unwrap();
        assert_eq!(
            entries,
            vec![
                DefaultsEntry::SelfRef,
                DefaultsEntry::Config {
                    name: "base".into(),
                    optional: false
                },
                named("scenario", "tiny-2ag"),
                named("system", "sac/ff_masac"),
            ]
        );
    }

    #[test]
    fn test_parse_keywords_and_package() {
        let entries = parse(
            r#"
- optional extra: foo
- override /env: smax
- net@network.actor: mlp
- logger: null
- env: ???
"#,
        )
        .unwrap();

        match &entries[0] {
            DefaultsEntry::Group { optional, .. } => assert!(*optional),
            other => panic!("unexpected {other:?}"),
        }
        match &entries[1] {
            DefaultsEntry::Group {
                group, is_override, ..
            } => {
                assert_eq!(group, "/env");
                assert!(*is_override);
            }
            other => panic!("unexpected {other:?}"),
        }
        match &entries[2] {
            DefaultsEntry::Group { group, package, .. } => {
                assert_eq!(group, "net");
                assert_eq!(package.as_deref(), Some("network.actor"));
            }
            other => panic!("unexpected {other:?}"),
        }
        match &entries[3] {
            DefaultsEntry::Group { option, .. } => assert_eq!(*option, GroupOption::Unset),
            other => panic!("unexpected {other:?}"),
        }
        match &entries[4] {
            DefaultsEntry::Group { option, .. } => assert_eq!(*option, GroupOption::Mandatory),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_numeric_option_is_stringified() {
        let entries = parse("- seed_group: 42\n").unwrap();
        assert_eq!(entries, vec![named("seed_group", "42")]);
    }

    #[test]
    fn test_duplicate_self_rejected() {
        assert!(parse("- _self_\n- _self_\n").is_err());
    }

    #[test]
    fn test_multi_key_entry_rejected() {
        let err = parse("- {env: rware, arch: anakin}\n").unwrap_err();
        assert!(err.to_string().contains("exactly one key"));
    }

    #[test]
    fn test_option_list_rejected() {
        assert!(parse("- env: [rware, smax]\n").is_err());
    }

    #[test]
    fn test_not_a_list_rejected() {
        assert!(parse("env: rware\n").is_err());
    }

    #[test]
    fn test_display_round_trips_shape() {
        let entries = parse("- optional net@network.actor: mlp\n").unwrap();
        assert_eq!(entries[0].to_string(), "optional net@network.actor: mlp");
    }
}
