//! Command-line overrides
//!
//! Grammar, one override per argument:
//!
//! | form              | meaning                                        |
//! |-------------------|------------------------------------------------|
//! | `group=option`    | select another option for a group in the tree  |
//! | `key.path=value`  | assign an existing key                         |
//! | `+key.path=value` | add a key that must not exist yet              |
//! | `+group=option`   | append a group that is not in the tree         |
//! | `++key.path=value`| assign or add                                  |
//! | `~key.path`       | delete a key, or drop a group selection        |
//!
//! Values are YAML flow values: `0.001`, `true`, `[64, 64]`, `null`.

use std::fmt;

use marl_core::{ConfigValue, KeyPath};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideOp {
    Assign,
    Add,
    ForceAdd,
    Delete,
}

/// One parsed override
#[derive(Debug, Clone, PartialEq)]
pub struct Override {
    pub raw: String,
    pub op: OverrideOp,
    /// Key as written, `/`- or `.`-separated
    pub key: String,
    /// Value text as written
    pub raw_value: Option<String>,
    pub value: Option<ConfigValue>,
}

static GRAMMAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<prefix>~|\+\+|\+)?(?P<key>[A-Za-z0-9_\-./]+)(?:=(?P<value>.*))?$")
        .expect("override grammar is a valid regex")
});

impl Override {
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let trimmed = raw.trim();
        let captures = GRAMMAR.captures(trimmed).ok_or_else(|| {
            ConfigError::invalid_override(raw, "expected [+|++|~]key[=value]")
        })?;

        let op = match captures.name("prefix").map(|m| m.as_str()) {
            None => OverrideOp::Assign,
            Some("+") => OverrideOp::Add,
            Some("++") => OverrideOp::ForceAdd,
            Some(_) => OverrideOp::Delete,
        };
        let key = captures["key"].trim_start_matches('/').to_string();
        if key.is_empty() || key.split(|c: char| c == '.' || c == '/').any(str::is_empty) {
            return Err(ConfigError::invalid_override(raw, "malformed key"));
        }

        let raw_value = captures.name("value").map(|m| m.as_str().to_string());
        let value = match &raw_value {
            Some(text) => {
                Some(parse_value(text).map_err(|msg| ConfigError::invalid_override(raw, msg))?)
            }
            None if op == OverrideOp::Delete => None,
            None => return Err(ConfigError::invalid_override(raw, "missing '=value'")),
        };

        Ok(Self {
            raw: raw.to_string(),
            op,
            key,
            raw_value,
            value,
        })
    }

    pub fn parse_all<I, S>(raw: I) -> Result<Vec<Self>, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        raw.into_iter().map(|r| Self::parse(r.as_ref())).collect()
    }

    /// Key as a config group path (`env/scenario`)
    pub fn group(&self) -> String {
        self.key.replace('.', "/")
    }

    /// Key as a value path (`env.scenario`)
    pub fn key_path(&self) -> Result<KeyPath, ConfigError> {
        KeyPath::parse(&self.key.replace('/', "."))
            .map_err(|e| ConfigError::invalid_override(&self.raw, e.to_string()))
    }

    /// Value text used as a group option name
    pub fn option_name(&self) -> Option<&str> {
        self.raw_value.as_deref().map(str::trim)
    }

    /// Whether this override could select an option for a group
    pub fn targets_group(&self) -> bool {
        matches!(
            self.op,
            OverrideOp::Assign | OverrideOp::ForceAdd | OverrideOp::Delete
        ) && !self.key.contains('.')
    }
}

impl fmt::Display for Override {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn parse_value(text: &str) -> Result<ConfigValue, String> {
    if text.trim().is_empty() {
        return Ok(ConfigValue::from(""));
    }
    let raw: serde_yaml::Value = serde_yaml::from_str(text).map_err(|e| e.to_string())?;
    ConfigValue::from_yaml(raw, &KeyPath::root()).map_err(|e| e.to_string())
}
