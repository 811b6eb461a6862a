//! Config value model
//!
//! Every YAML document is converted into a [`ConfigValue`] tree before any
//! merging happens. The tree is a tagged union of scalars, sequences and
//! mappings, so the merge rules can tell structural kinds apart without
//! guessing. Mappings are key-ordered, which makes every traversal (and every
//! printed config) deterministic.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Serialize, Serializer};

use crate::error::ValueError;
use crate::path::KeyPath;

/// Marker for a mandatory value that has not been provided yet
pub const MISSING: &str = "???";

/// Key-ordered mapping of config values
pub type ConfigMap = BTreeMap<String, ConfigValue>;

/// Structural kind of a value, used by the merge rules
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Null,
    Missing,
    Scalar,
    Sequence,
    Mapping,
}

impl ValueKind {
    /// `null` and `???` stand in for any kind
    pub fn is_placeholder(self) -> bool {
        matches!(self, Self::Null | Self::Missing)
    }

    /// Whether a value of kind `incoming` may replace or merge into `self`
    pub fn accepts(self, incoming: ValueKind) -> bool {
        self == incoming
            || self.is_placeholder()
            || incoming.is_placeholder()
            || (self == Self::Scalar && incoming == Self::Scalar)
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Null => "null",
            Self::Missing => "missing value",
            Self::Scalar => "scalar",
            Self::Sequence => "sequence",
            Self::Mapping => "mapping",
        };
        f.write_str(name)
    }
}

/// Leaf value
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// `???` in the source document
    Missing,
}

impl Scalar {
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Null => ValueKind::Null,
            Self::Missing => ValueKind::Missing,
            _ => ValueKind::Scalar,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(i) => write!(f, "{}", i),
            Self::Float(x) => write!(f, "{}", x),
            Self::Str(s) => f.write_str(s),
            Self::Missing => f.write_str(MISSING),
        }
    }
}

impl Serialize for Scalar {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Int(i) => serializer.serialize_i64(*i),
            Self::Float(x) => serializer.serialize_f64(*x),
            Self::Str(s) => serializer.serialize_str(s),
            Self::Missing => serializer.serialize_str(MISSING),
        }
    }
}

/// A node of a config tree
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Scalar(Scalar),
    Sequence(Vec<ConfigValue>),
    Mapping(ConfigMap),
}

impl ConfigValue {
    pub fn null() -> Self {
        Self::Scalar(Scalar::Null)
    }

    pub fn missing() -> Self {
        Self::Scalar(Scalar::Missing)
    }

    pub fn empty_mapping() -> Self {
        Self::Mapping(ConfigMap::new())
    }

    /// Convert a parsed YAML value. `path` locates the value for errors.
    pub fn from_yaml(value: serde_yaml::Value, path: &KeyPath) -> Result<Self, ValueError> {
        use serde_yaml::Value;

        Ok(match value {
            Value::Null => Self::null(),
            Value::Bool(b) => Self::Scalar(Scalar::Bool(b)),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Scalar(Scalar::Int(i))
                } else if let Some(x) = n.as_f64() {
                    Self::Scalar(Scalar::Float(x))
                } else {
                    return Err(ValueError::unsupported(
                        path.clone(),
                        format!("number {} does not fit in i64 or f64", n),
                    ));
                }
            }
            Value::String(s) if s == MISSING => Self::missing(),
            Value::String(s) => Self::Scalar(Scalar::Str(s)),
            Value::Sequence(items) => Self::Sequence(
                items
                    .into_iter()
                    .enumerate()
                    .map(|(i, item)| Self::from_yaml(item, &path.child(&i.to_string())))
                    .collect::<Result<_, _>>()?,
            ),
            Value::Mapping(mapping) => {
                let mut map = ConfigMap::new();
                for (key, value) in mapping {
                    let key = mapping_key(key, path)?;
                    let child = Self::from_yaml(value, &path.child(&key))?;
                    map.insert(key, child);
                }
                Self::Mapping(map)
            }
            Value::Tagged(tagged) => {
                return Err(ValueError::unsupported(
                    path.clone(),
                    format!("YAML tag {} is not supported", tagged.tag),
                ))
            }
        })
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Scalar(s) => s.kind(),
            Self::Sequence(_) => ValueKind::Sequence,
            Self::Mapping(_) => ValueKind::Mapping,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Scalar(Scalar::Null))
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Scalar(Scalar::Missing))
    }

    pub fn is_placeholder(&self) -> bool {
        self.kind().is_placeholder()
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Self::Scalar(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Scalar(Scalar::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Scalar(Scalar::Int(i)) => Some(*i),
            _ => None,
        }
    }

    /// Floats, and integers widened to floats
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Scalar(Scalar::Float(x)) => Some(*x),
            Self::Scalar(Scalar::Int(i)) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Scalar(Scalar::Str(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[ConfigValue]> {
        match self {
            Self::Sequence(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&ConfigMap> {
        match self {
            Self::Mapping(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_mapping_mut(&mut self) -> Option<&mut ConfigMap> {
        match self {
            Self::Mapping(map) => Some(map),
            _ => None,
        }
    }

    /// One step down: a mapping key, or a list index
    pub fn child(&self, segment: &str) -> Option<&ConfigValue> {
        match self {
            Self::Mapping(map) => map.get(segment),
            Self::Sequence(items) => items.get(segment.parse::<usize>().ok()?),
            Self::Scalar(_) => None,
        }
    }

    /// Look up a nested value. The root path returns `self`.
    pub fn get(&self, path: &KeyPath) -> Option<&ConfigValue> {
        path.segments()
            .iter()
            .try_fold(self, |current, segment| current.child(segment))
    }

    /// Deserialize this value into a typed struct
    pub fn deserialize_into<T: DeserializeOwned>(&self) -> Result<T, serde_yaml::Error> {
        serde_yaml::from_value(serde_yaml::to_value(self)?)
    }
}

impl Default for ConfigValue {
    fn default() -> Self {
        Self::null()
    }
}

impl From<bool> for ConfigValue {
    fn from(value: bool) -> Self {
        Self::Scalar(Scalar::Bool(value))
    }
}

impl From<i64> for ConfigValue {
    fn from(value: i64) -> Self {
        Self::Scalar(Scalar::Int(value))
    }
}

impl From<f64> for ConfigValue {
    fn from(value: f64) -> Self {
        Self::Scalar(Scalar::Float(value))
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        Self::Scalar(Scalar::Str(value.to_string()))
    }
}

impl From<String> for ConfigValue {
    fn from(value: String) -> Self {
        Self::Scalar(Scalar::Str(value))
    }
}

impl From<Vec<ConfigValue>> for ConfigValue {
    fn from(value: Vec<ConfigValue>) -> Self {
        Self::Sequence(value)
    }
}

impl From<ConfigMap> for ConfigValue {
    fn from(value: ConfigMap) -> Self {
        Self::Mapping(value)
    }
}

/// Mapping keys are always strings; plain scalar keys are stringified
fn mapping_key(key: serde_yaml::Value, parent: &KeyPath) -> Result<String, ValueError> {
    use serde_yaml::Value;

    match key {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Ok("null".to_string()),
        other => Err(ValueError::unsupported(
            parent.clone(),
            format!("mapping key must be a scalar, found {:?}", other),
        )),
    }
}
