//! Dotted key paths
//!
//! Addresses a value inside a nested config (`env.scenario.task_name`).
//! Also used as the package a config is merged at, where the empty path is
//! the root of the composed config.

use std::fmt;
use std::str::FromStr;

use crate::error::ValueError;

/// A dotted path into a nested mapping
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyPath {
    segments: Vec<String>,
}

impl KeyPath {
    /// The empty path, addressing the root mapping
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse a dotted path. The empty string parses to the root.
    pub fn parse(dotted: &str) -> Result<Self, ValueError> {
        let dotted = dotted.trim();
        if dotted.is_empty() {
            return Ok(Self::root());
        }
        let segments: Vec<String> = dotted.split('.').map(str::to_string).collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(ValueError::InvalidPath(dotted.to_string()));
        }
        Ok(Self { segments })
    }

    /// Build a path from a `/`-separated config group (`env/scenario`)
    pub fn from_group(group: &str) -> Self {
        Self {
            segments: group
                .split('/')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Last segment, if any
    pub fn leaf(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// Path without its last segment. The root's parent is the root.
    pub fn parent(&self) -> KeyPath {
        let mut segments = self.segments.clone();
        segments.pop();
        Self { segments }
    }

    /// Append one segment
    pub fn child(&self, key: &str) -> KeyPath {
        let mut segments = self.segments.clone();
        segments.push(key.to_string());
        Self { segments }
    }

    /// Append every segment of `other`
    pub fn join(&self, other: &KeyPath) -> KeyPath {
        let mut segments = self.segments.clone();
        segments.extend(other.segments.iter().cloned());
        Self { segments }
    }

    pub fn starts_with(&self, prefix: &KeyPath) -> bool {
        self.segments.starts_with(&prefix.segments)
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            write!(f, "<root>")
        } else {
            write!(f, "{}", self.segments.join("."))
        }
    }
}

impl FromStr for KeyPath {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
