//! Value-level errors

use thiserror::Error;

use crate::path::KeyPath;
use crate::value::ValueKind;

/// Errors raised while building, merging or addressing config values
#[derive(Debug, Error)]
pub enum ValueError {
    /// The same key holds incompatible structural kinds
    #[error("type conflict at '{path}': cannot merge {incoming} into {existing}")]
    TypeConflict {
        path: KeyPath,
        existing: ValueKind,
        incoming: ValueKind,
    },

    /// A path descends through something that is not a mapping
    #[error("'{path}' is not a mapping (found {found})")]
    NotAMapping { path: KeyPath, found: ValueKind },

    /// Key lookup failed
    #[error("key '{0}' not found")]
    KeyNotFound(KeyPath),

    /// YAML construct with no config equivalent
    #[error("unsupported value at '{path}': {detail}")]
    Unsupported { path: KeyPath, detail: String },

    /// Malformed dotted path
    #[error("invalid key path '{0}'")]
    InvalidPath(String),
}

impl ValueError {
    pub fn type_conflict(path: KeyPath, existing: ValueKind, incoming: ValueKind) -> Self {
        Self::TypeConflict {
            path,
            existing,
            incoming,
        }
    }

    pub fn unsupported(path: KeyPath, detail: impl Into<String>) -> Self {
        Self::Unsupported {
            path,
            detail: detail.into(),
        }
    }

    /// Key path the error points at, when it has one
    pub fn path(&self) -> Option<&KeyPath> {
        match self {
            Self::TypeConflict { path, .. }
            | Self::NotAMapping { path, .. }
            | Self::Unsupported { path, .. } => Some(path),
            Self::KeyNotFound(path) => Some(path),
            Self::InvalidPath(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_conflict_display() {
        let err = ValueError::type_conflict(
            KeyPath::parse("env.kwargs").unwrap(),
            ValueKind::Mapping,
            ValueKind::Scalar,
        );
        let msg = err.to_string();
        assert!(msg.contains("env.kwargs"));
        assert!(msg.contains("scalar"));
        assert!(msg.contains("mapping"));
    }
}
