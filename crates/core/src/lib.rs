//! Core value model for MARL experiment configs
//!
//! Provides the pieces every other crate builds on:
//! - [`ConfigValue`]: tagged union of scalars, sequences and mappings
//! - [`KeyPath`]: dotted addressing (`env.scenario.task_name`)
//! - structural merge with explicit type-conflict detection
//! - recursive key replacement for fast test configs

pub mod error;
pub mod merge;
pub mod path;
pub mod replace;
pub mod value;

pub use error::ValueError;
pub use merge::{assign, lookup, merge_at, merge_maps, merge_value, remove};
pub use path::KeyPath;
pub use replace::find_replace;
pub use value::{ConfigMap, ConfigValue, Scalar, ValueKind, MISSING};
