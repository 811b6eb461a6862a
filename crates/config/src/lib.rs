//! Hierarchical experiment configuration
//!
//! Composes one experiment config from a tree of YAML documents:
//! - defaults lists with `_self_` ordering, groups, packages and overrides
//! - Hydra-style command-line overrides
//! - `${...}` interpolation
//! - typed settings views and the derived training schedule
//!
//! ```no_run
//! use marl_config::{FileRepository, Override, Resolver};
//!
//! let repository = FileRepository::with_search_paths(["configs/default", "configs"]);
//! let overrides = Override::parse_all(["env=smax", "system.seed=7"])?;
//! let config = Resolver::new(repository)
//!     .with_overrides(overrides)
//!     .resolve("rec_qmix")?;
//! println!("{}", config.to_yaml_string()?);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod defaults;
pub mod error;
pub mod interpolate;
pub mod overrides;
pub mod repository;
pub mod resolved;
pub mod resolver;
pub mod schedule;
pub mod settings;
pub mod source;

use std::path::Path;

pub use defaults::{DefaultsEntry, GroupOption};
pub use error::ConfigError;
pub use overrides::{Override, OverrideOp};
pub use repository::{ConfigRepository, FileRepository, MemoryRepository, RawConfig, SourceCache};
pub use resolved::{CompositionStep, ResolvedConfig};
pub use resolver::Resolver;
pub use schedule::TrainingSchedule;
pub use settings::{
    ArchSettings, CheckpointSettings, EnvSettings, ExperimentSettings, LoggerSettings,
    ScenarioSettings, SystemSettings,
};
pub use source::ConfigSource;

/// Resolve a config file, searching for its defaults next to it
pub fn resolve_file<P: AsRef<Path>>(path: P) -> Result<ResolvedConfig, ConfigError> {
    let path = path.as_ref();
    let name = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .ok_or_else(|| ConfigError::invalid_document(path.display().to_string(), "not a config file"))?;
    let dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    Resolver::new(FileRepository::new(dir)).resolve(name)
}
