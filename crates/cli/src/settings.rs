//! Settings of the `marl-config` tool itself
//!
//! Sources, lowest priority first:
//! 1. built-in defaults
//! 2. `marl-config.toml` in the working directory (optional)
//! 3. `MARL_CONFIG_*` environment variables
//!
//! Command-line flags are applied on top by the caller.

use std::path::Path;

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

pub const SETTINGS_FILE: &str = "marl-config.toml";
pub const ENV_PREFIX: &str = "MARL_CONFIG";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Yaml,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliSettings {
    /// Config search path, highest priority first
    pub config_dirs: Vec<String>,
    /// Primary config used when `--config-name` is absent
    #[serde(default)]
    pub config_name: Option<String>,
    pub format: OutputFormat,
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub log_level: String,
    /// Device count for `--schedule`
    pub devices: u64,
}

impl CliSettings {
    /// Load settings for a run started in `work_dir`
    pub fn load(work_dir: &Path) -> Result<Self, ConfigError> {
        Self::load_with_env(work_dir, Environment::with_prefix(ENV_PREFIX))
    }

    fn load_with_env(work_dir: &Path, env: Environment) -> Result<Self, ConfigError> {
        Config::builder()
            .set_default("config_dirs", vec!["configs/default", "configs"])?
            .set_default("format", "yaml")?
            .set_default("log_level", "warn")?
            .set_default("devices", 1)?
            .add_source(File::from(work_dir.join(SETTINGS_FILE)).required(false))
            .add_source(
                env.try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("config_dirs"),
            )
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fs;

    fn no_env() -> Environment {
        Environment::with_prefix(ENV_PREFIX).source(Some(HashMap::new()))
    }

    #[test]
    fn test_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = CliSettings::load_with_env(dir.path(), no_env()).unwrap();
        assert_eq!(settings.config_dirs, vec!["configs/default", "configs"]);
        assert_eq!(settings.format, OutputFormat::Yaml);
        assert_eq!(settings.log_level, "warn");
        assert_eq!(settings.devices, 1);
        assert!(settings.config_name.is_none());
    }

    #[test]
    fn test_settings_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(SETTINGS_FILE),
            "config_name = \"rec_iql\"\nformat = \"json\"\nconfig_dirs = [\"my_configs\"]\n",
        )
        .unwrap();
        let settings = CliSettings::load_with_env(dir.path(), no_env()).unwrap();
        assert_eq!(settings.config_name.as_deref(), Some("rec_iql"));
        assert_eq!(settings.format, OutputFormat::Json);
        assert_eq!(settings.config_dirs, vec!["my_configs"]);
    }

    #[test]
    fn test_environment_beats_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(SETTINGS_FILE), "format = \"json\"\ndevices = 2\n").unwrap();
        let vars = HashMap::from([
            ("MARL_CONFIG_FORMAT".to_string(), "yaml".to_string()),
            ("MARL_CONFIG_DEVICES".to_string(), "8".to_string()),
            ("MARL_CONFIG_CONFIG_DIRS".to_string(), "a,b".to_string()),
        ]);
        let env = Environment::with_prefix(ENV_PREFIX).source(Some(vars));
        let settings = CliSettings::load_with_env(dir.path(), env).unwrap();
        assert_eq!(settings.format, OutputFormat::Yaml);
        assert_eq!(settings.devices, 8);
        assert_eq!(settings.config_dirs, vec!["a", "b"]);
    }
}
