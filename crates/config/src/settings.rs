//! Typed views over a resolved config
//!
//! The training entry point reads four sections: `env`, `system`, `arch`
//! and `logger`. Each has a serde struct with defaults for the keys every
//! experiment needs; anything else lands in `extra` so algorithm-specific
//! hyperparameters survive the round trip.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

/// Free-form hyperparameters
pub type Extra = BTreeMap<String, serde_yaml::Value>;

/// All sections consumed by a training run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExperimentSettings {
    pub env: EnvSettings,
    pub system: SystemSettings,
    pub arch: ArchSettings,
    pub logger: LoggerSettings,
}

/// `env` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvSettings {
    /// Environment family, used for logging
    #[serde(default)]
    pub env_name: String,
    #[serde(default)]
    pub scenario: ScenarioSettings,
    /// Metric returned at the end of an experiment
    #[serde(default = "default_eval_metric")]
    pub eval_metric: String,
    /// Observations already encode agent ids
    #[serde(default)]
    pub implicit_agent_id: bool,
    #[serde(default)]
    pub log_win_rate: bool,
    #[serde(default)]
    pub use_shared_rewards: bool,
    /// Passed through to the environment constructor
    #[serde(default)]
    pub kwargs: Extra,
    #[serde(flatten)]
    pub extra: Extra,
}

fn default_eval_metric() -> String {
    "episode_return".to_string()
}

impl Default for EnvSettings {
    fn default() -> Self {
        Self {
            env_name: String::new(),
            scenario: ScenarioSettings::default(),
            eval_metric: default_eval_metric(),
            implicit_agent_id: false,
            log_win_rate: false,
            use_shared_rewards: false,
            kwargs: Extra::new(),
            extra: Extra::new(),
        }
    }
}

/// `env.scenario` section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScenarioSettings {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub task_name: String,
    #[serde(flatten)]
    pub extra: Extra,
}

/// `system` section: algorithm hyperparameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemSettings {
    #[serde(default)]
    pub system_name: Option<String>,
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Total environment steps. When set, `num_updates` is derived from it.
    #[serde(default, deserialize_with = "optional_count")]
    pub total_timesteps: Option<u64>,
    #[serde(default, deserialize_with = "optional_count")]
    pub num_updates: Option<u64>,
    #[serde(default = "default_rollout_length", deserialize_with = "count")]
    pub rollout_length: u64,
    #[serde(default = "default_update_batch_size", deserialize_with = "count")]
    pub update_batch_size: u64,
    #[serde(default, deserialize_with = "optional_count")]
    pub num_minibatches: Option<u64>,
    #[serde(default, deserialize_with = "optional_count")]
    pub recurrent_chunk_size: Option<u64>,
    #[serde(default, deserialize_with = "optional_count")]
    pub buffer_size: Option<u64>,
    #[serde(default, deserialize_with = "optional_count")]
    pub batch_size: Option<u64>,
    #[serde(default, deserialize_with = "optional_count")]
    pub min_buffer_size: Option<u64>,
    #[serde(default = "default_gamma")]
    pub gamma: f64,
    #[serde(default)]
    pub actor_lr: Option<f64>,
    #[serde(default)]
    pub critic_lr: Option<f64>,
    #[serde(default)]
    pub q_lr: Option<f64>,
    #[serde(default)]
    pub policy_lr: Option<f64>,
    #[serde(flatten)]
    pub extra: Extra,
}

fn default_seed() -> u64 {
    42
}

fn default_rollout_length() -> u64 {
    1
}

fn default_update_batch_size() -> u64 {
    1
}

fn default_gamma() -> f64 {
    0.99
}

impl Default for SystemSettings {
    fn default() -> Self {
        Self {
            system_name: None,
            seed: default_seed(),
            total_timesteps: None,
            num_updates: None,
            rollout_length: default_rollout_length(),
            update_batch_size: default_update_batch_size(),
            num_minibatches: None,
            recurrent_chunk_size: None,
            buffer_size: None,
            batch_size: None,
            min_buffer_size: None,
            gamma: default_gamma(),
            actor_lr: None,
            critic_lr: None,
            q_lr: None,
            policy_lr: None,
            extra: Extra::new(),
        }
    }
}

/// `arch` section: how rollouts and evaluation are laid out
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchSettings {
    #[serde(default = "default_architecture")]
    pub architecture_name: String,
    #[serde(default = "default_num_envs", deserialize_with = "count")]
    pub num_envs: u64,
    #[serde(default = "default_num_eval_episodes", deserialize_with = "count")]
    pub num_eval_episodes: u64,
    #[serde(default = "default_num_evaluation", deserialize_with = "count")]
    pub num_evaluation: u64,
    #[serde(default = "default_true")]
    pub absolute_metric: bool,
    #[serde(flatten)]
    pub extra: Extra,
}

fn default_architecture() -> String {
    "anakin".to_string()
}

fn default_num_envs() -> u64 {
    16
}

fn default_num_eval_episodes() -> u64 {
    32
}

fn default_num_evaluation() -> u64 {
    200
}

fn default_true() -> bool {
    true
}

impl Default for ArchSettings {
    fn default() -> Self {
        Self {
            architecture_name: default_architecture(),
            num_envs: default_num_envs(),
            num_eval_episodes: default_num_eval_episodes(),
            num_evaluation: default_num_evaluation(),
            absolute_metric: true,
            extra: Extra::new(),
        }
    }
}

/// `logger` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggerSettings {
    #[serde(default = "default_base_exp_path")]
    pub base_exp_path: String,
    #[serde(default = "default_true")]
    pub use_console: bool,
    #[serde(default)]
    pub use_tb: bool,
    #[serde(default)]
    pub use_json: bool,
    #[serde(default)]
    pub use_neptune: bool,
    #[serde(default)]
    pub checkpointing: CheckpointSettings,
    #[serde(flatten)]
    pub extra: Extra,
}

fn default_base_exp_path() -> String {
    "results".to_string()
}

impl Default for LoggerSettings {
    fn default() -> Self {
        Self {
            base_exp_path: default_base_exp_path(),
            use_console: true,
            use_tb: false,
            use_json: false,
            use_neptune: false,
            checkpointing: CheckpointSettings::default(),
            extra: Extra::new(),
        }
    }
}

/// `logger.checkpointing` section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckpointSettings {
    #[serde(default)]
    pub save_model: bool,
    #[serde(default)]
    pub load_model: bool,
    #[serde(flatten)]
    pub extra: Extra,
}

/// Step counts are often written as `1e7`; accept whole floats as integers
#[derive(Deserialize)]
#[serde(untagged)]
enum Count {
    Int(u64),
    Float(f64),
}

impl Count {
    fn into_u64<E: serde::de::Error>(self) -> Result<u64, E> {
        match self {
            Self::Int(n) => Ok(n),
            Self::Float(x) if x >= 0.0 && x.fract() == 0.0 && x <= u64::MAX as f64 => Ok(x as u64),
            Self::Float(x) => Err(E::custom(format!(
                "expected a non-negative whole number, found {}",
                x
            ))),
        }
    }
}

fn count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    Count::deserialize(deserializer)?.into_u64()
}

fn optional_count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    match Option::<Count>::deserialize(deserializer)? {
        Some(count) => count.into_u64().map(Some),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_defaults_and_passthrough() {
        let yaml = r#"
env_name: RobotWarehouse
scenario:
  name: RobotWarehouse
  task_name: tiny-2ag
  task_config:
    column_height: 8
kwargs:
  time_limit: 500
custom_flag: true
"#;
        let env: EnvSettings = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(env.env_name, "RobotWarehouse");
        assert_eq!(env.eval_metric, "episode_return");
        assert_eq!(env.scenario.task_name, "tiny-2ag");
        assert!(env.scenario.extra.contains_key("task_config"));
        assert_eq!(env.kwargs["time_limit"].as_u64(), Some(500));
        assert!(env.extra.contains_key("custom_flag"));
    }

    #[test]
    fn test_counts_accept_scientific_floats() {
        let yaml = "total_timesteps: 10000000.0\nrollout_length: 8\nbuffer_size: 100000\n";
        let system: SystemSettings = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(system.total_timesteps, Some(10_000_000));
        assert_eq!(system.rollout_length, 8);
        assert_eq!(system.buffer_size, Some(100_000));
        assert_eq!(system.num_updates, None);
    }

    #[test]
    fn test_fractional_count_rejected() {
        let yaml = "total_timesteps: 1.5\n";
        assert!(serde_yaml::from_str::<SystemSettings>(yaml).is_err());
    }

    #[test]
    fn test_null_count_is_none() {
        let yaml = "num_updates: ~\nrecurrent_chunk_size: ~\n";
        let system: SystemSettings = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(system.num_updates, None);
        assert_eq!(system.recurrent_chunk_size, None);
        assert_eq!(system.seed, 42);
    }

    #[test]
    fn test_arch_and_logger_defaults() {
        let arch: ArchSettings = serde_yaml::from_str("num_envs: 64\n").unwrap();
        assert_eq!(arch.num_envs, 64);
        assert_eq!(arch.num_evaluation, 200);
        assert!(arch.absolute_metric);

        let logger: LoggerSettings =
            serde_yaml::from_str("checkpointing:\n  save_model: true\n").unwrap();
        assert!(logger.checkpointing.save_model);
        assert!(!logger.checkpointing.load_model);
        assert_eq!(logger.base_exp_path, "results");
    }
}
