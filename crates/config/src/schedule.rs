//! Training schedule derived from `system` and `arch` settings
//!
//! Either `system.total_timesteps` or `system.num_updates` drives the run.
//! When the total is given, the update count is recomputed from it, which
//! can round the effective total down.

use serde::Serialize;

use crate::error::ConfigError;
use crate::settings::{ArchSettings, SystemSettings};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TrainingSchedule {
    pub n_devices: u64,
    pub total_timesteps: u64,
    pub num_updates: u64,
    pub num_updates_per_eval: u64,
    /// Equals `rollout_length` unless set explicitly
    pub recurrent_chunk_size: u64,
    /// Environment steps between two evaluations, over all devices
    pub steps_per_rollout: u64,
}

impl TrainingSchedule {
    pub fn derive(
        system: &SystemSettings,
        arch: &ArchSettings,
        n_devices: u64,
    ) -> Result<Self, ConfigError> {
        nonzero("n_devices", n_devices)?;
        nonzero("system.rollout_length", system.rollout_length)?;
        nonzero("system.update_batch_size", system.update_batch_size)?;
        nonzero("arch.num_envs", arch.num_envs)?;
        nonzero("arch.num_evaluation", arch.num_evaluation)?;

        let recurrent_chunk_size = match system.recurrent_chunk_size {
            None => system.rollout_length,
            Some(chunk) => {
                nonzero("system.recurrent_chunk_size", chunk)?;
                if system.rollout_length % chunk != 0 {
                    return Err(ConfigError::Schedule(format!(
                        "rollout_length ({}) must be divisible by recurrent_chunk_size ({})",
                        system.rollout_length, chunk
                    )));
                }
                chunk
            }
        };

        if let Some(minibatches) = system.num_minibatches {
            nonzero("system.num_minibatches", minibatches)?;
            if arch.num_envs % minibatches != 0 {
                return Err(ConfigError::Schedule(format!(
                    "number of envs ({}) must be divisible by number of minibatches ({})",
                    arch.num_envs, minibatches
                )));
            }
        }

        let steps_per_update = n_devices
            .checked_mul(system.rollout_length)
            .and_then(|n| n.checked_mul(system.update_batch_size))
            .and_then(|n| n.checked_mul(arch.num_envs))
            .ok_or_else(|| ConfigError::Schedule("steps per update overflow".to_string()))?;

        let (total_timesteps, num_updates) = match (system.total_timesteps, system.num_updates) {
            (Some(total), requested) => {
                let num_updates = total
                    / system.rollout_length
                    / system.update_batch_size
                    / arch.num_envs
                    / n_devices;
                tracing::warn!(
                    total_timesteps = total,
                    requested = ?requested,
                    num_updates,
                    "Changing num_updates to match total_timesteps"
                );
                (total, num_updates)
            }
            (None, Some(num_updates)) => {
                let total = num_updates.checked_mul(steps_per_update).ok_or_else(|| {
                    ConfigError::Schedule("total_timesteps overflow".to_string())
                })?;
                (total, num_updates)
            }
            (None, None) => {
                return Err(ConfigError::Schedule(
                    "one of system.total_timesteps or system.num_updates must be set".to_string(),
                ))
            }
        };

        if num_updates <= arch.num_evaluation {
            return Err(ConfigError::Schedule(format!(
                "number of updates per evaluation must be less than total number of updates \
                 (num_updates {} <= num_evaluation {})",
                num_updates, arch.num_evaluation
            )));
        }
        let num_updates_per_eval = num_updates / arch.num_evaluation;
        let steps_per_rollout = num_updates_per_eval
            .checked_mul(steps_per_update)
            .ok_or_else(|| ConfigError::Schedule("steps per rollout overflow".to_string()))?;

        Ok(Self {
            n_devices,
            total_timesteps,
            num_updates,
            num_updates_per_eval,
            recurrent_chunk_size,
            steps_per_rollout,
        })
    }

    /// Environment step count reported after evaluation `eval_step` (0-based)
    pub fn timestep_at(&self, eval_step: u64) -> u64 {
        self.steps_per_rollout.saturating_mul(eval_step.saturating_add(1))
    }
}

fn nonzero(name: &str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        Err(ConfigError::Schedule(format!("{} must be greater than zero", name)))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn system(yaml: &str) -> SystemSettings {
        serde_yaml::from_str(yaml).unwrap()
    }

    fn arch(num_envs: u64, num_evaluation: u64) -> ArchSettings {
        ArchSettings {
            num_envs,
            num_evaluation,
            ..ArchSettings::default()
        }
    }

    #[test]
    fn test_num_updates_derived_from_total() {
        let system = system("total_timesteps: 10000000\nrollout_length: 128\nupdate_batch_size: 2\n");
        let schedule = TrainingSchedule::derive(&system, &arch(64, 122), 1).unwrap();
        assert_eq!(schedule.num_updates, 10_000_000 / 128 / 2 / 64);
        assert_eq!(schedule.num_updates, 610);
        assert_eq!(schedule.num_updates_per_eval, 5);
        assert_eq!(schedule.steps_per_rollout, 5 * 128 * 2 * 64);
        assert_eq!(schedule.recurrent_chunk_size, 128);
        assert_eq!(schedule.timestep_at(1), 2 * schedule.steps_per_rollout);
        assert_eq!(schedule.timestep_at(u64::MAX), u64::MAX);
    }

    #[test]
    fn test_total_derived_from_num_updates() {
        let system = system("num_updates: 2000\nrollout_length: 16\n");
        let schedule = TrainingSchedule::derive(&system, &arch(8, 100), 2).unwrap();
        assert_eq!(schedule.total_timesteps, 2 * 2000 * 16 * 8);
        assert_eq!(schedule.num_updates_per_eval, 20);
    }

    #[test]
    fn test_chunk_must_divide_rollout() {
        let system = system("num_updates: 1000\nrollout_length: 128\nrecurrent_chunk_size: 48\n");
        let err = TrainingSchedule::derive(&system, &arch(16, 10), 1).unwrap_err();
        assert!(err.to_string().contains("recurrent_chunk_size"));

        let system = self::system("num_updates: 1000\nrollout_length: 128\nrecurrent_chunk_size: 32\n");
        let schedule = TrainingSchedule::derive(&system, &arch(16, 10), 1).unwrap();
        assert_eq!(schedule.recurrent_chunk_size, 32);
    }

    #[test]
    fn test_envs_must_divide_into_minibatches() {
        let system = system("num_updates: 1000\nnum_minibatches: 3\n");
        assert!(TrainingSchedule::derive(&system, &arch(16, 10), 1).is_err());
    }

    #[test]
    fn test_updates_must_exceed_evaluations() {
        let system = system("num_updates: 10\n");
        let err = TrainingSchedule::derive(&system, &arch(16, 10), 1).unwrap_err();
        assert!(err.to_string().contains("num_evaluation"));
    }

    #[test]
    fn test_zero_divisors_rejected() {
        let system = system("num_updates: 1000\nrollout_length: 0\n");
        assert!(TrainingSchedule::derive(&system, &arch(16, 10), 1).is_err());
        let system = self::system("num_updates: 1000\n");
        assert!(TrainingSchedule::derive(&system, &arch(16, 10), 0).is_err());
    }

    #[test]
    fn test_needs_total_or_updates() {
        assert!(TrainingSchedule::derive(&SystemSettings::default(), &arch(16, 10), 1).is_err());
    }
}
