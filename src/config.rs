use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Json, Serialized},
    Figment,
};
use log::info;
use serde::{Deserialize, Serialize};

use crate::error::{OptimizeError, Result};

/// Integer weights of the soft-preference cost. Lower total is better.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostWeights {
    /// Per percentage point of a lesson outside the preferred cells.
    pub preference_miss: u64,
    /// Per lesson starting off the common start times.
    pub uncommon_start: u64,
    /// Per lesson minute before `avoidBefore`.
    pub early_minute: u64,
    /// Per lesson minute after `avoidAfter`.
    pub late_minute: u64,
    /// Per lesson on a requested free day.
    pub free_day_lesson: u64,
    /// Per day with at least one lesson.
    pub day_used: u64,
    /// Per idle minute between lessons of the same day.
    pub gap_minute: u64,
}

impl Default for CostWeights {
    fn default() -> Self {
        Self {
            preference_miss: 3,
            uncommon_start: 10,
            early_minute: 2,
            late_minute: 2,
            free_day_lesson: 500,
            day_used: 60,
            gap_minute: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchBudget {
    pub max_nodes: Option<u64>,
    pub time_limit_ms: Option<u64>,
}

impl Default for SearchBudget {
    fn default() -> Self {
        Self {
            max_nodes: None,
            time_limit_ms: Some(30_000),
        }
    }
}

impl SearchBudget {
    pub fn unlimited() -> Self {
        Self {
            max_nodes: None,
            time_limit_ms: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    #[default]
    Sequential,
    Parallel,
}

/// Reachability rule between consecutive lessons in different venues.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkingPolicy {
    pub enabled: bool,
    pub speed_m_per_min: f64,
    pub buffer_min: f64,
    /// Walks up to this long never constrain a pair.
    pub max_walk_min: f64,
    /// Retry without the rule when it makes the request infeasible.
    pub relax_when_infeasible: bool,
}

impl WalkingPolicy {
    /// Speed must be positive and finite; buffer and threshold non-negative.
    pub fn validate(&self) -> std::result::Result<(), OptimizeError> {
        if !(self.speed_m_per_min.is_finite() && self.speed_m_per_min > 0.0) {
            return Err(OptimizeError::invalid(format!(
                "walking speed must be a positive number, got {}",
                self.speed_m_per_min
            )));
        }
        if !(self.buffer_min.is_finite() && self.buffer_min >= 0.0) {
            return Err(OptimizeError::invalid(format!(
                "walking buffer must be zero or more minutes, got {}",
                self.buffer_min
            )));
        }
        if self.max_walk_min.is_nan() || self.max_walk_min < 0.0 {
            return Err(OptimizeError::invalid(format!(
                "maximum walk must be zero or more minutes, got {}",
                self.max_walk_min
            )));
        }
        Ok(())
    }
}

impl Default for WalkingPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            speed_m_per_min: 83.33,
            buffer_min: 2.0,
            max_walk_min: 10.0,
            relax_when_infeasible: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    pub weights: CostWeights,
    pub budget: SearchBudget,
    pub strategy: Strategy,
    pub walking: WalkingPolicy,
    pub venues_path: Option<PathBuf>,
}

impl OptimizerConfig {
    /// Defaults, then the optional JSON file, then `TIMETABLE_*` variables
    /// (`__` separates nested keys, e.g. `TIMETABLE_WEIGHTS__GAP_MINUTE=3`).
    pub fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(OptimizerConfig::default()));
        if let Some(path) = path {
            figment = figment.merge(Json::file(path));
        }
        figment.merge(Env::prefixed("TIMETABLE_").split("__"))
    }

    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config: OptimizerConfig = Self::figment(path).extract()?;
        config.validate()?;
        if let Some(path) = path {
            info!("Read config from {}", path.display());
        }
        Ok(config)
    }

    pub fn validate(&self) -> std::result::Result<(), OptimizeError> {
        self.walking.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use figment::Jail;

    #[test]
    fn defaults_match_documented_policy() {
        let config = OptimizerConfig::default();
        assert_eq!(config.weights.day_used, 60);
        assert_eq!(config.budget.time_limit_ms, Some(30_000));
        assert_eq!(config.strategy, Strategy::Sequential);
        assert!(config.walking.enabled);
    }

    #[test]
    fn file_and_env_layers_override_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "optimizer.json",
                r#"{ "weights": { "gap_minute": 4 }, "strategy": "parallel" }"#,
            )?;
            jail.set_env("TIMETABLE_BUDGET__MAX_NODES", "5000");
            jail.set_env("TIMETABLE_WEIGHTS__DAY_USED", "90");

            let config: OptimizerConfig = OptimizerConfig::figment(Some(Path::new("optimizer.json"))).extract()?;
            assert_eq!(config.weights.gap_minute, 4);
            assert_eq!(config.weights.day_used, 90);
            assert_eq!(config.weights.free_day_lesson, 500);
            assert_eq!(config.strategy, Strategy::Parallel);
            assert_eq!(config.budget.max_nodes, Some(5000));
            assert_eq!(config.budget.time_limit_ms, Some(30_000));
            Ok(())
        });
    }

    #[test]
    fn zero_walking_speed_fails_to_load() {
        Jail::expect_with(|jail| {
            jail.set_env("TIMETABLE_WALKING__SPEED_M_PER_MIN", "0");
            match OptimizerConfig::load(None) {
                Err(AppError::Optimize(OptimizeError::InvalidInput(message))) => {
                    assert!(message.contains("speed"), "{message}")
                }
                other => panic!("expected invalid input, got {other:?}"),
            }
            Ok(())
        });
    }

    #[test]
    fn walking_policy_limits() {
        let with = |speed_m_per_min: f64, buffer_min: f64, max_walk_min: f64| WalkingPolicy {
            speed_m_per_min,
            buffer_min,
            max_walk_min,
            ..WalkingPolicy::default()
        };
        assert!(WalkingPolicy::default().validate().is_ok());
        assert!(with(83.33, 0.0, 0.0).validate().is_ok());
        assert!(with(83.33, 2.0, f64::INFINITY).validate().is_ok());
        assert!(with(-1.0, 2.0, 10.0).validate().is_err());
        assert!(with(f64::NAN, 2.0, 10.0).validate().is_err());
        assert!(with(f64::INFINITY, 2.0, 10.0).validate().is_err());
        assert!(with(83.33, -2.0, 10.0).validate().is_err());
        assert!(with(83.33, 2.0, f64::NAN).validate().is_err());
    }
}
