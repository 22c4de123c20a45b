//! Optimizer options.
//!
//! A flat options object; every key is optional. Cost keys live in
//! [`CostConfig`] and are flattened into the same object.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::backend::SolverKind;
use crate::cost::CostConfig;
use crate::mip::SolveLimits;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid optimizer options: {0}")]
    Json(#[from] serde_json::Error),
    #[error("mip_gap must be within [0, 1], got {0}")]
    InvalidGap(f64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    #[serde(deserialize_with = "lenient_solver")]
    pub solver: SolverKind,
    pub time_limit_seconds: u64,
    /// Relative MIP gap tolerance.
    pub mip_gap: f64,
    #[serde(flatten)]
    pub costs: CostConfig,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            solver: SolverKind::Cbc,
            time_limit_seconds: 3600,
            mip_gap: 0.01,
            costs: CostConfig::default(),
        }
    }
}

impl OptimizerConfig {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        if !(0.0..=1.0).contains(&config.mip_gap) {
            return Err(ConfigError::InvalidGap(config.mip_gap));
        }
        Ok(config)
    }

    pub fn limits(&self) -> SolveLimits {
        SolveLimits {
            time_limit: Duration::from_secs(self.time_limit_seconds),
            mip_gap: self.mip_gap,
        }
    }
}

/// Unknown solver names select CBC.
fn lenient_solver<'de, D>(deserializer: D) -> Result<SolverKind, D::Error>
where
    D: Deserializer<'de>,
{
    let name = String::deserialize(deserializer)?;
    Ok(name.parse().unwrap_or_else(|_| {
        warn!(solver = %name, "unknown solver name, using CBC");
        SolverKind::Cbc
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = OptimizerConfig::default();
        assert_eq!(config.solver, SolverKind::Cbc);
        assert_eq!(config.time_limit_seconds, 3600);
        assert_eq!(config.mip_gap, 0.01);
        assert_eq!(config.costs.fuel_cost_per_mile, 0.65);
        assert_eq!(config.costs.driver_cost_per_hour, 25.0);
        assert_eq!(config.costs.warehouse_handling_cost, 15.0);
        assert_eq!(config.costs.default_toll_rate, 0.15);
    }

    #[test]
    fn parses_flat_keys() {
        let config = OptimizerConfig::from_json(
            r#"{"solver": "gurobi", "time_limit_seconds": 60, "mip_gap": 0.05,
                "fuel_cost_per_mile": 0.8, "default_toll_rate": 0.2}"#,
        )
        .unwrap();
        assert_eq!(config.solver, SolverKind::Gurobi);
        assert_eq!(config.time_limit_seconds, 60);
        assert_eq!(config.mip_gap, 0.05);
        assert_eq!(config.costs.fuel_cost_per_mile, 0.8);
        assert_eq!(config.costs.default_toll_rate, 0.2);
        assert_eq!(config.costs.driver_cost_per_hour, 25.0);
        assert_eq!(config.limits().time_limit, Duration::from_secs(60));
    }

    #[test]
    fn unknown_solver_selects_cbc() {
        let config = OptimizerConfig::from_json(r#"{"solver": "XPRESS"}"#).unwrap();
        assert_eq!(config.solver, SolverKind::Cbc);
    }

    #[test]
    fn rejects_out_of_range_gap() {
        assert!(matches!(
            OptimizerConfig::from_json(r#"{"mip_gap": 2.0}"#),
            Err(ConfigError::InvalidGap(_))
        ));
        assert!(matches!(
            OptimizerConfig::from_json("not json"),
            Err(ConfigError::Json(_))
        ));
    }
}
