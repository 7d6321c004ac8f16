use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::car_rental::RentalConfig;
use crate::gridworld::GridConfig;
use crate::solver::policy_iteration::PolicyIterationConfig;
use crate::solver::SolverError;

/// Per-problem settings: each worked example pairs its model parameters with
/// its own solver parameters.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub grid: GridSection,
    pub rental: RentalSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridSection {
    pub world: GridConfig,
    pub solver: PolicyIterationConfig,
}

impl Default for GridSection {
    fn default() -> GridSection {
        GridSection {
            world: GridConfig::default(),
            solver: PolicyIterationConfig {
                discount: 0.5,
                theta: 1e-3,
                ..PolicyIterationConfig::default()
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RentalSection {
    pub model: RentalConfig,
    pub solver: PolicyIterationConfig,
}

impl Default for RentalSection {
    fn default() -> RentalSection {
        RentalSection {
            model: RentalConfig::default(),
            solver: PolicyIterationConfig::default(),
        }
    }
}

impl Config {
    pub fn from_toml(text: &str) -> Result<Config, SolverError> {
        toml::from_str(text)
            .map_err(|err| SolverError::InvalidConfiguration(format!("bad config file: {}", err)))
    }

    /// Reads the config file if present; a missing file means defaults.
    pub fn load(path: &Path) -> Result<Config, SolverError> {
        if !path.exists() {
            return Ok(Config::default());
        }
        let text = fs::read_to_string(path).map_err(|err| {
            SolverError::InvalidConfiguration(format!("cannot read {}: {}", path.display(), err))
        })?;
        Config::from_toml(&text)
    }
}
