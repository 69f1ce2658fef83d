//! Simulation config file (TOML).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sinew_solver::SolverConfig;
use sinew_types::constants::DEFAULT_DT;
use sinew_types::{SinewError, SinewResult};

use crate::scenarios::ScenarioKind;

/// Everything `sinew simulate` needs.
///
/// ```toml
/// dt = 0.016
/// steps = 600
/// scenario = "lattice"
/// log_level = "debug"
///
/// [solver]
/// stiffness = 0.8
/// dispatch_mode = "colored"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub solver: SolverConfig,
    /// Timestep (seconds).
    pub dt: f32,
    pub steps: u32,
    /// Built-in mesh, used when `mesh` is not set.
    pub scenario: ScenarioKind,
    /// JSON mesh file.
    pub mesh: Option<PathBuf>,
    /// Where to write the final mesh as JSON.
    pub output: Option<PathBuf>,
    /// `tracing` filter directive, e.g. "info" or "sinew_solver=debug".
    pub log_level: String,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            solver: SolverConfig::default(),
            dt: DEFAULT_DT,
            steps: 300,
            scenario: ScenarioKind::Lattice,
            mesh: None,
            output: None,
            log_level: "info".to_string(),
        }
    }
}

impl SimulationConfig {
    pub fn load(path: &Path) -> SinewResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&text).map_err(|e| SinewError::Serialization(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> SinewResult<()> {
        self.solver.validate()?;
        if !self.dt.is_finite() || self.dt < 0.0 {
            return Err(SinewError::InvalidConfig(format!("dt {} must be finite and >= 0", self.dt)));
        }
        Ok(())
    }
}
