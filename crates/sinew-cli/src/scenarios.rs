//! Procedural benchmark scenarios.
//!
//! 1. **Tetrahedron**: the four-particle fixture, strained by 50%
//! 2. **Chain**: a long strand; every interior particle is shared
//! 3. **Lattice**: a dense sheet with shear edges

use serde::{Deserialize, Serialize};

use sinew_mesh::generators::{chain, lattice, tetrahedron};
use sinew_mesh::MeshData;
use sinew_types::constants::DEFAULT_DT;

/// Which scenario to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioKind {
    Tetrahedron,
    Chain,
    Lattice,
}

impl ScenarioKind {
    pub fn all() -> &'static [ScenarioKind] {
        &[ScenarioKind::Tetrahedron, ScenarioKind::Chain, ScenarioKind::Lattice]
    }

    pub fn name(&self) -> &'static str {
        match self {
            ScenarioKind::Tetrahedron => "tetrahedron",
            ScenarioKind::Chain => "chain",
            ScenarioKind::Lattice => "lattice",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::all().iter().copied().find(|k| k.name() == name)
    }
}

/// A fully specified scenario.
pub struct Scenario {
    pub kind: ScenarioKind,
    pub mesh: MeshData,
    pub timesteps: u32,
    pub dt: f32,
}

impl Scenario {
    pub fn from_kind(kind: ScenarioKind) -> Self {
        let (mesh, timesteps) = match kind {
            ScenarioKind::Tetrahedron => (tetrahedron().stretched(1.5), 120),
            ScenarioKind::Chain => (chain(1_024, 0.05).stretched(1.2), 240),
            ScenarioKind::Lattice => (lattice(128, 128, 0.02).stretched(1.1), 240),
        };
        Self {
            kind,
            mesh,
            timesteps,
            dt: DEFAULT_DT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_roundtrip() {
        for &kind in ScenarioKind::all() {
            assert_eq!(ScenarioKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(ScenarioKind::from_name("sphere"), None);
    }

    #[test]
    fn scenarios_are_valid_and_strained() {
        for &kind in ScenarioKind::all() {
            let scenario = Scenario::from_kind(kind);
            assert!(scenario.mesh.validate().is_ok());
            assert_ne!(scenario.mesh.positions, scenario.mesh.rest_positions);
        }
    }
}
