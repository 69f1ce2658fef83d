//! Solver input: particle positions, rest positions and constraint pairs.
//!
//! `MeshData` is what the host hands to the solver once at initialization.
//! It is plain data; [`MeshData::validate`] enforces the invariants the
//! solver relies on before any of it is copied into a [`SoftBody`].
//!
//! [`SoftBody`]: crate::body::SoftBody

use glam::Vec3;
use serde::{Deserialize, Serialize};
use sinew_types::{SinewError, SinewResult};

/// Particle and constraint data for one soft body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeshData {
    /// Current particle positions.
    pub positions: Vec<Vec3>,

    /// Undeformed reference configuration. Same length as `positions`.
    #[serde(default)]
    pub rest_positions: Vec<Vec3>,

    /// Distance constraints as particle index pairs. Order within a pair
    /// does not matter.
    #[serde(default)]
    pub constraints: Vec<[u32; 2]>,
}

impl MeshData {
    /// Creates mesh data whose rest configuration equals its current one.
    pub fn at_rest(positions: Vec<Vec3>, constraints: Vec<[u32; 2]>) -> Self {
        Self {
            rest_positions: positions.clone(),
            positions,
            constraints,
        }
    }

    /// Builds mesh data from a flat index list `[a0, b0, a1, b1, ...]`.
    pub fn from_flat_indices(
        positions: Vec<Vec3>,
        rest_positions: Vec<Vec3>,
        flat: &[u32],
    ) -> SinewResult<Self> {
        if flat.len() % 2 != 0 {
            return Err(SinewError::InvalidMesh(format!(
                "Constraint index list has odd length ({})",
                flat.len()
            )));
        }

        let constraints = flat.chunks_exact(2).map(|c| [c[0], c[1]]).collect();
        Ok(Self {
            positions,
            rest_positions,
            constraints,
        })
    }

    /// Returns the number of particles.
    #[inline]
    pub fn particle_count(&self) -> usize {
        self.positions.len()
    }

    /// Returns the number of constraints.
    #[inline]
    pub fn constraint_count(&self) -> usize {
        self.constraints.len()
    }

    /// Returns a copy with current positions scaled by `factor` about their
    /// centroid. Rest positions are untouched, so every constraint starts
    /// strained by the same ratio.
    pub fn stretched(&self, factor: f32) -> Self {
        let mut out = self.clone();
        if self.positions.is_empty() {
            return out;
        }
        let centroid =
            self.positions.iter().copied().sum::<Vec3>() / self.positions.len() as f32;
        for p in &mut out.positions {
            *p = centroid + (*p - centroid) * factor;
        }
        out
    }

    /// Validates mesh integrity.
    ///
    /// Checks:
    /// - Positions and rest positions are non-empty and the same length
    /// - All coordinates are finite
    /// - Constraint indices are within bounds and not self-referencing
    pub fn validate(&self) -> SinewResult<()> {
        let n = self.positions.len();

        if n == 0 {
            return Err(SinewError::InvalidMesh("positions are empty".into()));
        }
        if self.rest_positions.is_empty() {
            return Err(SinewError::InvalidMesh("rest positions are empty".into()));
        }
        if self.rest_positions.len() != n {
            return Err(SinewError::InvalidMesh(format!(
                "rest position count ({}) != position count ({})",
                self.rest_positions.len(),
                n
            )));
        }

        let non_finite = self
            .positions
            .iter()
            .chain(self.rest_positions.iter())
            .position(|p| !p.is_finite());
        if let Some(i) = non_finite {
            return Err(SinewError::InvalidMesh(format!(
                "non-finite coordinate at entry {}",
                i % n
            )));
        }

        for (c, &[a, b]) in self.constraints.iter().enumerate() {
            if a as usize >= n || b as usize >= n {
                return Err(SinewError::InvalidMesh(format!(
                    "constraint {c} references particle ({a}, {b}) out of range (count {n})"
                )));
            }
            if a == b {
                return Err(SinewError::InvalidMesh(format!(
                    "constraint {c} connects particle {a} to itself"
                )));
            }
        }

        Ok(())
    }
}
