//! Validated soft-body model owned by the solver.
//!
//! Separate from [`MeshData`] so that every `SoftBody` is known to satisfy
//! the index and length invariants, and so rest lengths are computed
//! exactly once.

use glam::Vec3;
use sinew_types::SinewResult;

use crate::constraint::DistanceConstraint;
use crate::mesh::MeshData;

/// Particles, rest configuration and distance constraints.
///
/// # Layout
///
/// `constraints` and `rest_lengths` are parallel arrays:
/// ```text
/// constraints:  [(a0,b0), (a1,b1), ...]
/// rest_lengths: [   r0,      r1,   ...]
/// ```
#[derive(Debug, Clone)]
pub struct SoftBody {
    positions: Vec<Vec3>,
    rest_positions: Vec<Vec3>,
    constraints: Vec<DistanceConstraint>,
    rest_lengths: Vec<f32>,
}

impl SoftBody {
    /// Validates `mesh` and builds the model, caching every rest length
    /// from the rest configuration.
    pub fn from_mesh(mesh: MeshData) -> SinewResult<Self> {
        mesh.validate()?;

        let MeshData {
            positions,
            rest_positions,
            constraints,
        } = mesh;

        let constraints: Vec<DistanceConstraint> =
            constraints.into_iter().map(DistanceConstraint::from).collect();
        let rest_lengths = constraints
            .iter()
            .map(|c| c.length_in(&rest_positions))
            .collect();

        Ok(Self {
            positions,
            rest_positions,
            constraints,
            rest_lengths,
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

    #[inline]
    pub fn positions(&self) -> &[Vec3] {
        &self.positions
    }

    #[inline]
    pub fn positions_mut(&mut self) -> &mut [Vec3] {
        &mut self.positions
    }

    #[inline]
    pub fn rest_positions(&self) -> &[Vec3] {
        &self.rest_positions
    }

    #[inline]
    pub fn constraints(&self) -> &[DistanceConstraint] {
        &self.constraints
    }

    #[inline]
    pub fn rest_lengths(&self) -> &[f32] {
        &self.rest_lengths
    }

    /// Simultaneous access to the mutable positions and the read-only
    /// constraint data, for in-place relaxation.
    #[inline]
    pub fn split_mut(&mut self) -> (&mut [Vec3], &[DistanceConstraint], &[f32]) {
        (&mut self.positions, &self.constraints, &self.rest_lengths)
    }

    /// Replaces every position from a slice of the same length.
    ///
    /// Used when device results are read back.
    pub fn overwrite_positions(&mut self, src: &[Vec3]) {
        let n = self.positions.len().min(src.len());
        self.positions[..n].copy_from_slice(&src[..n]);
    }

    /// Absolute length error `|L - rest|` of constraint `i`.
    #[inline]
    pub fn constraint_error(&self, i: usize) -> f32 {
        (self.constraints[i].length_in(&self.positions) - self.rest_lengths[i]).abs()
    }

    /// Largest absolute length error over all constraints. Zero when empty.
    pub fn max_constraint_error(&self) -> f32 {
        (0..self.constraints.len())
            .map(|i| self.constraint_error(i))
            .fold(0.0f32, f32::max)
    }

    /// Returns true if two constraints share an endpoint.
    ///
    /// A concurrent dispatch over such a set races on the shared particle.
    pub fn has_shared_vertices(&self) -> bool {
        let mut seen = vec![false; self.positions.len()];
        for c in &self.constraints {
            for p in [c.a as usize, c.b as usize] {
                if seen[p] {
                    return true;
                }
                seen[p] = true;
            }
        }
        false
    }
}
