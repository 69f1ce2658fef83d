//! Sequential relaxation on the host.

use sinew_mesh::{DistanceConstraint, SoftBody};
use sinew_telemetry::Diagnostics;
use sinew_types::{SinewError, SinewResult};

use crate::strategy::{ExecutionPath, ExecutionStrategy, StepOutcome};

/// Applies the correction of constraint `index` in place.
///
/// Returns `Ok(false)` when the endpoints coincide and nothing was moved.
pub fn solve_distance_constraint(body: &mut SoftBody, index: usize, stiffness: f32, dt: f32) -> SinewResult<bool> {
    let (positions, constraints, rest_lengths) = body.split_mut();
    match (constraints.get(index), rest_lengths.get(index)) {
        (Some(&c), Some(&rest)) => Ok(apply(positions, c, rest, stiffness, dt)),
        _ => Err(SinewError::InvalidMesh(format!(
            "constraint index {index} out of range ({} constraints)",
            constraints.len()
        ))),
    }
}

#[inline]
fn apply(
    positions: &mut [glam::Vec3],
    c: DistanceConstraint,
    rest_length: f32,
    stiffness: f32,
    dt: f32,
) -> bool {
    let (a, b) = (c.a as usize, c.b as usize);
    match DistanceConstraint::project(positions[a], positions[b], rest_length, stiffness, dt) {
        Some((d1, d2)) => {
            positions[a] += d1;
            positions[b] += d2;
            true
        }
        None => false,
    }
}

/// One Gauss-Seidel sweep in constraint-list order. Returns the number of
/// constraints that applied a correction.
pub fn relax(body: &mut SoftBody, stiffness: f32, dt: f32) -> u32 {
    let (positions, constraints, rest_lengths) = body.split_mut();
    let mut corrected = 0;
    for (&c, &rest) in constraints.iter().zip(rest_lengths) {
        if apply(positions, c, rest, stiffness, dt) {
            corrected += 1;
        }
    }
    corrected
}

/// The CPU execution path.
#[derive(Debug, Default)]
pub struct CpuRelaxation {
    sweeps: u64,
}

impl CpuRelaxation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sweeps performed.
    pub fn sweeps(&self) -> u64 {
        self.sweeps
    }
}

impl ExecutionStrategy for CpuRelaxation {
    fn step(
        &mut self,
        body: &mut SoftBody,
        stiffness: f32,
        dt: f32,
        _diagnostics: &mut Diagnostics,
    ) -> StepOutcome {
        self.sweeps += 1;
        StepOutcome::Relaxed {
            corrected: relax(body, stiffness, dt),
        }
    }

    fn path(&self) -> ExecutionPath {
        ExecutionPath::Cpu
    }

    fn name(&self) -> &str {
        "cpu_relaxation"
    }
}
