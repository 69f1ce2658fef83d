//! Solver defaults.

/// Default simulation timestep (seconds). 1/60th of a second.
pub const DEFAULT_DT: f32 = 1.0 / 60.0;

/// Default constraint stiffness. Full correction per unit time.
pub const DEFAULT_STIFFNESS: f32 = 1.0;

/// Constraints handled by one compute workgroup.
pub const DEFAULT_WORKGROUP_SIZE: u32 = 64;

/// Largest workgroup size accepted by the config validator.
/// Matches `max_compute_invocations_per_workgroup` of the downlevel limits.
pub const MAX_WORKGROUP_SIZE: u32 = 256;
