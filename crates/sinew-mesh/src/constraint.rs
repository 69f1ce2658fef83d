//! Pairwise distance constraint.

use glam::Vec3;
use serde::{Deserialize, Serialize};

/// A directionless distance relation between two particles.
///
/// The rest length lives next to the constraint list in [`SoftBody`]
/// rather than in this struct, so the pair array can be uploaded to the
/// device as-is.
///
/// [`SoftBody`]: crate::body::SoftBody
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DistanceConstraint {
    pub a: u32,
    pub b: u32,
}

impl DistanceConstraint {
    #[inline]
    pub fn new(a: u32, b: u32) -> Self {
        Self { a, b }
    }

    /// Returns the pair with endpoints swapped.
    #[inline]
    pub fn reversed(self) -> Self {
        Self {
            a: self.b,
            b: self.a,
        }
    }

    /// Returns true if either endpoint is `particle`.
    #[inline]
    pub fn touches(self, particle: u32) -> bool {
        self.a == particle || self.b == particle
    }

    /// Distance between the endpoints in the given configuration.
    #[inline]
    pub fn length_in(self, positions: &[Vec3]) -> f32 {
        (positions[self.b as usize] - positions[self.a as usize]).length()
    }

    /// Stiffness-scaled positional correction for one endpoint pair.
    ///
    /// With `delta = p2 - p1` and `L = |delta|`, the correction magnitude is
    /// `c = (L - rest_length) * stiffness * dt`, split evenly: `p1` moves by
    /// `+0.5 c n` and `p2` by `-0.5 c n`, where `n = delta / L`.
    ///
    /// Returns `None` when the endpoints coincide: the direction is
    /// undefined and no correction is applied.
    #[inline]
    pub fn project(
        p1: Vec3,
        p2: Vec3,
        rest_length: f32,
        stiffness: f32,
        dt: f32,
    ) -> Option<(Vec3, Vec3)> {
        let delta = p2 - p1;
        let length = delta.length();
        // Also rejects NaN.
        if !(length > 0.0) {
            return None;
        }

        let correction = (length - rest_length) * stiffness * dt;
        let half = delta / length * (0.5 * correction);
        Some((half, -half))
    }
}

impl From<[u32; 2]> for DistanceConstraint {
    fn from([a, b]: [u32; 2]) -> Self {
        Self { a, b }
    }
}

impl From<DistanceConstraint> for [u32; 2] {
    fn from(c: DistanceConstraint) -> Self {
        [c.a, c.b]
    }
}
