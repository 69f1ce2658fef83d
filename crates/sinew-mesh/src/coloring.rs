//! Graph coloring for race-free batched dispatch.
//!
//! A concurrent dispatch over all constraints races whenever two
//! constraints share a particle. Coloring groups constraints into batches
//! in which no two members share a particle; dispatching one batch at a
//! time removes the race at the cost of one dispatch per color.

use crate::constraint::DistanceConstraint;

/// Constraints reordered so each color batch is contiguous.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstraintBatches {
    /// Original constraint indices, grouped by color.
    pub order: Vec<u32>,
    /// `order[offsets[k]..offsets[k + 1]]` is batch `k`.
    pub offsets: Vec<usize>,
}

impl ConstraintBatches {
    /// Returns the number of batches.
    #[inline]
    pub fn batch_count(&self) -> usize {
        self.offsets.len().saturating_sub(1)
    }

    /// Returns the index range of batch `k` within `order`.
    #[inline]
    pub fn batch_range(&self, k: usize) -> std::ops::Range<usize> {
        self.offsets[k]..self.offsets[k + 1]
    }

    /// Iterates over the batch ranges in color order.
    pub fn ranges(&self) -> impl Iterator<Item = std::ops::Range<usize>> + '_ {
        self.offsets.windows(2).map(|w| w[0]..w[1])
    }
}

/// Greedily colors `constraints` so that constraints sharing a particle get
/// different colors.
///
/// Constraints are visited in list order; each takes the lowest color not
/// used by an already-colored neighbor. Within a batch the original list
/// order is preserved.
pub fn color_constraints(
    constraints: &[DistanceConstraint],
    particle_count: usize,
) -> ConstraintBatches {
    if constraints.is_empty() {
        return ConstraintBatches {
            order: Vec::new(),
            offsets: vec![0],
        };
    }

    // Particle -> constraints touching it
    let mut particle_to_constraints: Vec<Vec<usize>> = vec![Vec::new(); particle_count];
    for (ci, c) in constraints.iter().enumerate() {
        particle_to_constraints[c.a as usize].push(ci);
        particle_to_constraints[c.b as usize].push(ci);
    }

    let mut colors: Vec<usize> = vec![usize::MAX; constraints.len()];
    // stamp[color] == ci marks `color` as taken while coloring constraint ci
    let mut stamp: Vec<usize> = Vec::new();
    let mut max_color = 0;

    for (ci, c) in constraints.iter().enumerate() {
        for p in [c.a as usize, c.b as usize] {
            for &neighbor in &particle_to_constraints[p] {
                let color = colors[neighbor];
                if color == usize::MAX {
                    continue;
                }
                if color >= stamp.len() {
                    stamp.resize(color + 1, usize::MAX);
                }
                stamp[color] = ci;
            }
        }

        let color = (0..)
            .find(|&k| stamp.get(k).map_or(true, |&s| s != ci))
            .unwrap_or(0);
        colors[ci] = color;
        max_color = max_color.max(color);
    }

    let mut batches: Vec<Vec<u32>> = vec![Vec::new(); max_color + 1];
    for (ci, &color) in colors.iter().enumerate() {
        batches[color].push(ci as u32);
    }

    let mut order = Vec::with_capacity(constraints.len());
    let mut offsets = vec![0usize];
    for batch in &batches {
        order.extend_from_slice(batch);
        offsets.push(order.len());
    }

    ConstraintBatches { order, offsets }
}
