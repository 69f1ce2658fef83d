//! Procedural soft bodies for benchmarks and testing.
//!
//! Every generator returns mesh data at rest (`rest_positions ==
//! positions`); use [`MeshData::stretched`] to start from a strained state.

use glam::Vec3;

use crate::mesh::MeshData;

/// Four-particle tetrahedron with its six edges.
///
/// Vertices at (0,0,0), (1,0,0), (0,1,0), (0,0,2).
///
/// # Example
/// ```
/// use sinew_mesh::generators::tetrahedron;
/// let mesh = tetrahedron();
/// assert_eq!(mesh.particle_count(), 4);
/// assert_eq!(mesh.constraint_count(), 6);
/// ```
pub fn tetrahedron() -> MeshData {
    let positions = vec![
        Vec3::new(0.0, 0.0, 0.0),
        Vec3::new(1.0, 0.0, 0.0),
        Vec3::new(0.0, 1.0, 0.0),
        Vec3::new(0.0, 0.0, 2.0),
    ];
    let constraints = vec![[0, 1], [1, 2], [2, 0], [0, 3], [1, 3], [2, 3]];
    MeshData::at_rest(positions, constraints)
}

/// A straight strand of `count` particles along +X, each linked to the next.
pub fn chain(count: usize, spacing: f32) -> MeshData {
    let positions = (0..count)
        .map(|i| Vec3::new(i as f32 * spacing, 0.0, 0.0))
        .collect();
    let constraints = (1..count as u32).map(|i| [i - 1, i]).collect();
    MeshData::at_rest(positions, constraints)
}

/// `count` independent two-particle springs; no particle is shared.
///
/// Pair `i` spans particles `2i` and `2i + 1`, separated by `spacing`
/// along +Y. Pairs are laid out `3 * spacing` apart along +X.
pub fn disjoint_pairs(count: usize, spacing: f32) -> MeshData {
    let mut positions = Vec::with_capacity(count * 2);
    let mut constraints = Vec::with_capacity(count);
    for i in 0..count {
        let base = Vec3::new(i as f32 * 3.0 * spacing, 0.0, 0.0);
        positions.push(base);
        positions.push(base + Vec3::new(0.0, spacing, 0.0));
        let a = (i * 2) as u32;
        constraints.push([a, a + 1]);
    }
    MeshData::at_rest(positions, constraints)
}

/// Flat rectangular lattice in the XY plane.
///
/// `(cols + 1) * (rows + 1)` particles. Each quad contributes its top and
/// left edges plus one diagonal; the right and bottom borders close the
/// lattice.
///
/// # Example
/// ```
/// use sinew_mesh::generators::lattice;
/// let mesh = lattice(2, 2, 1.0);
/// assert_eq!(mesh.particle_count(), 9);
/// // 6 horizontal + 6 vertical + 4 diagonal
/// assert_eq!(mesh.constraint_count(), 16);
/// ```
pub fn lattice(cols: usize, rows: usize, spacing: f32) -> MeshData {
    let verts_x = cols + 1;
    let verts_y = rows + 1;
    let index = |i: usize, j: usize| (j * verts_x + i) as u32;

    let mut positions = Vec::with_capacity(verts_x * verts_y);
    for j in 0..verts_y {
        for i in 0..verts_x {
            positions.push(Vec3::new(i as f32 * spacing, -(j as f32) * spacing, 0.0));
        }
    }

    let mut constraints = Vec::new();
    for j in 0..verts_y {
        for i in 0..verts_x {
            if i + 1 < verts_x {
                constraints.push([index(i, j), index(i + 1, j)]);
            }
            if j + 1 < verts_y {
                constraints.push([index(i, j), index(i, j + 1)]);
            }
            if i + 1 < verts_x && j + 1 < verts_y {
                constraints.push([index(i, j), index(i + 1, j + 1)]);
            }
        }
    }

    MeshData::at_rest(positions, constraints)
}
