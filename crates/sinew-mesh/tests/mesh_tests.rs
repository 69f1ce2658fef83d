//! Integration tests for sinew-mesh.

use sinew_mesh::generators::{chain, disjoint_pairs, lattice, tetrahedron};
use sinew_mesh::{color_constraints, DistanceConstraint, MeshData, SoftBody, Vec3};

// ─── MeshData Tests ───────────────────────────────────────────

fn two_particles(distance: f32) -> MeshData {
    MeshData {
        positions: vec![Vec3::ZERO, Vec3::new(distance, 0.0, 0.0)],
        rest_positions: vec![Vec3::ZERO, Vec3::X],
        constraints: vec![[0, 1]],
    }
}

#[test]
fn validate_ok() {
    assert!(two_particles(2.0).validate().is_ok());
    assert!(tetrahedron().validate().is_ok());
}

#[test]
fn validate_catches_empty_positions() {
    let mesh = MeshData::default();
    assert!(mesh.validate().is_err());
}

#[test]
fn validate_catches_empty_rest_positions() {
    let mut mesh = two_particles(2.0);
    mesh.rest_positions.clear();
    assert!(mesh.validate().is_err());
}

#[test]
fn validate_catches_length_mismatch() {
    let mut mesh = two_particles(2.0);
    mesh.rest_positions.push(Vec3::Y);
    assert!(mesh.validate().is_err());
}

#[test]
fn validate_catches_oob_index() {
    let mut mesh = two_particles(2.0);
    mesh.constraints.push([1, 2]);
    assert!(mesh.validate().is_err());
}

#[test]
fn validate_catches_self_constraint() {
    let mut mesh = two_particles(2.0);
    mesh.constraints.push([1, 1]);
    assert!(mesh.validate().is_err());
}

#[test]
fn validate_catches_nan() {
    let mut mesh = two_particles(2.0);
    mesh.positions[1].y = f32::NAN;
    assert!(mesh.validate().is_err());
}

#[test]
fn flat_indices() {
    let mesh = MeshData::from_flat_indices(
        vec![Vec3::ZERO, Vec3::X, Vec3::Y],
        vec![Vec3::ZERO, Vec3::X, Vec3::Y],
        &[0, 1, 1, 2],
    )
    .unwrap();
    assert_eq!(mesh.constraints, vec![[0, 1], [1, 2]]);
}

#[test]
fn flat_indices_odd_length_rejected() {
    let result = MeshData::from_flat_indices(vec![Vec3::ZERO], vec![Vec3::ZERO], &[0, 1, 2]);
    assert!(result.is_err());
}

#[test]
fn stretched_keeps_rest_configuration() {
    let mesh = chain(3, 1.0);
    let stretched = mesh.stretched(2.0);
    assert_eq!(stretched.rest_positions, mesh.rest_positions);
    // Centroid of the chain is x = 1; endpoints move to -1 and 3
    assert!((stretched.positions[0].x + 1.0).abs() < 1e-6);
    assert!((stretched.positions[2].x - 3.0).abs() < 1e-6);
}

#[test]
fn mesh_serialization() {
    let mesh = tetrahedron();
    let json = serde_json::to_string(&mesh).unwrap();
    let recovered: MeshData = serde_json::from_str(&json).unwrap();
    assert_eq!(recovered, mesh);
}

#[test]
fn missing_rest_positions_fail_validation() {
    let json = r#"{ "positions": [[0,0,0],[1,0,0]], "constraints": [[0,1]] }"#;
    let mesh: MeshData = serde_json::from_str(json).unwrap();
    assert!(mesh.rest_positions.is_empty());
    assert!(mesh.validate().is_err());
}

// ─── SoftBody Tests ───────────────────────────────────────────

#[test]
fn body_caches_rest_lengths_from_rest_configuration() {
    let body = SoftBody::from_mesh(two_particles(2.0)).unwrap();
    assert_eq!(body.particle_count(), 2);
    assert_eq!(body.constraint_count(), 1);
    assert!((body.rest_lengths()[0] - 1.0).abs() < 1e-6);
    assert!((body.constraint_error(0) - 1.0).abs() < 1e-6);
}

#[test]
fn body_rejects_invalid_mesh() {
    assert!(SoftBody::from_mesh(MeshData::default()).is_err());
}

#[test]
fn tetrahedron_rest_lengths() {
    let body = SoftBody::from_mesh(tetrahedron()).unwrap();
    let expected = [1.0, 2.0f32.sqrt(), 1.0, 2.0, 5.0f32.sqrt(), 5.0f32.sqrt()];
    for (got, want) in body.rest_lengths().iter().zip(expected) {
        assert!((got - want).abs() < 1e-6, "got {got}, want {want}");
    }
    assert_eq!(body.max_constraint_error(), 0.0);
}

#[test]
fn rest_lengths_do_not_follow_positions() {
    let mut body = SoftBody::from_mesh(tetrahedron()).unwrap();
    body.positions_mut()[3] = Vec3::new(0.0, 0.0, 10.0);
    assert!((body.rest_lengths()[3] - 2.0).abs() < 1e-6);
}

#[test]
fn shared_vertex_detection() {
    assert!(SoftBody::from_mesh(tetrahedron()).unwrap().has_shared_vertices());
    assert!(!SoftBody::from_mesh(disjoint_pairs(8, 1.0)).unwrap().has_shared_vertices());
}

// ─── DistanceConstraint Tests ─────────────────────────────────

#[test]
fn project_stretched_pair() {
    let (d1, d2) =
        DistanceConstraint::project(Vec3::ZERO, Vec3::new(2.0, 0.0, 0.0), 1.0, 1.0, 1.0).unwrap();
    assert_eq!(d1, Vec3::new(0.5, 0.0, 0.0));
    assert_eq!(d2, Vec3::new(-0.5, 0.0, 0.0));
}

#[test]
fn project_compressed_pair_pushes_apart() {
    let (d1, d2) =
        DistanceConstraint::project(Vec3::ZERO, Vec3::new(0.5, 0.0, 0.0), 1.0, 1.0, 1.0).unwrap();
    assert!(d1.x < 0.0);
    assert!(d2.x > 0.0);
}

#[test]
fn project_coincident_is_none() {
    assert!(DistanceConstraint::project(Vec3::ONE, Vec3::ONE, 1.0, 1.0, 1.0).is_none());
}

#[test]
fn reversed_pair() {
    let c = DistanceConstraint::new(3, 5);
    assert_eq!(c.reversed(), DistanceConstraint::new(5, 3));
    assert!(c.touches(5));
    assert!(!c.touches(4));
}

// ─── Generator Tests ──────────────────────────────────────────

#[test]
fn chain_counts() {
    let mesh = chain(5, 0.5);
    assert_eq!(mesh.particle_count(), 5);
    assert_eq!(mesh.constraint_count(), 4);
}

#[test]
fn chain_of_one_has_no_constraints() {
    let mesh = chain(1, 1.0);
    assert_eq!(mesh.constraint_count(), 0);
    assert!(mesh.validate().is_ok());
}

#[test]
fn lattice_counts() {
    let mesh = lattice(3, 2, 0.1);
    assert_eq!(mesh.particle_count(), 12);
    // 3*3 horizontal + 4*2 vertical + 3*2 diagonal
    assert_eq!(mesh.constraint_count(), 23);
    assert!(mesh.validate().is_ok());
}

// ─── Coloring Tests ───────────────────────────────────────────

fn assert_batches_independent(mesh: &MeshData) {
    let body = SoftBody::from_mesh(mesh.clone()).unwrap();
    let batches = color_constraints(body.constraints(), body.particle_count());

    assert_eq!(batches.order.len(), body.constraint_count());
    for range in batches.ranges() {
        let mut used = vec![false; body.particle_count()];
        for &ci in &batches.order[range] {
            let c = body.constraints()[ci as usize];
            assert!(!used[c.a as usize] && !used[c.b as usize]);
            used[c.a as usize] = true;
            used[c.b as usize] = true;
        }
    }
}

#[test]
fn coloring_tetrahedron() {
    assert_batches_independent(&tetrahedron());
    let body = SoftBody::from_mesh(tetrahedron()).unwrap();
    let batches = color_constraints(body.constraints(), body.particle_count());
    // K4 edges need exactly 3 colors
    assert_eq!(batches.batch_count(), 3);
}

#[test]
fn coloring_lattice() {
    assert_batches_independent(&lattice(6, 4, 1.0));
}

#[test]
fn coloring_disjoint_is_single_batch() {
    let body = SoftBody::from_mesh(disjoint_pairs(10, 1.0)).unwrap();
    let batches = color_constraints(body.constraints(), body.particle_count());
    assert_eq!(batches.batch_count(), 1);
    assert_eq!(batches.batch_range(0), 0..10);
}

#[test]
fn coloring_empty() {
    let batches = color_constraints(&[], 4);
    assert_eq!(batches.batch_count(), 0);
    assert!(batches.order.is_empty());
}
