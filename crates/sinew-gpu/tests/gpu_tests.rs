//! Integration tests for sinew-gpu.

use sinew_gpu::backend::{ComputeBackend, NullBackend};
use sinew_gpu::buffers::{pack_constraints, pack_positions, unpack_positions, BufferDesc, BufferTriple};
use sinew_gpu::capability::{DispatchOutcome, KernelManager};
use sinew_gpu::emulated::{EmulatedDevice, InvocationOrder};
use sinew_gpu::kernel::{DistanceParams, KernelSource};
use sinew_gpu::WgpuBackend;
use sinew_mesh::generators::{chain, disjoint_pairs};
use sinew_mesh::{SoftBody, Vec3};
use sinew_telemetry::{Diagnostics, EventKind, Severity, VecSink};
use sinew_types::SinewError;

fn upload_body(backend: &mut dyn ComputeBackend, body: &SoftBody) -> BufferTriple {
    let positions = backend
        .create_buffer(&BufferDesc::positions(body.particle_count()))
        .unwrap();
    let constraints = backend
        .create_buffer(&BufferDesc::constraints(body.constraint_count()))
        .unwrap();
    let rest_lengths = backend
        .create_buffer(&BufferDesc::rest_lengths(body.constraint_count()))
        .unwrap();

    backend
        .upload(positions, bytemuck::cast_slice(&pack_positions(body.positions())))
        .unwrap();
    backend
        .upload(constraints, bytemuck::cast_slice(&pack_constraints(body.constraints())))
        .unwrap();
    backend
        .upload(rest_lengths, bytemuck::cast_slice(body.rest_lengths()))
        .unwrap();

    BufferTriple {
        positions,
        constraints,
        rest_lengths,
        particle_count: body.particle_count() as u32,
        constraint_count: body.constraint_count() as u32,
    }
}

/// Runs one full dispatch + readback on `backend` and returns the positions.
fn relax_once(backend: &mut dyn ComputeBackend, body: &SoftBody, stiffness: f32, dt: f32) -> Vec<Vec3> {
    let mut diagnostics = Diagnostics::new();
    let manager = {
        let mut m = KernelManager::new(KernelSource::Embedded, 64);
        assert!(m.initialize(backend, &mut diagnostics));
        m
    };
    let triple = upload_body(backend, body);
    let params = DistanceParams::new(stiffness, dt, triple.constraint_count, triple.particle_count);
    let outcome = manager
        .dispatch_step(backend, Some(&triple), params, &mut diagnostics)
        .unwrap();
    assert!(matches!(outcome, DispatchOutcome::Submitted { .. }));

    let ticket = backend
        .schedule_readback(triple.positions, triple.positions_bytes())
        .unwrap();
    unpack_positions(&backend.complete_readback(ticket).unwrap())
}

fn stretched_pairs(count: usize) -> SoftBody {
    SoftBody::from_mesh(disjoint_pairs(count, 1.0).stretched(2.0)).unwrap()
}

// ─── Buffer Tests ─────────────────────────────────────────────

#[test]
fn buffer_desc_sizes() {
    assert_eq!(BufferDesc::positions(10).byte_size(), 160);
    assert_eq!(BufferDesc::constraints(10).byte_size(), 80);
    assert_eq!(BufferDesc::rest_lengths(10).byte_size(), 40);
}

#[test]
fn zero_sized_buffer_rejected() {
    let err = BufferDesc::positions(0).validate().unwrap_err();
    assert!(matches!(err, SinewError::BufferAllocation { .. }));
}

#[test]
fn positions_pack_to_vec4() {
    let packed = pack_positions(&[Vec3::new(1.0, 2.0, 3.0)]);
    assert_eq!(packed, vec![[1.0, 2.0, 3.0, 1.0]]);

    let bytes: &[u8] = bytemuck::cast_slice(&packed);
    assert_eq!(unpack_positions(bytes), vec![Vec3::new(1.0, 2.0, 3.0)]);
    // Trailing partial element ignored
    assert!(unpack_positions(&bytes[..12]).is_empty());
}

// ─── NullBackend Tests ───────────────────────────────────────

#[test]
fn null_backend_refuses_everything() {
    let mut backend = NullBackend::new();
    assert_eq!(backend.name(), "none");
    assert!(!backend.is_gpu());
    assert!(backend.compile_kernel(&KernelSource::Embedded, 64).is_err());
    assert!(backend.create_buffer(&BufferDesc::positions(4)).is_err());
}

// ─── KernelManager Tests ─────────────────────────────────────

#[test]
fn probe_is_idempotent() {
    let mut device = EmulatedDevice::new();
    let controls = device.controls();
    let mut diagnostics = Diagnostics::new();
    let mut manager = KernelManager::new(KernelSource::Embedded, 64);

    assert!(!manager.is_probed());
    assert!(manager.initialize(&mut device, &mut diagnostics));
    assert!(manager.initialize(&mut device, &mut diagnostics));
    assert!(manager.is_available());
    assert_eq!(manager.compile_requests(), 1);
    assert_eq!(controls.stats().kernels_compiled, 1);
}

#[test]
fn failed_probe_is_permanent_and_logged_once() {
    let mut device = EmulatedDevice::new();
    let controls = device.controls();
    let sink = VecSink::new();
    let log = sink.log();
    let mut diagnostics = Diagnostics::new();
    diagnostics.add_sink(Box::new(sink));

    controls.fail_compile(true);
    let mut manager = KernelManager::new(KernelSource::Embedded, 64);
    assert!(!manager.initialize(&mut device, &mut diagnostics));

    // Device recovers, but the decision stands.
    controls.fail_compile(false);
    assert!(!manager.initialize(&mut device, &mut diagnostics));
    assert_eq!(manager.compile_requests(), 1);

    diagnostics.flush();
    let unavailable = log
        .events()
        .iter()
        .filter(|e| matches!(e.kind, EventKind::KernelUnavailable { .. }))
        .count();
    assert_eq!(unavailable, 1);
    assert_eq!(log.count(Severity::Error), 1);
}

#[test]
fn missing_kernel_file_is_unavailable() {
    let mut device = EmulatedDevice::new();
    let mut diagnostics = Diagnostics::new();
    let source = KernelSource::File("/nonexistent/sinew/distance.wgsl".into());
    let mut manager = KernelManager::new(source, 64);
    assert!(!manager.initialize(&mut device, &mut diagnostics));
}

#[test]
fn oversized_workgroup_is_unavailable() {
    let mut device = EmulatedDevice::new();
    let mut diagnostics = Diagnostics::new();
    let mut manager = KernelManager::new(KernelSource::Embedded, 100_000);
    assert!(!manager.initialize(&mut device, &mut diagnostics));
}

#[test]
fn dispatch_without_buffers_is_skipped_and_warned_once() {
    let mut device = EmulatedDevice::new();
    let sink = VecSink::new();
    let log = sink.log();
    let mut diagnostics = Diagnostics::new();
    diagnostics.add_sink(Box::new(sink));

    let mut manager = KernelManager::new(KernelSource::Embedded, 64);
    assert!(manager.initialize(&mut device, &mut diagnostics));

    let params = DistanceParams::new(1.0, 1.0, 6, 4);
    for _ in 0..3 {
        let outcome = manager
            .dispatch_step(&mut device, None, params, &mut diagnostics)
            .unwrap();
        assert_eq!(outcome, DispatchOutcome::Skipped);
    }

    diagnostics.flush();
    assert_eq!(log.count(Severity::Warning), 1);
    assert!(log.any(|e| matches!(e.kind, EventKind::DispatchRejected { .. })));
}

#[test]
fn dispatch_before_probe_is_skipped() {
    let mut device = EmulatedDevice::new();
    let mut diagnostics = Diagnostics::new();
    let manager = KernelManager::new(KernelSource::Embedded, 64);
    let body = stretched_pairs(2);
    let triple = upload_body(&mut device, &body);
    let params = DistanceParams::new(1.0, 1.0, 2, 4);

    let outcome = manager
        .dispatch_step(&mut device, Some(&triple), params, &mut diagnostics)
        .unwrap();
    assert_eq!(outcome, DispatchOutcome::Skipped);
    assert_eq!(device.controls().stats().dispatches, 0);
}

#[test]
fn group_count_follows_workgroup_size() {
    let manager = KernelManager::new(KernelSource::Embedded, 32);
    assert_eq!(manager.group_count(0), 0);
    assert_eq!(manager.group_count(33), 2);
}

// ─── EmulatedDevice Tests ────────────────────────────────────

#[test]
fn emulated_solves_isolated_pairs_in_one_step() {
    let body = stretched_pairs(8);
    let mut device = EmulatedDevice::new();
    let out = relax_once(&mut device, &body, 1.0, 1.0);

    for c in body.constraints() {
        let len = c.length_in(&out);
        assert!((len - 1.0).abs() < 1e-5, "pair length {len}");
    }
}

#[test]
fn work_is_deferred_until_readback() {
    let body = stretched_pairs(1);
    let mut device = EmulatedDevice::new();
    let triple = upload_body(&mut device, &body);
    assert_eq!(device.pending_jobs(), 3);

    let ticket = device
        .schedule_readback(triple.positions, triple.positions_bytes())
        .unwrap();
    let bytes = device.complete_readback(ticket).unwrap();
    assert_eq!(device.pending_jobs(), 0);
    assert_eq!(unpack_positions(&bytes), body.positions());
}

#[test]
fn snapshot_order_differs_from_sequential_on_shared_particles() {
    let body = SoftBody::from_mesh(chain(5, 1.0).stretched(1.5)).unwrap();

    let mut snapshot = EmulatedDevice::with_order(InvocationOrder::Snapshot);
    let mut sequential = EmulatedDevice::with_order(InvocationOrder::Sequential);
    let a = relax_once(&mut snapshot, &body, 1.0, 1.0);
    let b = relax_once(&mut sequential, &body, 1.0, 1.0);

    assert_ne!(a, b);
    assert!(a.iter().chain(b.iter()).all(|p| p.is_finite()));
}

#[test]
fn injected_buffer_failure() {
    let mut device = EmulatedDevice::new();
    device.controls().fail_buffer("sinew.rest_lengths");

    assert!(device.create_buffer(&BufferDesc::positions(4)).is_ok());
    let err = device
        .create_buffer(&BufferDesc::rest_lengths(4))
        .unwrap_err();
    match err {
        SinewError::BufferAllocation { label, .. } => assert_eq!(label, "sinew.rest_lengths"),
        other => panic!("unexpected error: {other}"),
    }

    device.controls().clear_buffer_faults();
    assert!(device.create_buffer(&BufferDesc::rest_lengths(4)).is_ok());
}

#[test]
fn injected_readback_failure() {
    let body = stretched_pairs(1);
    let mut device = EmulatedDevice::new();
    let triple = upload_body(&mut device, &body);
    device.controls().fail_readback(true);

    let ticket = device
        .schedule_readback(triple.positions, triple.positions_bytes())
        .unwrap();
    assert!(matches!(
        device.complete_readback(ticket),
        Err(SinewError::Readback(_))
    ));
}

#[test]
fn injected_dispatch_failure_propagates() {
    let body = stretched_pairs(1);
    let mut device = EmulatedDevice::new();
    let mut diagnostics = Diagnostics::new();
    let mut manager = KernelManager::new(KernelSource::Embedded, 64);
    assert!(manager.initialize(&mut device, &mut diagnostics));
    let triple = upload_body(&mut device, &body);

    device.controls().fail_dispatch(true);
    let params = DistanceParams::new(1.0, 1.0, 1, 2);
    assert!(manager
        .dispatch_step(&mut device, Some(&triple), params, &mut diagnostics)
        .is_err());
}

#[test]
fn release_tracks_live_buffers() {
    let body = stretched_pairs(2);
    let mut device = EmulatedDevice::new();
    let controls = device.controls();
    let triple = upload_body(&mut device, &body);
    assert_eq!(controls.stats().live_buffers, 3);

    for handle in triple.handles() {
        device.release_buffer(handle);
    }
    // Double release is ignored
    device.release_buffer(triple.positions);
    assert_eq!(controls.stats().live_buffers, 0);
    assert_eq!(controls.stats().buffers_created, 3);
}

#[test]
fn oversized_upload_rejected() {
    let mut device = EmulatedDevice::new();
    let handle = device.create_buffer(&BufferDesc::rest_lengths(1)).unwrap();
    assert!(device.upload(handle, &[0u8; 8]).is_err());
}

// ─── wgpu Tests ──────────────────────────────────────────────

#[test]
fn wgpu_matches_emulated_on_isolated_pairs() {
    let mut gpu = match WgpuBackend::new() {
        Ok(backend) => backend,
        Err(e) => {
            eprintln!("skipping: {e}");
            return;
        }
    };

    let body = stretched_pairs(100);
    let on_gpu = relax_once(&mut gpu, &body, 0.8, 1.0);
    let emulated = relax_once(&mut EmulatedDevice::new(), &body, 0.8, 1.0);

    assert_eq!(on_gpu.len(), emulated.len());
    for (g, e) in on_gpu.iter().zip(&emulated) {
        assert!((*g - *e).length() < 1e-5, "gpu {g} vs emulated {e}");
    }
}

#[test]
fn wgpu_compiles_embedded_kernel_at_non_default_size() {
    let mut gpu = match WgpuBackend::new() {
        Ok(backend) => backend,
        Err(e) => {
            eprintln!("skipping: {e}");
            return;
        }
    };

    let mut diagnostics = Diagnostics::new();
    let mut manager = KernelManager::new(KernelSource::Embedded, 128);
    assert!(manager.initialize(&mut gpu, &mut diagnostics));
}
