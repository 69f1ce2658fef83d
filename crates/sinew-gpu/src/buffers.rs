//! Device buffer descriptors and host-side packing.
//!
//! Backends hand out opaque [`BufferHandle`]s; the solver never touches a
//! device allocation directly. Positions are stored as `vec4<f32>` on the
//! device (storage-buffer alignment for `vec3`), so they go through
//! [`pack_positions`] / [`unpack_positions`].

use glam::Vec3;
use sinew_mesh::DistanceConstraint;
use sinew_types::{SinewError, SinewResult};

/// Byte stride of one particle position on the device.
pub const POSITION_STRIDE: u64 = 16;
/// Byte stride of one constraint pair on the device.
pub const CONSTRAINT_STRIDE: u64 = 8;
/// Byte stride of one rest length on the device.
pub const REST_LENGTH_STRIDE: u64 = 4;

/// How a kernel accesses a storage buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferAccess {
    ReadWrite,
    ReadOnly,
}

/// Opaque identifier of a buffer owned by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferHandle(pub u32);

/// Buffer creation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferDesc {
    pub label: &'static str,
    pub element_count: u64,
    /// Bytes per element.
    pub stride: u64,
    pub access: BufferAccess,
    /// The host uploads into this buffer.
    pub upload_target: bool,
    /// The buffer is copied back to the host.
    pub readback_source: bool,
}

impl BufferDesc {
    /// Total size in bytes.
    #[inline]
    pub fn byte_size(&self) -> u64 {
        self.element_count * self.stride
    }

    /// Rejects zero-sized requests, which no backend can bind.
    pub fn validate(&self) -> SinewResult<()> {
        if self.byte_size() == 0 {
            return Err(SinewError::BufferAllocation {
                label: self.label.to_string(),
                reason: "zero-sized buffer".into(),
            });
        }
        Ok(())
    }

    /// Particle positions: read-write, uploaded, read back every step.
    pub fn positions(particle_count: usize) -> Self {
        Self {
            label: "sinew.positions",
            element_count: particle_count as u64,
            stride: POSITION_STRIDE,
            access: BufferAccess::ReadWrite,
            upload_target: true,
            readback_source: true,
        }
    }

    /// Constraint index pairs: read-only.
    pub fn constraints(constraint_count: usize) -> Self {
        Self {
            label: "sinew.constraints",
            element_count: constraint_count as u64,
            stride: CONSTRAINT_STRIDE,
            access: BufferAccess::ReadOnly,
            upload_target: true,
            readback_source: false,
        }
    }

    /// Cached rest lengths: read-only.
    pub fn rest_lengths(constraint_count: usize) -> Self {
        Self {
            label: "sinew.rest_lengths",
            element_count: constraint_count as u64,
            stride: REST_LENGTH_STRIDE,
            access: BufferAccess::ReadOnly,
            upload_target: true,
            readback_source: false,
        }
    }
}

/// The three persistent buffers the distance kernel binds.
///
/// Only ever constructed once all three exist, so holding a
/// `BufferTriple` means the set is complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferTriple {
    pub positions: BufferHandle,
    pub constraints: BufferHandle,
    pub rest_lengths: BufferHandle,
    pub particle_count: u32,
    pub constraint_count: u32,
}

impl BufferTriple {
    /// Byte length of the positions buffer.
    #[inline]
    pub fn positions_bytes(&self) -> u64 {
        self.particle_count as u64 * POSITION_STRIDE
    }

    /// Handles in binding order (positions, constraints, rest lengths).
    #[inline]
    pub fn handles(&self) -> [BufferHandle; 3] {
        [self.positions, self.constraints, self.rest_lengths]
    }
}

/// Expands positions to `[x, y, z, 1]` for upload.
pub fn pack_positions(positions: &[Vec3]) -> Vec<[f32; 4]> {
    positions.iter().map(|p| [p.x, p.y, p.z, 1.0]).collect()
}

/// Decodes read-back position bytes. Trailing partial elements are ignored.
pub fn unpack_positions(bytes: &[u8]) -> Vec<Vec3> {
    bytes
        .chunks_exact(POSITION_STRIDE as usize)
        .map(|chunk| {
            let v: [f32; 4] = bytemuck::pod_read_unaligned(chunk);
            Vec3::new(v[0], v[1], v[2])
        })
        .collect()
}

/// Flattens constraints to `[a, b]` pairs for upload.
pub fn pack_constraints(constraints: &[DistanceConstraint]) -> Vec<[u32; 2]> {
    constraints.iter().map(|&c| c.into()).collect()
}
