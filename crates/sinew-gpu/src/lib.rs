//! # sinew-gpu
//!
//! Compute abstraction layer for the Sinew solver.
//!
//! Provides a [`ComputeBackend`] trait (buffer creation, upload, dispatch,
//! readback, kernel compilation) with three implementations:
//! - [`WgpuBackend`]: GPU compute via wgpu
//! - [`EmulatedDevice`]: CPU-executed device queue with fault injection
//! - [`NullBackend`]: No device; every kernel probe fails
//!
//! [`KernelManager`] probes kernel availability once and issues dispatches.

pub mod backend;
pub mod buffers;
pub mod capability;
pub mod emulated;
pub mod kernel;
pub mod wgpu_backend;

pub use backend::{ComputeBackend, DispatchRequest, NullBackend, ReadbackTicket};
pub use buffers::{BufferAccess, BufferDesc, BufferHandle, BufferTriple};
pub use capability::{DispatchOutcome, KernelManager};
pub use emulated::{DeviceControls, DeviceStats, EmulatedDevice, InvocationOrder};
pub use kernel::{DistanceParams, KernelHandle, KernelSource};
pub use wgpu_backend::WgpuBackend;

/// Returns a wgpu backend if an adapter is available, otherwise a
/// [`NullBackend`] so the solver falls back to the CPU path.
pub fn default_backend() -> Box<dyn ComputeBackend> {
    match WgpuBackend::new() {
        Ok(backend) => Box::new(backend),
        Err(e) => {
            tracing::warn!(error = %e, "no GPU adapter; compute backend disabled");
            Box::new(NullBackend::new())
        }
    }
}
