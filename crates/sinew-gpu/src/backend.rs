//! Compute backend trait and the device-less fallback.
//!
//! The [`ComputeBackend`] trait is the solver's only view of a device. It
//! models an asynchronous job queue: uploads, dispatches and readback
//! copies are enqueued and may complete later. The two explicit blocking
//! points are [`ComputeBackend::compile_kernel`] and
//! [`ComputeBackend::complete_readback`].

use sinew_types::{SinewError, SinewResult};

use crate::buffers::{BufferDesc, BufferHandle, BufferTriple};
use crate::kernel::{DistanceParams, KernelHandle, KernelSource};

/// One kernel invocation request.
#[derive(Debug, Clone, Copy)]
pub struct DispatchRequest<'a> {
    pub kernel: KernelHandle,
    pub buffers: &'a BufferTriple,
    pub params: DistanceParams,
    pub group_count: u32,
}

/// Receipt for a scheduled readback copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReadbackTicket {
    pub id: u64,
    pub byte_len: u64,
}

/// Trait for compute backends.
///
/// # Ordering
///
/// Work is executed in submission order: an upload enqueued before a
/// dispatch is visible to it, and a readback scheduled after a dispatch
/// observes its writes.
///
/// # Implementations
/// - [`WgpuBackend`](crate::WgpuBackend): GPU compute via wgpu
/// - [`EmulatedDevice`](crate::EmulatedDevice): CPU-executed queue for tests
/// - [`NullBackend`]: No device
pub trait ComputeBackend: Send {
    /// Returns the backend name (e.g., "wgpu", "emulated").
    fn name(&self) -> &str;

    /// Returns true if work runs on a real accelerator.
    fn is_gpu(&self) -> bool;

    /// Compiles the distance kernel. Blocks until compilation finishes.
    fn compile_kernel(
        &mut self,
        source: &KernelSource,
        workgroup_size: u32,
    ) -> SinewResult<KernelHandle>;

    /// Creates a device buffer.
    fn create_buffer(&mut self, desc: &BufferDesc) -> SinewResult<BufferHandle>;

    /// Enqueues a host-to-device copy into the start of `buffer`.
    fn upload(&mut self, buffer: BufferHandle, bytes: &[u8]) -> SinewResult<()>;

    /// Enqueues one kernel dispatch.
    fn dispatch(&mut self, request: &DispatchRequest<'_>) -> SinewResult<()>;

    /// Enqueues a copy of the first `byte_len` bytes of `buffer` to
    /// host-visible memory.
    fn schedule_readback(
        &mut self,
        buffer: BufferHandle,
        byte_len: u64,
    ) -> SinewResult<ReadbackTicket>;

    /// Blocks until the device has finished all prior work, then returns
    /// the bytes captured by `ticket`.
    fn complete_readback(&mut self, ticket: ReadbackTicket) -> SinewResult<Vec<u8>>;

    /// Frees a buffer. Unknown handles are ignored.
    fn release_buffer(&mut self, buffer: BufferHandle);
}

/// Backend for hosts without a compute device.
///
/// Every kernel probe fails, so a solver using it runs on the CPU path.
pub struct NullBackend {
    _private: (),
}

impl NullBackend {
    pub fn new() -> Self {
        Self { _private: () }
    }
}

impl Default for NullBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ComputeBackend for NullBackend {
    fn name(&self) -> &str {
        "none"
    }

    fn is_gpu(&self) -> bool {
        false
    }

    fn compile_kernel(&mut self, _source: &KernelSource, _workgroup_size: u32) -> SinewResult<KernelHandle> {
        Err(SinewError::KernelUnavailable("no compute device".into()))
    }

    fn create_buffer(&mut self, desc: &BufferDesc) -> SinewResult<BufferHandle> {
        Err(SinewError::BufferAllocation {
            label: desc.label.to_string(),
            reason: "no compute device".into(),
        })
    }

    fn upload(&mut self, _buffer: BufferHandle, _bytes: &[u8]) -> SinewResult<()> {
        Err(SinewError::Gpu("no compute device".into()))
    }

    fn dispatch(&mut self, _request: &DispatchRequest<'_>) -> SinewResult<()> {
        Err(SinewError::Gpu("no compute device".into()))
    }

    fn schedule_readback(&mut self, _buffer: BufferHandle, _byte_len: u64) -> SinewResult<ReadbackTicket> {
        Err(SinewError::Readback("no compute device".into()))
    }

    fn complete_readback(&mut self, _ticket: ReadbackTicket) -> SinewResult<Vec<u8>> {
        Err(SinewError::Readback("no compute device".into()))
    }

    fn release_buffer(&mut self, _buffer: BufferHandle) {}
}
