//! GPU execution path: persistent device buffers, dispatch and readback.
//!
//! The three buffers (positions, constraints, rest lengths) are created
//! once and reused every step. Within a step the order is: re-upload of
//! host positions if the host wrote them, dispatch, readback. With
//! [`ReadbackMode::Pipelined`] the readback of step N is completed at the
//! start of step N+1, so it always finishes before the buffers are reused.

use sinew_gpu::buffers::{pack_constraints, pack_positions, unpack_positions};
use sinew_gpu::{
    BufferDesc, BufferTriple, ComputeBackend, DispatchOutcome, DistanceParams, KernelManager,
    ReadbackTicket,
};
use sinew_mesh::{color_constraints, ConstraintBatches, SoftBody};
use sinew_telemetry::{Diagnostics, EventKind, Severity};
use sinew_types::{SinewError, SinewResult};

use crate::config::{DispatchMode, ReadbackMode, SolverConfig};
use crate::strategy::{ExecutionPath, ExecutionStrategy, SkipReason, StepOutcome};

const RESOURCES_UNAVAILABLE: &str = "resources_unavailable";
const DISPATCH_FAILED: &str = "dispatch_failed";
const READBACK_FAILED: &str = "readback_failed";

/// Owns the compute backend and every device resource of one solver.
pub struct GpuRelaxation {
    backend: Box<dyn ComputeBackend>,
    kernels: KernelManager,
    dispatch_mode: DispatchMode,
    readback_mode: ReadbackMode,
    resources: Option<BufferTriple>,
    /// Color batches, present in [`DispatchMode::Colored`]. The device
    /// constraint buffer is stored in `batches.order`.
    batches: Option<ConstraintBatches>,
    pending: Option<ReadbackTicket>,
    /// Host positions changed since the last upload.
    host_dirty: bool,
}

impl GpuRelaxation {
    pub fn new(backend: Box<dyn ComputeBackend>, config: &SolverConfig) -> Self {
        Self {
            backend,
            kernels: KernelManager::new(config.kernel_source(), config.workgroup_size),
            dispatch_mode: config.dispatch_mode,
            readback_mode: config.readback_mode,
            resources: None,
            batches: None,
            pending: None,
            host_dirty: false,
        }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Runs the one-time capability probe. See [`KernelManager::initialize`].
    pub fn probe(&mut self, diagnostics: &mut Diagnostics) -> bool {
        self.kernels.initialize(self.backend.as_mut(), diagnostics)
    }

    #[inline]
    pub fn is_available(&self) -> bool {
        self.kernels.is_available()
    }

    /// The buffer triple, if the kernel is usable and every buffer exists.
    #[inline]
    fn ready_resources(&self) -> Option<BufferTriple> {
        self.resources.filter(|_| self.kernels.is_available())
    }

    /// Returns true if a step can be dispatched.
    #[inline]
    pub fn resources_ready(&self) -> bool {
        self.ready_resources().is_some()
    }

    #[inline]
    pub fn has_pending_readback(&self) -> bool {
        self.pending.is_some()
    }

    /// Dispatches per step: one, or the number of colors.
    pub fn batch_count(&self) -> usize {
        self.batches.as_ref().map_or(1, ConstraintBatches::batch_count)
    }

    /// Creates the buffer triple and uploads `body`.
    ///
    /// Any existing triple is released first. On failure everything
    /// created so far is released, an error diagnostic is emitted and the
    /// solver is left without resources.
    pub fn setup_buffers(&mut self, body: &SoftBody, diagnostics: &mut Diagnostics) -> bool {
        self.release();
        if !self.kernels.is_available() {
            return false;
        }

        self.batches = match self.dispatch_mode {
            DispatchMode::Colored => Some(color_constraints(body.constraints(), body.particle_count())),
            DispatchMode::Concurrent => None,
        };

        match self.create_triple(body) {
            Ok(triple) => {
                self.resources = Some(triple);
                self.host_dirty = false;
                diagnostics.rearm(RESOURCES_UNAVAILABLE);
                diagnostics.info(EventKind::BuffersReady {
                    positions: triple.particle_count,
                    constraints: triple.constraint_count,
                });
                tracing::debug!(
                    particles = triple.particle_count,
                    constraints = triple.constraint_count,
                    batches = self.batch_count(),
                    "device buffers ready"
                );
                true
            }
            Err(e) => {
                let (label, reason) = match e {
                    SinewError::BufferAllocation { label, reason } => (label, reason),
                    other => ("upload".to_string(), other.to_string()),
                };
                diagnostics.error(EventKind::BufferAllocationFailed { label, reason });
                false
            }
        }
    }

    fn create_triple(&mut self, body: &SoftBody) -> SinewResult<BufferTriple> {
        let descs = [
            BufferDesc::positions(body.particle_count()),
            BufferDesc::constraints(body.constraint_count()),
            BufferDesc::rest_lengths(body.constraint_count()),
        ];

        let mut handles = Vec::with_capacity(descs.len());
        for desc in &descs {
            match self.backend.create_buffer(desc) {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    for handle in handles {
                        self.backend.release_buffer(handle);
                    }
                    return Err(e);
                }
            }
        }

        let triple = BufferTriple {
            positions: handles[0],
            constraints: handles[1],
            rest_lengths: handles[2],
            particle_count: body.particle_count() as u32,
            constraint_count: body.constraint_count() as u32,
        };
        if let Err(e) = self.upload_all(&triple, body) {
            for handle in triple.handles() {
                self.backend.release_buffer(handle);
            }
            return Err(e);
        }
        Ok(triple)
    }

    fn upload_all(&mut self, triple: &BufferTriple, body: &SoftBody) -> SinewResult<()> {
        let (pairs, rest_lengths): (Vec<[u32; 2]>, Vec<f32>) = match &self.batches {
            Some(batches) => batches
                .order
                .iter()
                .map(|&i| {
                    let i = i as usize;
                    (<[u32; 2]>::from(body.constraints()[i]), body.rest_lengths()[i])
                })
                .unzip(),
            None => (pack_constraints(body.constraints()), body.rest_lengths().to_vec()),
        };

        self.backend.upload(
            triple.positions,
            bytemuck::cast_slice(&pack_positions(body.positions())),
        )?;
        self.backend
            .upload(triple.constraints, bytemuck::cast_slice(&pairs))?;
        self.backend
            .upload(triple.rest_lengths, bytemuck::cast_slice(&rest_lengths))?;
        Ok(())
    }

    /// Releases the buffer triple. A pending readback is drained first so
    /// no copy is in flight when its source is freed.
    pub fn release(&mut self) {
        if let Some(ticket) = self.pending.take() {
            let _ = self.backend.complete_readback(ticket);
        }
        if let Some(triple) = self.resources.take() {
            for handle in triple.handles() {
                self.backend.release_buffer(handle);
            }
        }
        self.batches = None;
    }

    /// Tears down and recreates the buffer triple from `body`.
    pub fn rebuild(&mut self, body: &SoftBody, diagnostics: &mut Diagnostics) -> bool {
        self.setup_buffers(body, diagnostics)
    }

    /// The next step re-uploads host positions before dispatching.
    pub fn mark_host_dirty(&mut self) {
        self.host_dirty = true;
    }

    /// Completes a pending readback into `body`. Returns false if it failed.
    pub fn flush(&mut self, body: &mut SoftBody, diagnostics: &mut Diagnostics) -> bool {
        match self.pending.take() {
            Some(ticket) => self.finish_readback(ticket, body, diagnostics),
            None => true,
        }
    }

    fn finish_readback(
        &mut self,
        ticket: ReadbackTicket,
        body: &mut SoftBody,
        diagnostics: &mut Diagnostics,
    ) -> bool {
        let bytes = match self.backend.complete_readback(ticket) {
            Ok(bytes) => bytes,
            Err(e) => {
                self.readback_failed(e.to_string(), diagnostics);
                return false;
            }
        };
        // Host writes made since the dispatch win over device results.
        if self.host_dirty {
            return true;
        }

        let positions = unpack_positions(&bytes);
        if positions.len() != body.particle_count() {
            self.readback_failed(
                format!(
                    "read back {} positions, expected {}",
                    positions.len(),
                    body.particle_count()
                ),
                diagnostics,
            );
            return false;
        }
        body.overwrite_positions(&positions);
        true
    }

    fn readback_failed(&mut self, reason: String, diagnostics: &mut Diagnostics) {
        // Device and host disagree now; the host copy is authoritative.
        self.host_dirty = true;
        diagnostics.emit_once(READBACK_FAILED, Severity::Error, || EventKind::ReadbackFailed {
            reason,
        });
    }

    fn dispatch_failed(&mut self, reason: String, diagnostics: &mut Diagnostics) -> StepOutcome {
        self.host_dirty = true;
        diagnostics.emit_once(DISPATCH_FAILED, Severity::Error, || EventKind::DispatchRejected {
            reason,
        });
        StepOutcome::Skipped(SkipReason::DispatchFailed)
    }
}

impl ExecutionStrategy for GpuRelaxation {
    fn step(
        &mut self,
        body: &mut SoftBody,
        stiffness: f32,
        dt: f32,
        diagnostics: &mut Diagnostics,
    ) -> StepOutcome {
        // Previous step's results land before this step reuses the buffers.
        if let Some(ticket) = self.pending.take() {
            self.finish_readback(ticket, body, diagnostics);
        }

        let Some(triple) = self.ready_resources() else {
            diagnostics.emit_once(RESOURCES_UNAVAILABLE, Severity::Error, || EventKind::StepSkipped {
                reason: "device buffers unavailable until rebuilt".into(),
            });
            return StepOutcome::Skipped(SkipReason::ResourcesUnavailable);
        };

        if self.host_dirty {
            let packed = pack_positions(body.positions());
            if let Err(e) = self
                .backend
                .upload(triple.positions, bytemuck::cast_slice(&packed))
            {
                return self.dispatch_failed(e.to_string(), diagnostics);
            }
            self.host_dirty = false;
        }

        let base = DistanceParams::new(stiffness, dt, triple.constraint_count, triple.particle_count);
        let ranges: Vec<std::ops::Range<usize>> = match &self.batches {
            Some(batches) => batches.ranges().collect(),
            None => vec![0..triple.constraint_count as usize],
        };

        let (mut groups, mut batches) = (0, 0);
        for range in ranges {
            let params = base.with_range(range.start as u32, range.len() as u32);
            match self
                .kernels
                .dispatch_step(self.backend.as_mut(), Some(&triple), params, diagnostics)
            {
                Ok(DispatchOutcome::Submitted { groups: g }) => {
                    groups += g;
                    batches += 1;
                }
                Ok(DispatchOutcome::Skipped) => {}
                Err(e) => return self.dispatch_failed(e.to_string(), diagnostics),
            }
        }
        diagnostics.emit_once("dispatch_issued", Severity::Info, || EventKind::DispatchIssued {
            constraints: triple.constraint_count,
            groups,
            batches,
        });

        let ticket = match self
            .backend
            .schedule_readback(triple.positions, triple.positions_bytes())
        {
            Ok(ticket) => ticket,
            Err(e) => {
                self.readback_failed(e.to_string(), diagnostics);
                return StepOutcome::Skipped(SkipReason::ReadbackFailed);
            }
        };

        match self.readback_mode {
            ReadbackMode::Blocking => {
                if !self.finish_readback(ticket, body, diagnostics) {
                    return StepOutcome::Skipped(SkipReason::ReadbackFailed);
                }
            }
            ReadbackMode::Pipelined => self.pending = Some(ticket),
        }

        diagnostics.rearm(DISPATCH_FAILED);
        diagnostics.rearm(READBACK_FAILED);
        StepOutcome::Dispatched { groups, batches }
    }

    fn path(&self) -> ExecutionPath {
        ExecutionPath::Gpu
    }

    fn name(&self) -> &str {
        "gpu_relaxation"
    }
}

impl Drop for GpuRelaxation {
    fn drop(&mut self) {
        self.release();
    }
}
