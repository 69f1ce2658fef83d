//! The solver façade and its lifecycle.
//!
//! ```text
//! Uninitialized --initialize(valid)--> Initializing --probe + buffers--> Ready(Gpu)
//!       |                                    |
//!       +--initialize(invalid): stays        +--otherwise--> Ready(Cpu)
//! ```
//!
//! `solve` never changes state. The path chosen at initialization is kept
//! for the solver's lifetime; a failing GPU step is skipped, not retried on
//! the CPU.
//!
//! With the default [`BufferFailurePolicy::SkipStep`], a failed buffer setup
//! still ends in `Ready(Gpu)`: the GPU path is selected but has no device
//! resources, and every step is skipped until
//! [`MuscleSolver::rebuild_device_resources`] succeeds. Check
//! [`MuscleSolver::resources_ready`] to tell the two apart.
//! [`BufferFailurePolicy::FallbackToCpu`] ends in `Ready(Cpu)` instead.

use std::time::Instant;

use glam::Vec3;
use sinew_gpu::{ComputeBackend, NullBackend};
use sinew_mesh::{DistanceConstraint, MeshData, SoftBody};
use sinew_telemetry::{Diagnostics, EventKind, EventSink, Severity};
use sinew_types::{SinewError, SinewResult};

use crate::config::{BufferFailurePolicy, SolverConfig};
use crate::cpu::CpuRelaxation;
use crate::gpu::GpuRelaxation;
use crate::strategy::{ExecutionPath, ExecutionStrategy, SkipReason, StepOutcome, StepResult};

/// Lifecycle state of a [`MuscleSolver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverState {
    Uninitialized,
    /// Capability probe and buffer setup in progress.
    Initializing,
    /// Path selected. `Ready(Gpu)` does not imply device buffers exist; see
    /// [`MuscleSolver::resources_ready`].
    Ready(ExecutionPath),
}

/// Distance-constraint solver for one soft body.
///
/// ```text
/// let mut solver = MuscleSolver::new(config, backend);
/// solver.initialize(mesh)?;
/// loop {
///     solver.solve(dt);
/// }
/// ```
pub struct MuscleSolver {
    config: SolverConfig,
    state: SolverState,
    body: Option<SoftBody>,
    cpu: CpuRelaxation,
    gpu: GpuRelaxation,
    diagnostics: Diagnostics,
    steps: u64,
}

impl MuscleSolver {
    /// Creates an uninitialized solver. Diagnostics go to `tracing`.
    pub fn new(config: SolverConfig, backend: Box<dyn ComputeBackend>) -> Self {
        let gpu = GpuRelaxation::new(backend, &config);
        Self {
            config,
            state: SolverState::Uninitialized,
            body: None,
            cpu: CpuRelaxation::new(),
            gpu,
            diagnostics: Diagnostics::with_tracing(),
            steps: 0,
        }
    }

    /// A solver that always runs on the CPU.
    pub fn cpu_only(config: SolverConfig) -> Self {
        Self::new(
            SolverConfig {
                prefer_gpu: false,
                ..config
            },
            Box::new(NullBackend::new()),
        )
    }

    /// Registers an additional diagnostics sink.
    pub fn add_sink(&mut self, sink: Box<dyn EventSink>) {
        self.diagnostics.add_sink(sink);
    }

    /// Validates `mesh`, probes the compute backend and selects a path.
    ///
    /// Malformed input leaves the solver uninitialized and emits an error
    /// diagnostic. May only succeed once.
    pub fn initialize(&mut self, mesh: MeshData) -> SinewResult<ExecutionPath> {
        let result = self.try_initialize(mesh);
        if let Err(e) = &result {
            self.diagnostics.error(EventKind::InvalidInput {
                reason: e.to_string(),
            });
        }
        self.diagnostics.flush();
        result
    }

    fn try_initialize(&mut self, mesh: MeshData) -> SinewResult<ExecutionPath> {
        if self.state != SolverState::Uninitialized {
            return Err(SinewError::InvalidConfig("solver already initialized".into()));
        }
        self.config.validate()?;
        let body = SoftBody::from_mesh(mesh)?;

        self.state = SolverState::Initializing;
        let path = self.select_path(&body);
        self.diagnostics.info(EventKind::Initialized {
            particles: body.particle_count() as u32,
            constraints: body.constraint_count() as u32,
            path: path.to_string(),
        });
        tracing::info!(
            particles = body.particle_count(),
            constraints = body.constraint_count(),
            %path,
            backend = self.gpu.backend_name(),
            "solver initialized"
        );

        self.body = Some(body);
        self.state = SolverState::Ready(path);
        Ok(path)
    }

    fn select_path(&mut self, body: &SoftBody) -> ExecutionPath {
        let cpu = |diagnostics: &mut Diagnostics, reason: &str| {
            diagnostics.info(EventKind::CpuPathSelected {
                reason: reason.to_string(),
            });
            ExecutionPath::Cpu
        };

        if !self.config.prefer_gpu {
            return cpu(&mut self.diagnostics, "disabled by configuration");
        }
        if body.constraint_count() == 0 {
            return cpu(&mut self.diagnostics, "no constraints");
        }
        if !self.gpu.probe(&mut self.diagnostics) {
            return cpu(&mut self.diagnostics, "compute kernel unavailable");
        }

        if self.gpu.setup_buffers(body, &mut self.diagnostics) {
            return ExecutionPath::Gpu;
        }
        match self.config.buffer_failure_policy {
            BufferFailurePolicy::SkipStep => ExecutionPath::Gpu,
            BufferFailurePolicy::FallbackToCpu => cpu(&mut self.diagnostics, "device buffers unavailable"),
        }
    }

    /// Advances one step of `dt` seconds on the selected path.
    ///
    /// Never fails. Steps that make no position update report why in
    /// [`StepOutcome::Skipped`]; the cause is also logged (once per cause).
    pub fn solve(&mut self, dt: f32) -> StepResult {
        let start = Instant::now();
        self.diagnostics.set_step(self.steps);
        let path = self.path();
        let outcome = self.step_on(path, dt);
        self.diagnostics.flush();
        self.steps += 1;

        StepResult {
            path,
            outcome,
            wall_time: start.elapsed().as_secs_f64(),
        }
    }

    fn step_on(&mut self, path: Option<ExecutionPath>, dt: f32) -> StepOutcome {
        let (Some(path), Some(body)) = (path, self.body.as_mut()) else {
            self.diagnostics.emit_once("not_initialized", Severity::Warning, || EventKind::StepSkipped {
                reason: "solve called before initialize".into(),
            });
            return StepOutcome::Skipped(SkipReason::NotInitialized);
        };

        if !dt.is_finite() || dt < 0.0 {
            self.diagnostics.emit_once("invalid_timestep", Severity::Warning, || EventKind::StepSkipped {
                reason: format!("invalid timestep {dt}"),
            });
            return StepOutcome::Skipped(SkipReason::InvalidTimestep);
        }

        let stiffness = self.config.stiffness;
        let strategy: &mut dyn ExecutionStrategy = match path {
            ExecutionPath::Gpu => &mut self.gpu,
            ExecutionPath::Cpu => &mut self.cpu,
        };
        strategy.step(body, stiffness, dt, &mut self.diagnostics)
    }

    /// Completes a pending pipelined readback so host positions are current.
    pub fn flush(&mut self) -> bool {
        let ok = match (self.path(), self.body.as_mut()) {
            (Some(ExecutionPath::Gpu), Some(body)) => self.gpu.flush(body, &mut self.diagnostics),
            _ => true,
        };
        self.diagnostics.flush();
        ok
    }

    /// Recreates the device buffer triple from the current host positions.
    ///
    /// The only way out of a failed buffer setup. Returns true if the GPU
    /// path has resources afterwards.
    pub fn rebuild_device_resources(&mut self) -> bool {
        if self.path() != Some(ExecutionPath::Gpu) {
            return false;
        }
        self.flush();
        let ok = match &self.body {
            Some(body) => self.gpu.rebuild(body, &mut self.diagnostics),
            None => false,
        };
        self.diagnostics.flush();
        ok
    }

    pub fn state(&self) -> SolverState {
        self.state
    }

    /// The execution path, once ready.
    pub fn path(&self) -> Option<ExecutionPath> {
        match self.state {
            SolverState::Ready(path) => Some(path),
            _ => None,
        }
    }

    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.path().is_some()
    }

    /// True on the GPU path when the buffer triple exists.
    pub fn resources_ready(&self) -> bool {
        self.path() == Some(ExecutionPath::Gpu) && self.gpu.resources_ready()
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    pub fn backend_name(&self) -> &str {
        self.gpu.backend_name()
    }

    /// Number of `solve` calls so far.
    pub fn step_count(&self) -> u64 {
        self.steps
    }

    pub fn body(&self) -> Option<&SoftBody> {
        self.body.as_ref()
    }

    /// Current positions. Empty while uninitialized.
    pub fn positions(&self) -> &[Vec3] {
        self.body.as_ref().map(SoftBody::positions).unwrap_or_default()
    }

    /// Mutable positions for host-driven motion.
    ///
    /// Completes any pending readback first; on the GPU path the edited
    /// positions are uploaded before the next dispatch.
    pub fn positions_mut(&mut self) -> Option<&mut [Vec3]> {
        if self.path() == Some(ExecutionPath::Gpu) {
            self.flush();
            self.gpu.mark_host_dirty();
        }
        self.body.as_mut().map(|b| b.positions_mut())
    }

    pub fn rest_positions(&self) -> &[Vec3] {
        self.body.as_ref().map(SoftBody::rest_positions).unwrap_or_default()
    }

    pub fn constraints(&self) -> &[DistanceConstraint] {
        self.body.as_ref().map(SoftBody::constraints).unwrap_or_default()
    }

    pub fn rest_lengths(&self) -> &[f32] {
        self.body.as_ref().map(SoftBody::rest_lengths).unwrap_or_default()
    }
}

impl Drop for MuscleSolver {
    fn drop(&mut self) {
        self.gpu.release();
        self.diagnostics.finalize();
    }
}
