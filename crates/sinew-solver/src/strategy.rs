//! Execution strategy trait and per-step results.
//!
//! The façade owns one strategy per execution path and routes each
//! `solve` call to the one selected at initialization.

use serde::{Deserialize, Serialize};
use sinew_mesh::SoftBody;
use sinew_telemetry::Diagnostics;

/// Which path relaxes the constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionPath {
    Gpu,
    Cpu,
}

impl std::fmt::Display for ExecutionPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionPath::Gpu => f.write_str("gpu"),
            ExecutionPath::Cpu => f.write_str("cpu"),
        }
    }
}

/// Why a step made no position update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// `solve` was called before a successful `initialize`.
    NotInitialized,
    /// `dt` was negative, NaN or infinite.
    InvalidTimestep,
    /// The device buffer triple is missing.
    ResourcesUnavailable,
    /// The backend rejected an upload or dispatch.
    DispatchFailed,
    /// Device results could not be copied back.
    ReadbackFailed,
}

/// What one step did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    /// CPU sweep. `corrected` counts non-degenerate constraints.
    Relaxed { corrected: u32 },
    /// GPU work submitted. With pipelined readback, host positions are
    /// updated on the next step.
    Dispatched { groups: u32, batches: u32 },
    Skipped(SkipReason),
}

impl StepOutcome {
    #[inline]
    pub fn is_skipped(&self) -> bool {
        matches!(self, StepOutcome::Skipped(_))
    }
}

/// Result of [`MuscleSolver::solve`](crate::MuscleSolver::solve).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    /// `None` while uninitialized.
    pub path: Option<ExecutionPath>,
    pub outcome: StepOutcome,
    /// Wall-clock time for this step (seconds).
    pub wall_time: f64,
}

/// One way of running a relaxation pass.
///
/// # Implementations
///
/// - [`CpuRelaxation`](crate::cpu::CpuRelaxation): sequential sweep in list order
/// - [`GpuRelaxation`](crate::gpu::GpuRelaxation): compute dispatch + readback
pub trait ExecutionStrategy: Send {
    /// Applies every constraint once. Never fails: problems are reported
    /// through `diagnostics` and surface as [`StepOutcome::Skipped`].
    fn step(
        &mut self,
        body: &mut SoftBody,
        stiffness: f32,
        dt: f32,
        diagnostics: &mut Diagnostics,
    ) -> StepOutcome;

    fn path(&self) -> ExecutionPath;

    /// Returns the strategy's name.
    fn name(&self) -> &str;
}
