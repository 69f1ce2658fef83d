//! Solver configuration.
//!
//! Parameters that choose the execution path and tune the relaxation:
//! stiffness, dispatch granularity, readback strategy and what to do when
//! device resources cannot be created.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use sinew_gpu::KernelSource;
use sinew_types::constants::{DEFAULT_STIFFNESS, DEFAULT_WORKGROUP_SIZE, MAX_WORKGROUP_SIZE};
use sinew_types::{SinewError, SinewResult};

/// How constraints are grouped into GPU dispatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// One dispatch over every constraint. Constraints sharing a particle
    /// write it without synchronization; the last writer wins.
    #[default]
    Concurrent,
    /// One dispatch per color batch. No two invocations of a dispatch
    /// share a particle, so results are deterministic.
    Colored,
}

/// When device results reach host positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadbackMode {
    /// Each step blocks until its readback completes.
    #[default]
    Blocking,
    /// A step's readback is consumed at the start of the next step. Host
    /// positions lag the device by one step until `flush`.
    Pipelined,
}

/// What happens when the device buffers cannot be created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferFailurePolicy {
    /// Stay on the GPU path and skip every step until resources are rebuilt.
    #[default]
    SkipStep,
    /// Switch to the CPU path for the solver's lifetime.
    FallbackToCpu,
}

/// Configuration for [`MuscleSolver`](crate::MuscleSolver).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Correction scale in `[0, 1]`.
    pub stiffness: f32,

    /// Constraints per compute workgroup.
    pub workgroup_size: u32,

    /// Probe the compute backend at all. When false the CPU path is used.
    pub prefer_gpu: bool,

    pub dispatch_mode: DispatchMode,

    pub readback_mode: ReadbackMode,

    pub buffer_failure_policy: BufferFailurePolicy,

    /// WGSL file to compile instead of the embedded kernel.
    pub kernel_path: Option<PathBuf>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            stiffness: DEFAULT_STIFFNESS,
            workgroup_size: DEFAULT_WORKGROUP_SIZE,
            prefer_gpu: true,
            dispatch_mode: DispatchMode::default(),
            readback_mode: ReadbackMode::default(),
            buffer_failure_policy: BufferFailurePolicy::default(),
            kernel_path: None,
        }
    }
}

impl SolverConfig {
    /// Never touches the compute backend.
    pub fn cpu_only() -> Self {
        Self {
            prefer_gpu: false,
            ..Default::default()
        }
    }

    /// Half-strength correction, for visibly elastic bodies.
    pub fn soft() -> Self {
        Self {
            stiffness: 0.5,
            ..Default::default()
        }
    }

    /// Deterministic GPU results at the cost of one dispatch per color.
    pub fn race_free() -> Self {
        Self {
            dispatch_mode: DispatchMode::Colored,
            ..Default::default()
        }
    }

    /// Kernel source selected by `kernel_path`.
    pub fn kernel_source(&self) -> KernelSource {
        match &self.kernel_path {
            Some(path) => KernelSource::File(path.clone()),
            None => KernelSource::Embedded,
        }
    }

    /// Checks value ranges.
    pub fn validate(&self) -> SinewResult<()> {
        if !(0.0..=1.0).contains(&self.stiffness) {
            return Err(SinewError::InvalidConfig(format!(
                "stiffness {} outside [0, 1]",
                self.stiffness
            )));
        }
        if self.workgroup_size == 0 || self.workgroup_size > MAX_WORKGROUP_SIZE {
            return Err(SinewError::InvalidConfig(format!(
                "workgroup_size {} outside 1..={MAX_WORKGROUP_SIZE}",
                self.workgroup_size
            )));
        }
        Ok(())
    }
}
