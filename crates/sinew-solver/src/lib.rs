//! # sinew-solver
//!
//! Single-pass, stiffness-scaled distance-constraint relaxation with a GPU
//! compute path and a sequential CPU fallback.
//!
//! ## Key Types
//!
//! - [`MuscleSolver`]: Façade: initialization, path selection, per-step solve
//! - [`SolverConfig`]: Stiffness, dispatch/readback modes, failure policy
//! - [`ExecutionStrategy`]: One relaxation pass ([`CpuRelaxation`], [`GpuRelaxation`])
//! - [`StepResult`]: What a step did and how long it took

pub mod config;
pub mod cpu;
pub mod gpu;
pub mod solver;
pub mod strategy;

pub use config::{BufferFailurePolicy, DispatchMode, ReadbackMode, SolverConfig};
pub use cpu::{solve_distance_constraint, CpuRelaxation};
pub use gpu::GpuRelaxation;
pub use solver::{MuscleSolver, SolverState};
pub use strategy::{ExecutionPath, ExecutionStrategy, SkipReason, StepOutcome, StepResult};
