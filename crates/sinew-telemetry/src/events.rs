//! Diagnostic event types.
//!
//! Structured events emitted by the solver during initialization and at
//! each step. Events are lightweight value types that carry just enough
//! data to be useful for monitoring and for asserting behaviour in tests.

use serde::{Deserialize, Serialize};

/// Event severity. Maps onto `tracing` levels in [`TracingSink`].
///
/// [`TracingSink`]: crate::sinks::TracingSink
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// A diagnostic emitted by the solver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticEvent {
    /// Solver step the event belongs to (0 before the first step).
    pub step: u64,
    pub severity: Severity,
    /// Event payload.
    pub kind: EventKind,
}

/// Event payload variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventKind {
    /// Mesh data was rejected at initialization.
    InvalidInput {
        reason: String,
    },

    /// Solver finished initializing.
    Initialized {
        particles: u32,
        constraints: u32,
        /// Execution path selected ("gpu" or "cpu").
        path: String,
    },

    /// Capability probe finished.
    CapabilityProbed {
        backend: String,
        available: bool,
    },

    /// The compute kernel is missing or failed to compile.
    KernelUnavailable {
        reason: String,
    },

    /// Persistent device buffers were created and uploaded.
    BuffersReady {
        positions: u32,
        constraints: u32,
    },

    /// A device buffer could not be created.
    BufferAllocationFailed {
        label: String,
        reason: String,
    },

    /// The CPU relaxation path is in use.
    CpuPathSelected {
        reason: String,
    },

    /// A kernel dispatch was submitted.
    DispatchIssued {
        constraints: u32,
        groups: u32,
        batches: u32,
    },

    /// A dispatch request was rejected.
    DispatchRejected {
        reason: String,
    },

    /// Device results could not be copied back.
    ReadbackFailed {
        reason: String,
    },

    /// A step produced no position update.
    StepSkipped {
        reason: String,
    },

    /// Custom event for extensibility.
    Custom {
        /// Arbitrary label.
        label: String,
        /// JSON-encoded payload.
        payload: String,
    },
}

impl DiagnosticEvent {
    /// Creates a new event for the given step.
    pub fn new(step: u64, severity: Severity, kind: EventKind) -> Self {
        Self {
            step,
            severity,
            kind,
        }
    }
}
