//! Error types for the Sinew solver.
//!
//! All crates return `SinewResult<T>` from fallible operations.

use thiserror::Error;

/// Unified error type for the Sinew solver.
#[derive(Debug, Error)]
pub enum SinewError {
    /// Mesh data is malformed or inconsistent.
    #[error("Invalid mesh: {0}")]
    InvalidMesh(String),

    /// Configuration value is invalid.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// GPU backend error.
    #[error("GPU error: {0}")]
    Gpu(String),

    /// The compute kernel is missing or failed to compile.
    #[error("Kernel unavailable: {0}")]
    KernelUnavailable(String),

    /// A device buffer could not be created.
    #[error("Failed to allocate buffer '{label}': {reason}")]
    BufferAllocation {
        label: String,
        reason: String,
    },

    /// Copying device results back to the host failed.
    #[error("Readback failed: {0}")]
    Readback(String),

    /// An operation required an initialized solver.
    #[error("Solver not initialized. Call initialize() first.")]
    NotInitialized,
}

/// Convenience alias for `Result<T, SinewError>`.
pub type SinewResult<T> = Result<T, SinewError>;
