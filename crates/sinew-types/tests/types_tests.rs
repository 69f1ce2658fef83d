//! Integration tests for sinew-types.

use sinew_types::constants::{DEFAULT_DT, DEFAULT_WORKGROUP_SIZE, MAX_WORKGROUP_SIZE};
use sinew_types::SinewError;

#[test]
fn error_display() {
    let err = SinewError::InvalidMesh("positions are empty".into());
    assert_eq!(err.to_string(), "Invalid mesh: positions are empty");

    let err = SinewError::BufferAllocation {
        label: "sinew.positions".into(),
        reason: "out of memory".into(),
    };
    assert!(err.to_string().contains("sinew.positions"));
    assert!(err.to_string().contains("out of memory"));
}

#[test]
fn io_error_converts() {
    let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
    let err: SinewError = io.into();
    assert!(matches!(err, SinewError::Io(_)));
}

#[test]
fn default_workgroup_within_limit() {
    assert!(DEFAULT_WORKGROUP_SIZE <= MAX_WORKGROUP_SIZE);
    assert_eq!(DEFAULT_WORKGROUP_SIZE, 64);
}

#[test]
fn default_dt_is_sixtieth() {
    assert!((DEFAULT_DT * 60.0 - 1.0).abs() < 1e-6);
}

#[test]
fn not_initialized_mentions_initialize() {
    assert!(SinewError::NotInitialized.to_string().contains("initialize()"));
}
