//! # sinew-telemetry
//!
//! Diagnostics for the solver. Emits severity-tagged structured events
//! (capability probe, buffer lifecycle, dispatch, readback) that are
//! consumed by pluggable sinks. [`Diagnostics`] is the per-solver front
//! end and owns its own one-shot latches, so rate limiting never leaks
//! between solver instances.

pub mod bus;
pub mod diagnostics;
pub mod events;
pub mod sinks;

pub use bus::EventBus;
pub use diagnostics::Diagnostics;
pub use events::{DiagnosticEvent, EventKind, Severity};
pub use sinks::{DiagnosticLog, EventSink, TracingSink, VecSink};
