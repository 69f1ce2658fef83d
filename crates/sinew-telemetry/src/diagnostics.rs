//! Per-solver diagnostics front end with one-shot emission.
//!
//! Some conditions (capability unavailable, CPU fallback in use, dispatch
//! rejected) hold for every step once they occur. They are reported the
//! first time only. The latch set is owned by the `Diagnostics` value, so
//! two solvers never suppress each other's messages.

use std::collections::HashSet;

use crate::bus::EventBus;
use crate::events::{DiagnosticEvent, EventKind, Severity};
use crate::sinks::EventSink;

/// Diagnostics collaborator owned by one solver.
pub struct Diagnostics {
    bus: EventBus,
    /// Keys already emitted through [`Diagnostics::emit_once`].
    latched: HashSet<&'static str>,
    step: u64,
}

impl Diagnostics {
    /// Creates diagnostics with no sinks. Events are queued and dropped on flush.
    pub fn new() -> Self {
        Self {
            bus: EventBus::new(),
            latched: HashSet::new(),
            step: 0,
        }
    }

    /// Creates diagnostics that forward to `tracing`.
    pub fn with_tracing() -> Self {
        let mut diagnostics = Self::new();
        diagnostics.add_sink(Box::new(crate::sinks::TracingSink::new()));
        diagnostics
    }

    /// Registers a sink.
    pub fn add_sink(&mut self, sink: Box<dyn EventSink>) {
        self.bus.add_sink(sink);
    }

    /// Sets the step number stamped on subsequent events.
    pub fn set_step(&mut self, step: u64) {
        self.step = step;
    }

    /// Returns the current step number.
    pub fn step(&self) -> u64 {
        self.step
    }

    /// Emit an event unconditionally.
    pub fn emit(&self, severity: Severity, kind: EventKind) {
        self.bus.emit(DiagnosticEvent::new(self.step, severity, kind));
    }

    pub fn info(&self, kind: EventKind) {
        self.emit(Severity::Info, kind);
    }

    pub fn warn(&self, kind: EventKind) {
        self.emit(Severity::Warning, kind);
    }

    pub fn error(&self, kind: EventKind) {
        self.emit(Severity::Error, kind);
    }

    /// Emit an event the first time `key` is seen. Returns true if emitted.
    ///
    /// `kind` is built lazily so suppressed calls cost nothing.
    pub fn emit_once(
        &mut self,
        key: &'static str,
        severity: Severity,
        kind: impl FnOnce() -> EventKind,
    ) -> bool {
        if !self.latched.insert(key) {
            return false;
        }
        self.emit(severity, kind());
        true
    }

    /// Returns true if `key` has already been emitted.
    pub fn is_latched(&self, key: &'static str) -> bool {
        self.latched.contains(key)
    }

    /// Re-arms `key` so the next `emit_once` reports again.
    pub fn rearm(&mut self, key: &'static str) {
        self.latched.remove(key);
    }

    /// Deliver queued events to sinks.
    pub fn flush(&mut self) {
        self.bus.flush();
    }

    /// Flush and finalize every sink.
    pub fn finalize(&mut self) {
        self.bus.finalize();
    }

    /// Returns the number of registered sinks.
    pub fn sink_count(&self) -> usize {
        self.bus.sink_count()
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new()
    }
}
