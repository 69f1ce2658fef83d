//! Pluggable event sinks.
//!
//! Sinks consume events from the bus and process them (log through
//! `tracing`, collect for inspection, forward elsewhere).

use std::sync::{Arc, Mutex};

use crate::events::{DiagnosticEvent, Severity};

/// Trait for event consumers.
///
/// Implement this to create custom diagnostic outputs. Sinks must not
/// panic; a sink that cannot record an event drops it.
pub trait EventSink: Send {
    /// Process a single event.
    fn handle(&mut self, event: &DiagnosticEvent);

    /// Called when the solver is dropped. Flush buffers, close files, etc.
    fn finalize(&mut self) {}

    /// Returns a human-readable name for this sink.
    fn name(&self) -> &str;
}

/// Shared, cloneable view of the events collected by a [`VecSink`].
#[derive(Debug, Clone, Default)]
pub struct DiagnosticLog {
    events: Arc<Mutex<Vec<DiagnosticEvent>>>,
}

impl DiagnosticLog {
    /// Returns a copy of every collected event.
    pub fn events(&self) -> Vec<DiagnosticEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Returns the number of collected events with the given severity.
    pub fn count(&self, severity: Severity) -> usize {
        self.events
            .lock()
            .map(|e| e.iter().filter(|ev| ev.severity == severity).count())
            .unwrap_or(0)
    }

    /// Returns true if any collected event matches `pred`.
    pub fn any(&self, pred: impl Fn(&DiagnosticEvent) -> bool) -> bool {
        self.events
            .lock()
            .map(|e| e.iter().any(|ev| pred(ev)))
            .unwrap_or(false)
    }

    /// Removes every collected event.
    pub fn clear(&self) {
        if let Ok(mut e) = self.events.lock() {
            e.clear();
        }
    }
}

/// A sink that collects events into a [`DiagnosticLog`] for testing and
/// inspection.
pub struct VecSink {
    log: DiagnosticLog,
}

impl VecSink {
    /// Creates an empty vec sink.
    pub fn new() -> Self {
        Self {
            log: DiagnosticLog::default(),
        }
    }

    /// Returns a handle that stays readable after the sink is boxed.
    pub fn log(&self) -> DiagnosticLog {
        self.log.clone()
    }
}

impl Default for VecSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for VecSink {
    fn handle(&mut self, event: &DiagnosticEvent) {
        if let Ok(mut events) = self.log.events.lock() {
            events.push(event.clone());
        }
    }

    fn name(&self) -> &str {
        "vec_sink"
    }
}

/// A sink that logs events using the `tracing` crate.
pub struct TracingSink {
    /// Events below this severity are dropped.
    min_severity: Severity,
}

impl TracingSink {
    /// Creates a new tracing sink that forwards everything.
    pub fn new() -> Self {
        Self {
            min_severity: Severity::Info,
        }
    }

    /// Creates a tracing sink that drops events below `min_severity`.
    pub fn with_min_severity(min_severity: Severity) -> Self {
        Self { min_severity }
    }
}

impl Default for TracingSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for TracingSink {
    fn handle(&mut self, event: &DiagnosticEvent) {
        if event.severity < self.min_severity {
            return;
        }
        match event.severity {
            Severity::Info => tracing::info!(step = event.step, event = ?event.kind, "sinew"),
            Severity::Warning => tracing::warn!(step = event.step, event = ?event.kind, "sinew"),
            Severity::Error => tracing::error!(step = event.step, event = ?event.kind, "sinew"),
        }
    }

    fn name(&self) -> &str {
        "tracing_sink"
    }
}
