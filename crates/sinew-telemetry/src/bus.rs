//! Queued delivery of diagnostics to sinks.
//!
//! Emitting only needs `&self`: events go into an `mpsc` channel and reach
//! the sinks when the owner calls [`EventBus::flush`]. A sink that panics
//! is removed from the bus and never called again, so a broken sink cannot
//! take the solver down with it.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc;

use crate::events::{DiagnosticEvent, Severity};
use crate::sinks::EventSink;

/// Event queue with pluggable sinks.
pub struct EventBus {
    tx: mpsc::Sender<DiagnosticEvent>,
    rx: mpsc::Receiver<DiagnosticEvent>,
    sinks: Vec<Box<dyn EventSink>>,
    /// Events below this severity are discarded on emit. `None` mutes the bus.
    threshold: Option<Severity>,
    delivered: u64,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            tx,
            rx,
            sinks: Vec::new(),
            threshold: Some(Severity::Info),
            delivered: 0,
        }
    }

    pub fn add_sink(&mut self, sink: Box<dyn EventSink>) {
        self.sinks.push(sink);
    }

    /// Sets the lowest severity that is queued. `None` drops everything.
    pub fn set_threshold(&mut self, threshold: Option<Severity>) {
        self.threshold = threshold;
    }

    pub fn threshold(&self) -> Option<Severity> {
        self.threshold
    }

    /// Queues `event` unless it falls below the threshold.
    pub fn emit(&self, event: DiagnosticEvent) {
        if self.threshold.is_some_and(|min| event.severity >= min) {
            // The receiver lives as long as the bus; a send error cannot be acted on.
            let _ = self.tx.send(event);
        }
    }

    /// Hands every queued event to every sink, in emission order.
    /// Returns the number of events delivered.
    pub fn flush(&mut self) -> usize {
        let mut count = 0;
        while let Ok(event) = self.rx.try_recv() {
            self.sinks.retain_mut(|sink| deliver(sink.as_mut(), &event));
            count += 1;
        }
        self.delivered += count as u64;
        count
    }

    /// Flushes, then lets each sink finish its output.
    pub fn finalize(&mut self) {
        self.flush();
        for sink in &mut self.sinks {
            let _ = catch_unwind(AssertUnwindSafe(|| sink.finalize()));
        }
    }

    /// Total events delivered since creation.
    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns false if the sink panicked and must be removed.
fn deliver(sink: &mut dyn EventSink, event: &DiagnosticEvent) -> bool {
    if catch_unwind(AssertUnwindSafe(|| sink.handle(event))).is_ok() {
        return true;
    }
    tracing::warn!(sink = sink.name(), "diagnostics sink panicked; removed");
    false
}
