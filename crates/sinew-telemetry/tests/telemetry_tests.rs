//! Integration tests for sinew-telemetry.

use sinew_telemetry::bus::EventBus;
use sinew_telemetry::events::{DiagnosticEvent, EventKind, Severity};
use sinew_telemetry::sinks::{EventSink, TracingSink, VecSink};
use sinew_telemetry::Diagnostics;

fn skipped(reason: &str) -> EventKind {
    EventKind::StepSkipped {
        reason: reason.into(),
    }
}

#[test]
fn emit_and_flush() {
    let mut bus = EventBus::new();
    let sink = VecSink::new();
    let log = sink.log();
    bus.add_sink(Box::new(sink));

    bus.emit(DiagnosticEvent::new(0, Severity::Info, skipped("a")));
    bus.emit(DiagnosticEvent::new(1, Severity::Error, skipped("b")));
    assert!(log.events().is_empty(), "sinks only see events on flush");

    bus.flush();
    let events = log.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].step, 0);
    assert_eq!(events[1].severity, Severity::Error);
}

#[test]
fn threshold_filters_on_emit() {
    let mut bus = EventBus::new();
    let sink = VecSink::new();
    let log = sink.log();
    bus.add_sink(Box::new(sink));

    bus.set_threshold(Some(Severity::Warning));
    bus.emit(DiagnosticEvent::new(0, Severity::Info, skipped("dropped")));
    bus.emit(DiagnosticEvent::new(0, Severity::Error, skipped("kept")));
    assert_eq!(bus.flush(), 1);

    bus.set_threshold(None);
    bus.emit(DiagnosticEvent::new(0, Severity::Error, skipped("muted")));
    assert_eq!(bus.flush(), 0);
    assert_eq!(log.events().len(), 1);
    assert_eq!(bus.delivered(), 1);
}

struct PanickingSink;

impl EventSink for PanickingSink {
    fn handle(&mut self, _event: &DiagnosticEvent) {
        panic!("sink failure");
    }

    fn name(&self) -> &str {
        "panicking"
    }
}

#[test]
fn panicking_sink_is_removed() {
    let mut bus = EventBus::new();
    let sink = VecSink::new();
    let log = sink.log();
    bus.add_sink(Box::new(PanickingSink));
    bus.add_sink(Box::new(sink));

    bus.emit(DiagnosticEvent::new(0, Severity::Info, skipped("a")));
    bus.emit(DiagnosticEvent::new(1, Severity::Info, skipped("b")));
    assert_eq!(bus.flush(), 2);

    assert_eq!(bus.sink_count(), 1);
    assert_eq!(log.events().len(), 2);
}

#[test]
fn multiple_sinks() {
    let mut bus = EventBus::new();
    bus.add_sink(Box::new(VecSink::new()));
    bus.add_sink(Box::new(TracingSink::new()));
    assert_eq!(bus.sink_count(), 2);

    // TracingSink with no subscriber installed must not panic.
    bus.emit(DiagnosticEvent::new(3, Severity::Warning, skipped("y")));
    bus.finalize();
}

#[test]
fn emit_once_latches_per_key() {
    let mut diagnostics = Diagnostics::new();
    let sink = VecSink::new();
    let log = sink.log();
    diagnostics.add_sink(Box::new(sink));

    assert!(diagnostics.emit_once("fallback", Severity::Warning, || skipped("1")));
    assert!(!diagnostics.emit_once("fallback", Severity::Warning, || skipped("2")));
    assert!(diagnostics.emit_once("other", Severity::Info, || skipped("3")));
    diagnostics.flush();

    assert_eq!(log.events().len(), 2);
    assert!(diagnostics.is_latched("fallback"));

    diagnostics.rearm("fallback");
    assert!(diagnostics.emit_once("fallback", Severity::Warning, || skipped("4")));
}

#[test]
fn latches_are_per_instance() {
    let mut first = Diagnostics::new();
    let mut second = Diagnostics::new();
    assert!(first.emit_once("probe", Severity::Error, || skipped("a")));
    assert!(second.emit_once("probe", Severity::Error, || skipped("b")));
}

#[test]
fn events_carry_current_step() {
    let mut diagnostics = Diagnostics::new();
    let sink = VecSink::new();
    let log = sink.log();
    diagnostics.add_sink(Box::new(sink));

    diagnostics.set_step(7);
    diagnostics.error(skipped("late"));
    diagnostics.flush();

    assert_eq!(log.events()[0].step, 7);
    assert_eq!(log.count(Severity::Error), 1);
    assert!(log.any(|e| matches!(e.kind, EventKind::StepSkipped { .. })));
}

#[test]
fn event_serialization() {
    let event = DiagnosticEvent::new(
        5,
        Severity::Error,
        EventKind::BufferAllocationFailed {
            label: "sinew.positions".into(),
            reason: "out of memory".into(),
        },
    );
    let json = serde_json::to_string(&event).unwrap();
    let recovered: DiagnosticEvent = serde_json::from_str(&json).unwrap();
    assert_eq!(recovered.step, 5);
    assert_eq!(recovered.kind, event.kind);
}
