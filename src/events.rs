//! Executive Event Notifications
//!
//! Structured event records emitted on control-request outcomes and on
//! creation/load failures. The core only produces events; routing and
//! filtering belong to the event subsystem behind the [`EventSink`] trait.

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;
use spin::Mutex;

// ── Types ───────────────────────────────────────────────────

/// Identifies one event in the executive's event taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventId {
    /// App exited on its own request.
    ExitAppInf,
    /// App exit requested, but cleanup reported errors.
    ExitAppErr,
    /// App exited after reporting an error.
    ErrExitAppInf,
    /// App error-exit requested, but cleanup reported errors.
    ErrExitAppErr,
    /// App stopped by a delete request.
    StopInf,
    /// App delete requested, but cleanup reported errors.
    StopErr,
    /// App restart completed.
    RestartAppInf,
    /// App restart failed while re-creating the app.
    RestartAppCreateErr,
    /// App restart failed while cleaning up the old instance.
    RestartAppCleanupErr,
    /// App reload completed.
    ReloadAppInf,
    /// App reload failed while re-creating the app.
    ReloadAppCreateErr,
    /// App reload failed while cleaning up the old instance.
    ReloadAppCleanupErr,
    /// Control dispatch observed an exception request; rewritten to a
    /// delete so the next scan can reclaim the slot.
    PcrErr1,
    /// Control dispatch fired for a request with no teardown action.
    PcrErr2,
    /// App or library creation from the startup script failed.
    StartAppErr,
}

/// Event severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Error,
}

/// One emitted event record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub id: EventId,
    pub severity: Severity,
    pub text: String,
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sev = match self.severity {
            Severity::Info => "INFO",
            Severity::Error => "ERROR",
        };
        write!(f, "[{}] {:?}: {}", sev, self.id, self.text)
    }
}

// ── Sink ────────────────────────────────────────────────────

/// Receiver for executive events.
pub trait EventSink: Send + Sync {
    fn send(&self, event: Event);
}

/// Sink that drops every event. Useful when the event subsystem is not up.
pub struct NullSink;

impl EventSink for NullSink {
    fn send(&self, _event: Event) {}
}

/// Sink that records every event, for inspection by tests.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<Event>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// All events received so far, in emission order.
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    /// Number of events with the given id.
    pub fn count_of(&self, id: EventId) -> usize {
        self.events.lock().iter().filter(|e| e.id == id).count()
    }

    /// Whether at least one event with the given id was received.
    pub fn has(&self, id: EventId) -> bool {
        self.count_of(id) > 0
    }
}

impl EventSink for RecordingSink {
    fn send(&self, event: Event) {
        self.events.lock().push(event);
    }
}

// ── Tests ───────────────────────────────────────────────────
