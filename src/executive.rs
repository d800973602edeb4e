//! Executive Facade
//!
//! Owns the single global lock over the registry, the OS port, the event
//! and syslog sinks, the per-app cleanup hooks, and the command counter.
//! The lifecycle operations themselves live in `creation`, `control`,
//! `scanner`, `reclaim`, `startup`, and `info`, all as methods on
//! [`Executive`].
//!
//! # Locking
//!
//! There is exactly one lock. It is held for the minimum bookkeeping work
//! and released before any call that can block or re-enter the executive:
//! module load/unload, symbol lookup, cleanup hooks, library init, and
//! control-request dispatch.

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU32, Ordering};
use spin::{Mutex, MutexGuard};

use crate::config;
use crate::error::ExecError;
use crate::events::{Event, EventId, EventSink, Severity};
use crate::osal::OsPort;
use crate::registry::{AppState, ControlRequest, ExecState};
use crate::reclaim::CleanupHook;
use crate::syslog::SysLog;

/// The application lifecycle manager.
pub struct Executive {
    state: Mutex<ExecState>,
    os: Arc<dyn OsPort>,
    events: Arc<dyn EventSink>,
    hooks: Vec<Arc<dyn CleanupHook>>,
    syslog: SysLog,
    command_count: AtomicU32,
}

impl Executive {
    /// Create an executive with no per-app cleanup hooks.
    pub fn new(os: Arc<dyn OsPort>, events: Arc<dyn EventSink>) -> Self {
        Self::with_hooks(os, events, Vec::new())
    }

    /// Create an executive that runs `hooks` during every app teardown.
    pub fn with_hooks(
        os: Arc<dyn OsPort>,
        events: Arc<dyn EventSink>,
        hooks: Vec<Arc<dyn CleanupHook>>,
    ) -> Self {
        Self {
            state: Mutex::new(ExecState::new()),
            os,
            events,
            hooks,
            syslog: SysLog::new(config::SYSLOG_CAPACITY),
            command_count: AtomicU32::new(0),
        }
    }

    // ── Internal access ─────────────────────────────────────

    pub(crate) fn state(&self) -> MutexGuard<'_, ExecState> {
        self.state.lock()
    }

    pub(crate) fn os(&self) -> &dyn OsPort {
        &*self.os
    }

    pub(crate) fn hooks(&self) -> &[Arc<dyn CleanupHook>] {
        &self.hooks
    }

    pub(crate) fn send_event(&self, id: EventId, severity: Severity, text: String) {
        self.events.send(Event { id, severity, text });
    }

    // ── Public surface ──────────────────────────────────────

    /// The executive's system log.
    pub fn syslog(&self) -> &SysLog {
        &self.syslog
    }

    /// Monotonic count of processed commands. A change wakes the
    /// background scanner regardless of its timer.
    pub fn command_count(&self) -> u32 {
        self.command_count.load(Ordering::SeqCst)
    }

    /// Record that a command was processed.
    pub fn bump_command_count(&self) {
        self.command_count.fetch_add(1, Ordering::SeqCst);
    }

    /// Write a control request for a live app. The request takes effect
    /// on the next background scan.
    pub fn set_control_request(
        &self,
        app_slot: usize,
        request: ControlRequest,
    ) -> Result<(), ExecError> {
        let mut st = self.state();
        let app = st
            .apps
            .get_mut(app_slot)
            .filter(|a| a.state != AppState::Undefined)
            .ok_or(ExecError::BadArgument)?;
        app.control.request = request;
        Ok(())
    }

    /// Write a raw control value, rejecting values outside the known
    /// request set at this ingress boundary.
    pub fn set_control_request_raw(&self, app_slot: usize, raw: u32) -> Result<(), ExecError> {
        let request = ControlRequest::try_from(raw).map_err(|_| ExecError::BadArgument)?;
        self.set_control_request(app_slot, request)
    }

    /// Current lifecycle state of a slot, if it is within range.
    pub fn app_state(&self, app_slot: usize) -> Option<AppState> {
        self.state().apps.get(app_slot).map(|a| a.state)
    }

    /// Pending control request and remaining timeout of a live app.
    pub fn app_control(&self, app_slot: usize) -> Option<(ControlRequest, u32)> {
        self.state()
            .apps
            .get(app_slot)
            .filter(|a| a.state != AppState::Undefined)
            .map(|a| (a.control.request, a.control.timer_millis))
    }

    /// Slot index of the live app with the given name.
    pub fn find_app_by_name(&self, name: &str) -> Option<usize> {
        self.state().find_app_by_name(name)
    }

    /// Number of registered external apps.
    pub fn registered_external_apps(&self) -> u32 {
        self.state().registered_external_apps
    }

    /// Number of registered libraries.
    pub fn registered_libs(&self) -> u32 {
        self.state().registered_libs
    }

    /// Number of registered tasks.
    pub fn registered_tasks(&self) -> u32 {
        self.state().registered_tasks
    }
}

// ── Tests ───────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RecordingSink;
    use crate::osal::mock::MockOs;

    fn exec() -> Executive {
        Executive::new(Arc::new(MockOs::new()), RecordingSink::new())
    }

    #[test]
    fn test_command_count_monotonic() {
        let exec = exec();
        assert_eq!(exec.command_count(), 0);
        exec.bump_command_count();
        exec.bump_command_count();
        assert_eq!(exec.command_count(), 2);
    }

    #[test]
    fn test_set_control_request_requires_live_slot() {
        let exec = exec();
        let err = exec.set_control_request(0, ControlRequest::SysDelete);
        assert_eq!(err, Err(ExecError::BadArgument));

        let err = exec.set_control_request(config::MAX_APPLICATIONS, ControlRequest::SysDelete);
        assert_eq!(err, Err(ExecError::BadArgument));
    }

    #[test]
    fn test_raw_control_request_rejected_out_of_range() {
        let exec = exec();
        exec.state().reserve_app_slot();
        assert_eq!(
            exec.set_control_request_raw(0, 42),
            Err(ExecError::BadArgument)
        );
        assert!(exec.set_control_request_raw(0, 3).is_ok());
    }
}
