//! Background App Table Scan
//!
//! Periodic sweep over the app table that advances the control-request
//! state machine: running apps with a pending request move to WAITING
//! with a kill timer, and waiting apps whose timer has drained get their
//! request dispatched.
//!
//! The scan is cheap when nothing is happening: with no pending state
//! changes and no new commands it only decrements its own timer. A bump
//! of the command counter forces the next call to do a full pass
//! regardless of the timer.

use crate::config;
use crate::executive::Executive;
use crate::registry::{AppState, AppType, ControlRequest};

impl Executive {
    /// Advance the app-table state machine by `elapsed_millis`.
    ///
    /// Returns true when apps are in some phase of teardown, which the
    /// caller may use to schedule the next call sooner.
    pub fn run_app_table_scan(&self, elapsed_millis: u32) -> bool {
        let mut st = self.state();

        if st.scanner.pending_app_state_changes == 0
            && st.scanner.last_scan_command_count == self.command_count()
            && st.scanner.background_timer > elapsed_millis
        {
            // not due yet
            st.scanner.background_timer -= elapsed_millis;
            return false;
        }

        st.scanner.background_timer = config::APP_SCAN_RATE_MS;
        st.scanner.last_scan_command_count = self.command_count();
        st.scanner.pending_app_state_changes = 0;

        for slot in 0..config::MAX_APPLICATIONS {
            let (app_type, state, request, timer) = {
                let app = &st.apps[slot];
                (
                    app.app_type,
                    app.state,
                    app.control.request,
                    app.control.timer_millis,
                )
            };
            if app_type != AppType::External {
                continue;
            }

            if state > AppState::Running {
                st.scanner.pending_app_state_changes += 1;

                if timer > elapsed_millis {
                    st.apps[slot].control.timer_millis = timer - elapsed_millis;
                } else {
                    st.apps[slot].control.timer_millis = 0;
                    // Dispatch re-enters the executive (cleanup, and for
                    // restart/reload a full app_create), so the lock is
                    // dropped around it. Nothing read before this point
                    // is assumed valid afterwards; the loop re-reads
                    // every slot it visits.
                    drop(st);
                    self.process_control_request(slot);
                    st = self.state();
                }
            } else if state == AppState::Running && request > ControlRequest::AppRun {
                // a command arrived; give the app one kill timeout to
                // wind down on its own
                st.apps[slot].state = AppState::Waiting;
                st.apps[slot].control.timer_millis =
                    config::APP_KILL_TIMEOUT * config::APP_SCAN_RATE_MS;
            }
        }

        let pending = st.scanner.pending_app_state_changes;
        drop(st);
        pending != 0
    }
}

// ── Tests ───────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventId, RecordingSink};
    use crate::osal::mock::MockOs;
    use crate::registry::ExceptionAction;
    use alloc::sync::Arc;

    const SCAN: u32 = config::APP_SCAN_RATE_MS;

    fn exec_with_app() -> (Arc<MockOs>, Arc<RecordingSink>, Executive, usize) {
        let os = Arc::new(MockOs::new());
        os.add_symbol("Main", 0xDEAD);
        let sink = RecordingSink::new();
        let exec = Executive::new(os.clone(), sink.clone());
        let slot = exec
            .app_create("/cf/x.so", "Main", "APPX", 100, 4096, ExceptionAction::RestartApp)
            .unwrap();
        (os, sink, exec, slot)
    }

    #[test]
    fn test_idle_scan_only_decrements_timer() {
        let (_os, _sink, exec, _slot) = exec_with_app();
        // first call is due (timer starts at zero) and arms the timer
        assert!(!exec.run_app_table_scan(SCAN));

        assert!(!exec.run_app_table_scan(10));
        assert_eq!(exec.state().scanner.background_timer, SCAN - 10);
        assert!(!exec.run_app_table_scan(20));
        assert_eq!(exec.state().scanner.background_timer, SCAN - 30);
    }

    #[test]
    fn test_request_moves_running_app_to_waiting() {
        let (_os, _sink, exec, slot) = exec_with_app();
        exec.set_control_request(slot, ControlRequest::SysDelete).unwrap();
        exec.bump_command_count();

        exec.run_app_table_scan(10);

        let st = exec.state();
        assert_eq!(st.apps[slot].state, AppState::Waiting);
        assert_eq!(
            st.apps[slot].control.timer_millis,
            config::APP_KILL_TIMEOUT * SCAN
        );
    }

    #[test]
    fn test_command_counter_bump_wakes_idle_scanner() {
        let (_os, _sink, exec, slot) = exec_with_app();
        // arm the background timer so a scan is not otherwise due
        assert!(!exec.run_app_table_scan(SCAN));
        exec.set_control_request(slot, ControlRequest::SysDelete).unwrap();

        // without a bump the next small tick skips the table entirely
        assert!(!exec.run_app_table_scan(1));
        assert_eq!(exec.state().apps[slot].state, AppState::Running);

        // with a bump the same tick does a full pass
        exec.bump_command_count();
        exec.run_app_table_scan(1);
        assert_eq!(exec.state().apps[slot].state, AppState::Waiting);
    }

    #[test]
    fn test_waiting_timer_drains_then_dispatch_fires() {
        let (_os, sink, exec, slot) = exec_with_app();
        exec.set_control_request(slot, ControlRequest::SysDelete).unwrap();
        exec.bump_command_count();

        // transition pass
        assert!(!exec.run_app_table_scan(SCAN));
        assert_eq!(exec.state().apps[slot].state, AppState::Waiting);

        // the timer decreases by one scan period per due scan
        let mut last = config::APP_KILL_TIMEOUT * SCAN;
        for _ in 0..config::APP_KILL_TIMEOUT - 1 {
            assert!(exec.run_app_table_scan(SCAN));
            let now = exec.state().apps[slot].control.timer_millis;
            assert!(now < last);
            last = now;
        }

        // final period: the timer cannot cover the elapsed time, the
        // request is dispatched and the slot freed
        assert!(exec.run_app_table_scan(SCAN));
        assert_eq!(exec.app_state(slot), Some(AppState::Undefined));
        assert!(sink.has(EventId::StopInf));
    }

    #[test]
    fn test_scan_returns_true_while_teardowns_pending() {
        let (_os, _sink, exec, slot) = exec_with_app();
        exec.set_control_request(slot, ControlRequest::SysDelete).unwrap();
        exec.bump_command_count();

        assert!(!exec.run_app_table_scan(SCAN)); // transition pass
        assert!(exec.run_app_table_scan(SCAN)); // waiting, timer draining
    }

    #[test]
    fn test_exception_self_heals_across_two_scans() {
        let (_os, sink, exec, slot) = exec_with_app();
        exec.set_control_request(slot, ControlRequest::SysException).unwrap();
        exec.bump_command_count();

        // first due scan: RUNNING -> WAITING
        exec.run_app_table_scan(SCAN);
        assert_eq!(exec.state().apps[slot].state, AppState::Waiting);

        // drain the kill timer; the dispatch logs the invalid state and
        // rewrites the request instead of cleaning up
        for _ in 0..config::APP_KILL_TIMEOUT {
            exec.run_app_table_scan(SCAN);
        }
        assert!(sink.has(EventId::PcrErr1));
        assert_eq!(sink.count_of(EventId::PcrErr1), 1);
        assert_eq!(
            exec.state().apps[slot].control.request,
            ControlRequest::SysDelete
        );
        assert_ne!(exec.app_state(slot), Some(AppState::Undefined));

        // next due scan takes the normal delete path
        exec.run_app_table_scan(SCAN);
        assert_eq!(exec.app_state(slot), Some(AppState::Undefined));
        assert!(sink.has(EventId::StopInf));
        // the mitigation event never repeats
        assert_eq!(sink.count_of(EventId::PcrErr1), 1);
    }

    #[test]
    fn test_core_apps_are_not_scanned() {
        let (_os, _sink, exec, _slot) = exec_with_app();
        {
            let mut st = exec.state();
            let slot = st.reserve_app_slot().unwrap();
            st.apps[slot].app_type = AppType::Core;
            st.apps[slot].state = AppState::Running;
            st.apps[slot].control.request = ControlRequest::SysDelete;
        }
        exec.bump_command_count();
        exec.run_app_table_scan(SCAN);

        // the core app is untouched by the sweep
        let st = exec.state();
        assert_eq!(st.apps[1].state, AppState::Running);
    }
}
