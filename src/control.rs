//! Control-Request Dispatch
//!
//! Executes the lifecycle action an app's control request asks for, once
//! the background scanner decides its time is up: exit, error exit,
//! delete, restart, or reload. A snapshot of the start parameters is
//! taken before any teardown so restart and reload can re-create the app
//! after its slot has been cleared.

use alloc::format;

use crate::error::ExecError;
use crate::events::{EventId, Severity};
use crate::executive::Executive;
use crate::registry::{AppState, ControlRequest, StartParams};
use crate::syslog::es_log;

impl Executive {
    /// Perform the control action currently requested for `app_slot`.
    ///
    /// Called by the background scanner with the global lock released;
    /// restart and reload re-enter `app_create`, which takes the lock
    /// itself.
    pub fn process_control_request(&self, app_slot: usize) {
        let (params, request) = {
            let mut st = self.state();
            let Some(app) = st.apps.get_mut(app_slot) else {
                drop(st);
                es_log!(self.syslog(), "ControlReq: slot {} out of range", app_slot);
                return;
            };
            if app.state == AppState::Undefined {
                drop(st);
                es_log!(self.syslog(), "ControlReq: slot {} is not in use", app_slot);
                return;
            }
            let request = app.control.request;
            if matches!(
                request,
                ControlRequest::AppExit
                    | ControlRequest::AppError
                    | ControlRequest::SysDelete
                    | ControlRequest::SysRestart
                    | ControlRequest::SysReload
            ) {
                app.state = AppState::Stopped;
            }
            (app.start_params.clone(), request)
        };

        match request {
            ControlRequest::AppExit => match self.cleanup_app(app_slot) {
                Ok(()) => self.send_event(
                    EventId::ExitAppInf,
                    Severity::Info,
                    format!("Exit Application {} Completed.", params.name),
                ),
                Err(e) => self.send_event(
                    EventId::ExitAppErr,
                    Severity::Error,
                    format!("Exit Application {} Failed: CleanUpApp Error {}.", params.name, e),
                ),
            },

            ControlRequest::AppError => match self.cleanup_app(app_slot) {
                Ok(()) => self.send_event(
                    EventId::ErrExitAppInf,
                    Severity::Info,
                    format!("Exit Application {} on Error Completed.", params.name),
                ),
                Err(e) => self.send_event(
                    EventId::ErrExitAppErr,
                    Severity::Error,
                    format!(
                        "Exit Application {} on Error Failed: CleanUpApp Error {}.",
                        params.name, e
                    ),
                ),
            },

            ControlRequest::SysDelete => match self.cleanup_app(app_slot) {
                Ok(()) => self.send_event(
                    EventId::StopInf,
                    Severity::Info,
                    format!("Stop Application {} Completed.", params.name),
                ),
                Err(e) => self.send_event(
                    EventId::StopErr,
                    Severity::Error,
                    format!("Stop Application {} Failed: CleanUpApp Error {}.", params.name, e),
                ),
            },

            ControlRequest::SysRestart => self.restart_from_snapshot(
                app_slot,
                &params,
                EventId::RestartAppInf,
                EventId::RestartAppCreateErr,
                EventId::RestartAppCleanupErr,
                "Restart",
            ),

            // a reload re-reads the file path, which may have been
            // replaced on disk since the original load
            ControlRequest::SysReload => self.restart_from_snapshot(
                app_slot,
                &params,
                EventId::ReloadAppInf,
                EventId::ReloadAppCreateErr,
                EventId::ReloadAppCleanupErr,
                "Reload",
            ),

            ControlRequest::SysException => {
                self.send_event(
                    EventId::PcrErr1,
                    Severity::Error,
                    format!(
                        "ControlReq: Invalid State (EXCEPTION) Application {}.",
                        params.name
                    ),
                );
                // Left as-is this event would repeat on every scan.
                // Rewrite the request so the next scan deletes the app.
                self.state().apps[app_slot].control.request = ControlRequest::SysDelete;
            }

            ControlRequest::AppRun => {
                self.send_event(
                    EventId::PcrErr2,
                    Severity::Error,
                    format!(
                        "ControlReq: No action for request {:?}, Application {}.",
                        request, params.name
                    ),
                );
                self.state().apps[app_slot].control.request = ControlRequest::SysDelete;
            }
        }
    }

    fn restart_from_snapshot(
        &self,
        app_slot: usize,
        params: &StartParams,
        ok_id: EventId,
        create_err_id: EventId,
        cleanup_err_id: EventId,
        verb: &str,
    ) {
        match self.cleanup_app(app_slot) {
            Ok(()) => {
                let created: Result<usize, ExecError> = self.app_create(
                    &params.file_name,
                    &params.entry_point,
                    &params.name,
                    params.priority,
                    params.stack_size,
                    params.exception_action,
                );
                match created {
                    Ok(_) => self.send_event(
                        ok_id,
                        Severity::Info,
                        format!("{} Application {} Completed.", verb, params.name),
                    ),
                    Err(e) => self.send_event(
                        create_err_id,
                        Severity::Error,
                        format!(
                            "{} Application {} Failed: AppCreate Error {}.",
                            verb, params.name, e
                        ),
                    ),
                }
            }
            Err(e) => self.send_event(
                cleanup_err_id,
                Severity::Error,
                format!(
                    "{} Application {} Failed: CleanUpApp Error {}.",
                    verb, params.name, e
                ),
            ),
        }
    }
}

// ── Tests ───────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RecordingSink;
    use crate::osal::mock::MockOs;
    use crate::osal::ModuleHandle;
    use crate::registry::ExceptionAction;
    use alloc::sync::Arc;

    fn exec_with_app() -> (Arc<MockOs>, Arc<RecordingSink>, Executive, usize) {
        let os = Arc::new(MockOs::new());
        os.add_symbol("Main", 0xDEAD);
        os.set_next_module_handle(7);
        let sink = RecordingSink::new();
        let exec = Executive::new(os.clone(), sink.clone());
        let slot = exec
            .app_create("/cf/x.so", "Main", "APPX", 100, 4096, ExceptionAction::RestartApp)
            .unwrap();
        (os, sink, exec, slot)
    }

    #[test]
    fn test_exit_request_frees_slot() {
        let (os, sink, exec, slot) = exec_with_app();
        exec.set_control_request(slot, ControlRequest::AppExit).unwrap();

        exec.process_control_request(slot);

        assert_eq!(exec.app_state(slot), Some(AppState::Undefined));
        assert!(sink.has(EventId::ExitAppInf));
        assert_eq!(os.loaded_module_count(), 0);
        assert_eq!(exec.registered_external_apps(), 0);
    }

    #[test]
    fn test_delete_request_emits_stop_event() {
        let (_os, sink, exec, slot) = exec_with_app();
        exec.set_control_request(slot, ControlRequest::SysDelete).unwrap();

        exec.process_control_request(slot);

        assert!(sink.has(EventId::StopInf));
        assert!(!sink.has(EventId::StopErr));
    }

    #[test]
    fn test_error_exit_emits_error_variant_events() {
        let (_os, sink, exec, slot) = exec_with_app();
        exec.set_control_request(slot, ControlRequest::AppError).unwrap();

        exec.process_control_request(slot);

        assert!(sink.has(EventId::ErrExitAppInf));
        assert_eq!(exec.app_state(slot), Some(AppState::Undefined));
    }

    #[test]
    fn test_restart_reuses_slot_with_new_module() {
        let (os, sink, exec, slot) = exec_with_app();
        let old_task = exec.state().apps[slot].main_task;
        exec.set_control_request(slot, ControlRequest::SysRestart).unwrap();

        exec.process_control_request(slot);

        assert_eq!(os.unload_count(ModuleHandle(7)), 1);
        assert!(sink.has(EventId::RestartAppInf));
        assert_eq!(exec.app_state(slot), Some(AppState::Running));

        let st = exec.state();
        assert_eq!(st.apps[slot].start_params.module, ModuleHandle(8));
        assert_ne!(st.apps[slot].main_task, old_task);
        assert_eq!(st.registered_external_apps, 1);
        assert_eq!(st.registered_tasks, 1);
    }

    #[test]
    fn test_reload_failure_when_file_disappears() {
        let (os, sink, exec, slot) = exec_with_app();
        os.fail_module_load("/cf/x.so");
        exec.set_control_request(slot, ControlRequest::SysReload).unwrap();

        exec.process_control_request(slot);

        assert!(sink.has(EventId::ReloadAppCreateErr));
        assert_eq!(exec.app_state(slot), Some(AppState::Undefined));
        assert_eq!(exec.registered_external_apps(), 0);
    }

    #[test]
    fn test_exception_request_rewritten_to_delete() {
        let (_os, sink, exec, slot) = exec_with_app();
        exec.set_control_request(slot, ControlRequest::SysException).unwrap();

        exec.process_control_request(slot);

        // no teardown this tick; only the mitigation
        assert!(sink.has(EventId::PcrErr1));
        assert_ne!(exec.app_state(slot), Some(AppState::Undefined));
        assert_eq!(
            exec.state().apps[slot].control.request,
            ControlRequest::SysDelete
        );
        assert_eq!(exec.registered_external_apps(), 1);
    }

    #[test]
    fn test_run_request_has_no_teardown_action() {
        let (_os, sink, exec, slot) = exec_with_app();

        exec.process_control_request(slot);

        assert!(sink.has(EventId::PcrErr2));
        assert_ne!(exec.app_state(slot), Some(AppState::Undefined));
        assert_eq!(
            exec.state().apps[slot].control.request,
            ControlRequest::SysDelete
        );
    }

    #[test]
    fn test_dispatch_on_free_slot_only_logs() {
        let os = Arc::new(MockOs::new());
        let sink = RecordingSink::new();
        let exec = Executive::new(os, sink.clone());

        exec.process_control_request(3);

        assert!(exec.syslog().contains("not in use"));
        assert!(sink.events().is_empty());
    }
}
