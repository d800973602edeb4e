//! App Information Queries
//!
//! Lock-protected snapshots of one app's registry record, combined with
//! the module address layout reported by the loader.

use alloc::string::String;

use crate::error::ExecError;
use crate::executive::Executive;
use crate::osal::{ModuleHandle, StartAddress, TaskHandle};
use crate::registry::{AppState, AppType, ExceptionAction};

/// Snapshot of one application, as returned by [`Executive::app_info`].
#[derive(Debug, Clone)]
pub struct AppInfo {
    pub app_id: usize,
    pub app_type: AppType,
    pub name: String,
    pub entry_point: String,
    pub file_name: String,
    pub module: ModuleHandle,
    pub stack_size: u32,
    pub priority: u32,
    pub start_address: StartAddress,
    pub exception_action: ExceptionAction,
    pub main_task: TaskHandle,
    pub main_task_name: String,
    pub num_child_tasks: u32,
    pub execution_counter: u32,
    /// False when the loader could not report the module layout; the
    /// address fields below are zero in that case.
    pub addresses_valid: bool,
    pub code_address: usize,
    pub code_size: usize,
    pub data_address: usize,
    pub data_size: usize,
    pub bss_address: usize,
    pub bss_size: usize,
}

impl Executive {
    /// Snapshot a live app. Returns `None` for free or out-of-range slots.
    pub fn app_info(&self, app_slot: usize) -> Option<AppInfo> {
        let st = self.state();
        let app = st.apps.get(app_slot)?;
        if app.state == AppState::Undefined {
            return None;
        }

        let mut info = AppInfo {
            app_id: app_slot,
            app_type: app.app_type,
            name: app.start_params.name.clone(),
            entry_point: app.start_params.entry_point.clone(),
            file_name: app.start_params.file_name.clone(),
            module: app.start_params.module,
            stack_size: app.start_params.stack_size,
            priority: app.start_params.priority,
            start_address: app.start_params.start_address,
            exception_action: app.start_params.exception_action,
            main_task: app.main_task,
            main_task_name: app.main_task_name.clone(),
            num_child_tasks: st.child_task_count(app_slot, app.main_task),
            execution_counter: 0,
            addresses_valid: false,
            code_address: 0,
            code_size: 0,
            data_address: 0,
            data_size: 0,
            bss_address: 0,
            bss_size: 0,
        };

        if let Ok(index) = self.os().task_index(info.main_task) {
            if st.tasks[index].in_use {
                info.execution_counter = st.tasks[index].execution_counter;
            }
        }

        if let Ok(layout) = self.os().module_info(info.module) {
            info.addresses_valid = layout.valid;
            if layout.valid {
                info.code_address = layout.code_address;
                info.code_size = layout.code_size;
                info.data_address = layout.data_address;
                info.data_size = layout.data_size;
                info.bss_address = layout.bss_address;
                info.bss_size = layout.bss_size;
            }
        }

        Some(info)
    }

    /// Bump the execution counter of a registered task. The owning task
    /// calls this once per pass of its main loop.
    pub fn increment_task_counter(&self, task: TaskHandle) -> Result<u32, ExecError> {
        let index = self
            .os()
            .task_index(task)
            .map_err(|_| ExecError::BadArgument)?;
        let mut st = self.state();
        let record = st.tasks.get_mut(index).ok_or(ExecError::BadArgument)?;
        if !record.in_use || record.task != task {
            return Err(ExecError::BadArgument);
        }
        record.execution_counter += 1;
        Ok(record.execution_counter)
    }
}

// ── Tests ───────────────────────────────────────────────────
