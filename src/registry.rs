//! Application Registry
//!
//! Three fixed-capacity slotted tables — apps, libraries, tasks — plus the
//! registration counters and the background-scanner bookkeeping. The whole
//! structure lives behind the executive's single global lock; a record's
//! slot index is its identity for as long as the record is live.

use alloc::string::String;
use core::array;

use crate::config;
use crate::osal::{ModuleHandle, StartAddress, TaskHandle};

// ── App records ─────────────────────────────────────────────

/// Lifecycle state of an app slot. `Undefined` means the slot is free.
///
/// The ordering is meaningful: states above `Running` are in some phase
/// of teardown and are what the background scanner looks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum AppState {
    #[default]
    Undefined,
    EarlyInit,
    LateInit,
    Running,
    Waiting,
    Stopped,
}

/// Whether an app is part of the core system or externally loaded.
/// Only external apps are created and torn down by this module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AppType {
    #[default]
    Core,
    External,
}

/// Recovery action taken when an app's task raises an exception.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExceptionAction {
    /// Restart only the offending app.
    #[default]
    RestartApp,
    /// Restart the whole processor.
    ProcRestart,
}

/// Control request written by command processors and observed by the
/// background scanner. Every value above `AppRun` requests a teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
#[repr(u32)]
pub enum ControlRequest {
    #[default]
    AppRun = 0,
    AppExit = 1,
    AppError = 2,
    SysDelete = 3,
    SysRestart = 4,
    SysReload = 5,
    SysException = 6,
}

impl TryFrom<u32> for ControlRequest {
    type Error = u32;

    /// Convert a raw command value, rejecting anything outside the
    /// known request set at the ingress boundary.
    fn try_from(raw: u32) -> Result<Self, u32> {
        match raw {
            0 => Ok(ControlRequest::AppRun),
            1 => Ok(ControlRequest::AppExit),
            2 => Ok(ControlRequest::AppError),
            3 => Ok(ControlRequest::SysDelete),
            4 => Ok(ControlRequest::SysRestart),
            5 => Ok(ControlRequest::SysReload),
            6 => Ok(ControlRequest::SysException),
            other => Err(other),
        }
    }
}

/// Immutable-after-creation startup parameters of one app. A pre-teardown
/// snapshot of this struct is what restart and reload re-create from.
#[derive(Debug, Clone, Default)]
pub struct StartParams {
    pub name: String,
    pub entry_point: String,
    pub file_name: String,
    pub stack_size: u32,
    pub priority: u32,
    pub exception_action: ExceptionAction,
    pub start_address: StartAddress,
    pub module: ModuleHandle,
}

/// Pending control action and its countdown timer, in milliseconds.
#[derive(Debug, Clone, Copy, Default)]
pub struct ControlReq {
    pub request: ControlRequest,
    pub timer_millis: u32,
}

/// One application slot.
#[derive(Debug, Clone, Default)]
pub struct AppRecord {
    pub state: AppState,
    pub app_type: AppType,
    pub start_params: StartParams,
    pub main_task: TaskHandle,
    pub main_task_name: String,
    pub control: ControlReq,
}

// ── Library and task records ────────────────────────────────

/// One shared-library slot.
#[derive(Debug, Clone, Default)]
pub struct LibRecord {
    pub in_use: bool,
    pub name: String,
    pub module: Option<ModuleHandle>,
}

/// One task record, indexed by the port's task-index conversion. The
/// `owning_app` back-edge is non-owning; the app owns the task.
#[derive(Debug, Clone, Default)]
pub struct TaskRecord {
    pub in_use: bool,
    pub owning_app: usize,
    pub task: TaskHandle,
    pub name: String,
    pub execution_counter: u32,
}

/// Background-scanner bookkeeping, updated under the global lock.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScannerState {
    pub pending_app_state_changes: u32,
    pub background_timer: u32,
    pub last_scan_command_count: u32,
}

// ── Shared state ────────────────────────────────────────────

/// Everything guarded by the executive's global lock.
pub struct ExecState {
    pub apps: [AppRecord; config::MAX_APPLICATIONS],
    pub libs: [LibRecord; config::MAX_LIBRARIES],
    pub tasks: [TaskRecord; config::MAX_TASKS],
    pub registered_external_apps: u32,
    pub registered_libs: u32,
    pub registered_tasks: u32,
    pub scanner: ScannerState,
}

impl ExecState {
    pub fn new() -> Self {
        Self {
            apps: array::from_fn(|_| AppRecord::default()),
            libs: array::from_fn(|_| LibRecord::default()),
            tasks: array::from_fn(|_| TaskRecord::default()),
            registered_external_apps: 0,
            registered_libs: 0,
            registered_tasks: 0,
            scanner: ScannerState::default(),
        }
    }

    /// Reserve the first free app slot: zero the record and mark it
    /// `EarlyInit` so no concurrent creator can claim it. Returns the
    /// slot index, or `None` when the table is full.
    pub fn reserve_app_slot(&mut self) -> Option<usize> {
        for (i, app) in self.apps.iter_mut().enumerate() {
            if app.state == AppState::Undefined {
                *app = AppRecord::default();
                app.state = AppState::EarlyInit;
                return Some(i);
            }
        }
        None
    }

    /// Return a reserved or live slot to the free pool.
    pub fn release_app_slot(&mut self, slot: usize) {
        self.apps[slot].state = AppState::Undefined;
    }

    /// Index of the live app with the given name, if any.
    pub fn find_app_by_name(&self, name: &str) -> Option<usize> {
        self.apps
            .iter()
            .position(|a| a.state != AppState::Undefined && a.start_params.name == name)
    }

    /// Number of registered tasks owned by `app_slot` besides its main task.
    pub fn child_task_count(&self, app_slot: usize, main_task: TaskHandle) -> u32 {
        self.tasks
            .iter()
            .filter(|t| t.in_use && t.owning_app == app_slot && t.task != main_task)
            .count() as u32
    }
}

impl Default for ExecState {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ───────────────────────────────────────────────────
