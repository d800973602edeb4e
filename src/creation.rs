//! App and Library Creation
//!
//! Multi-stage construction with strict rollback. An app creation runs
//! slot reserve → module load → entry resolve → record populate → task
//! create → task registration; the first failing stage compensates for
//! everything done so far and returns the slot to the free pool.
//!
//! Library loading reserves its slot first and then funnels every
//! outcome through a single commit-or-rollback epilogue; after the
//! reservation there are no early returns.

use alloc::string::ToString;

use crate::config;
use crate::error::ExecError;
use crate::executive::Executive;
use crate::osal::StartAddress;
use crate::registry::{
    AppState, AppType, ControlReq, ControlRequest, ExceptionAction, StartParams, TaskRecord,
};
use crate::syslog::es_log;

/// Result of a successful library load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LibLoadOutcome {
    /// The library was loaded into this slot.
    Loaded(usize),
    /// A library with this name was already resident in this slot.
    /// Informational, not an error.
    AlreadyLoaded(usize),
}

impl LibLoadOutcome {
    pub fn slot(self) -> usize {
        match self {
            LibLoadOutcome::Loaded(slot) | LibLoadOutcome::AlreadyLoaded(slot) => slot,
        }
    }
}

impl Executive {
    /// Load an application module, resolve its entry point, and create
    /// its primary task. Returns the app's slot index.
    pub fn app_create(
        &self,
        file_name: &str,
        entry_point: &str,
        app_name: &str,
        priority: u32,
        stack_size: u32,
        exception_action: ExceptionAction,
    ) -> Result<usize, ExecError> {
        if file_name.is_empty() || file_name.len() >= config::MAX_PATH_LEN {
            return Err(ExecError::BadArgument);
        }
        if app_name.is_empty() || app_name.len() >= config::MAX_API_NAME {
            return Err(ExecError::BadArgument);
        }
        if entry_point.is_empty() || entry_point.len() >= config::MAX_API_NAME {
            return Err(ExecError::BadArgument);
        }

        // Stage 1: reserve a slot. EarlyInit marks it claimed before any
        // kernel resource exists, so concurrent creators see disjoint slots.
        let slot = {
            let mut st = self.state();
            if st.find_app_by_name(app_name).is_some() {
                drop(st);
                es_log!(
                    self.syslog(),
                    "Startup: app name {} already in use",
                    app_name
                );
                return Err(ExecError::AppCreate);
            }
            match st.reserve_app_slot() {
                Some(slot) => slot,
                None => {
                    drop(st);
                    es_log!(self.syslog(), "Startup: no free application slots available");
                    return Err(ExecError::AppCreate);
                }
            }
        };

        // Stage 2: load the module image, lock released.
        let module = match self.os().module_load(app_name, file_name) {
            Ok(module) => module,
            Err(e) => {
                es_log!(
                    self.syslog(),
                    "Startup: could not load application file {}: {}",
                    file_name,
                    e
                );
                self.state().release_app_slot(slot);
                return Err(ExecError::AppCreate);
            }
        };

        // Stage 3: resolve the entry point, lock released.
        let start_address = match self.os().symbol_lookup(entry_point) {
            Ok(addr) => addr,
            Err(e) => {
                es_log!(
                    self.syslog(),
                    "Startup: could not find symbol {}: {}",
                    entry_point,
                    e
                );
                self.state().release_app_slot(slot);
                // the image must not keep consuming memory
                if let Err(e) = self.os().module_unload(module) {
                    es_log!(
                        self.syslog(),
                        "Startup: failed to unload app {}: {}",
                        app_name,
                        e
                    );
                }
                return Err(ExecError::AppCreate);
            }
        };

        // Stages 4-6 run under the lock so the populated record and its
        // task registration appear atomically to every other reader.
        let mut st = self.state();

        let app = &mut st.apps[slot];
        app.app_type = AppType::External;
        app.start_params = StartParams {
            name: app_name.to_string(),
            entry_point: entry_point.to_string(),
            file_name: file_name.to_string(),
            stack_size,
            priority,
            exception_action,
            start_address,
            module,
        };
        app.main_task_name = app_name.to_string();
        app.control = ControlReq {
            request: ControlRequest::AppRun,
            timer_millis: 0,
        };
        app.state = AppState::LateInit;

        // Stage 5: create the primary task with the FP context enabled.
        let task = match self
            .os()
            .task_create(app_name, start_address, stack_size, priority, true)
        {
            Ok(task) => task,
            Err(e) => {
                es_log!(
                    self.syslog(),
                    "Startup: task create for {} failed: {}",
                    app_name,
                    e
                );
                st.release_app_slot(slot);
                drop(st);
                if let Err(e) = self.os().module_unload(module) {
                    es_log!(
                        self.syslog(),
                        "Startup: failed to unload app {}: {}",
                        app_name,
                        e
                    );
                }
                return Err(ExecError::AppCreate);
            }
        };
        st.apps[slot].main_task = task;

        // Stage 6: register the task record under the task's table index.
        match self.os().task_index(task) {
            Ok(index) if index < st.tasks.len() => {
                if st.tasks[index].in_use {
                    // stale record from an earlier leak; last writer wins
                    es_log!(
                        self.syslog(),
                        "Startup: task table slot {} already in use at task creation",
                        index
                    );
                }
                st.tasks[index] = TaskRecord {
                    in_use: true,
                    owning_app: slot,
                    task,
                    name: app_name.to_string(),
                    execution_counter: 0,
                };
            }
            _ => {
                es_log!(
                    self.syslog(),
                    "Startup: no task table index for {}",
                    app_name
                );
            }
        }

        st.registered_tasks += 1;
        st.registered_external_apps += 1;
        st.apps[slot].state = AppState::Running;
        drop(st);

        es_log!(self.syslog(), "Startup: {} loaded and created", app_name);
        Ok(slot)
    }

    /// Load a shared library and run its init function, if it names one.
    ///
    /// `file_name` is `None` for statically linked libraries. An
    /// `entry_point` of `None` or the literal `"NULL"` means the library
    /// needs no init call.
    pub fn load_library(
        &self,
        file_name: Option<&str>,
        entry_point: Option<&str>,
        lib_name: &str,
    ) -> Result<LibLoadOutcome, ExecError> {
        if lib_name.is_empty() || lib_name.len() >= config::MAX_API_NAME {
            return Err(ExecError::BadArgument);
        }
        if let Some(file) = file_name {
            if file.len() >= config::MAX_PATH_LEN {
                return Err(ExecError::BadArgument);
            }
        }

        // Stage 1: one pass both de-duplicates the name and finds the
        // first free slot, atomically under the lock.
        let slot = {
            let mut st = self.state();
            let mut free = None;
            let mut existing = None;
            for (i, lib) in st.libs.iter().enumerate() {
                if lib.in_use {
                    if lib.name == lib_name {
                        existing = Some(i);
                        break;
                    }
                } else if free.is_none() {
                    free = Some(i);
                }
            }
            if let Some(i) = existing {
                return Ok(LibLoadOutcome::AlreadyLoaded(i));
            }
            let Some(i) = free else {
                drop(st);
                es_log!(self.syslog(), "Startup: no free library slots available");
                return Err(ExecError::LoadLib);
            };
            st.libs[i].in_use = true;
            st.libs[i].name = lib_name.to_string();
            st.libs[i].module = None;
            i
        };

        // The slot is now reserved and must be freed on any failure
        // below. No early returns: every path reaches the epilogue.
        let mut status: Result<(), ExecError> = Ok(());
        let mut loaded_module = None;
        let mut init_entry: Option<StartAddress> = None;

        // Stage 2: optional module load.
        if status.is_ok() {
            if let Some(file) = file_name {
                match self.os().module_load(lib_name, file) {
                    Ok(module) => loaded_module = Some(module),
                    Err(e) => {
                        es_log!(
                            self.syslog(),
                            "Startup: could not load shared library {}: {}",
                            file,
                            e
                        );
                        status = Err(ExecError::LoadLib);
                    }
                }
            }
        }

        // Stage 3: optional entry resolve. The literal "NULL" supports
        // startup scripts whose entry-point field cannot be empty.
        if status.is_ok() {
            if let Some(entry) = entry_point {
                if entry != "NULL" {
                    match self.os().symbol_lookup(entry) {
                        Ok(addr) => init_entry = Some(addr),
                        Err(e) => {
                            es_log!(
                                self.syslog(),
                                "Startup: could not find library init symbol {}: {}",
                                entry,
                                e
                            );
                            status = Err(ExecError::LoadLib);
                        }
                    }
                }
            }
        }

        // Stage 4: optional init call, on the caller's task. A failing
        // init is a permanent load failure.
        if status.is_ok() {
            if let Some(entry) = init_entry {
                if let Err(e) = self.os().call_library_init(entry, slot) {
                    es_log!(self.syslog(), "Startup: library init error: {}", e);
                    status = Err(ExecError::LoadLib);
                }
            }
        }

        // Epilogue: commit, or compensate in reverse order.
        match status {
            Ok(()) => {
                let mut st = self.state();
                st.libs[slot].module = loaded_module;
                st.registered_libs += 1;
                Ok(LibLoadOutcome::Loaded(slot))
            }
            Err(e) => {
                if let Some(module) = loaded_module {
                    let _ = self.os().module_unload(module);
                }
                self.state().libs[slot].in_use = false;
                Err(e)
            }
        }
    }

    /// Create a secondary task owned by a live app and register it in
    /// the task table.
    pub fn create_child_task(
        &self,
        app_slot: usize,
        task_name: &str,
        entry: StartAddress,
        stack_size: u32,
        priority: u32,
    ) -> Result<crate::osal::TaskHandle, ExecError> {
        if task_name.is_empty() || task_name.len() >= config::MAX_API_NAME {
            return Err(ExecError::BadArgument);
        }
        {
            let st = self.state();
            let live = st
                .apps
                .get(app_slot)
                .map(|a| a.state != AppState::Undefined)
                .unwrap_or(false);
            if !live {
                return Err(ExecError::BadArgument);
            }
        }

        let task = self
            .os()
            .task_create(task_name, entry, stack_size, priority, false)
            .map_err(|e| {
                es_log!(
                    self.syslog(),
                    "Child task create for {} failed: {}",
                    task_name,
                    e
                );
                ExecError::AppCreate
            })?;

        let mut st = self.state();
        match self.os().task_index(task) {
            Ok(index) if index < st.tasks.len() => {
                if st.tasks[index].in_use {
                    es_log!(
                        self.syslog(),
                        "Child task table slot {} already in use",
                        index
                    );
                }
                st.tasks[index] = TaskRecord {
                    in_use: true,
                    owning_app: app_slot,
                    task,
                    name: task_name.to_string(),
                    execution_counter: 0,
                };
            }
            _ => {
                es_log!(
                    self.syslog(),
                    "Child task: no task table index for {}",
                    task_name
                );
            }
        }
        st.registered_tasks += 1;
        Ok(task)
    }
}

// ── Tests ───────────────────────────────────────────────────
