//! Mock OS port for host testing
//!
//! Provides a simulated loader, symbol table, task table, object table,
//! and file store so the executive's logic can be tested without a real
//! kernel. All bookkeeping is observable: module load/unload counts,
//! created tasks, and per-task objects, plus failure injection for every
//! fallible call.

use alloc::collections::{BTreeMap, BTreeSet};
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use spin::Mutex;

use super::{
    FileHandle, ModuleAddressInfo, ModuleHandle, ObjectId, ObjectKind, OsError, OsPort,
    StartAddress, TaskHandle,
};
use crate::config;

/// One simulated OS object owned by a task.
#[derive(Debug, Clone)]
struct MockObject {
    owner: TaskHandle,
    kind: ObjectKind,
    /// Number of delete attempts left to refuse; `u32::MAX` means the
    /// object is permanently stuck.
    fail_deletes: u32,
}

#[derive(Default)]
struct MockState {
    symbols: BTreeMap<String, usize>,
    symbol_failures: BTreeSet<String>,

    modules: BTreeMap<u32, String>,
    next_module: u32,
    unloads: Vec<u32>,
    load_failures: BTreeSet<String>,
    invalid_module_info: BTreeSet<u32>,

    tasks: BTreeMap<u32, String>,
    next_task: u32,
    fail_task_create: bool,
    task_delete_failures: BTreeSet<u32>,

    objects: BTreeMap<u32, MockObject>,
    next_object: u32,
    enumeration_passes: u32,

    lib_init_failures: BTreeSet<usize>,
    lib_init_calls: Vec<(usize, usize)>,

    files: BTreeMap<String, Vec<u8>>,
    open_files: BTreeMap<u32, (String, usize)>,
    next_file: u32,
}

/// Mock implementation of [`OsPort`].
pub struct MockOs {
    state: Mutex<MockState>,
}

impl Default for MockOs {
    fn default() -> Self {
        Self::new()
    }
}

impl MockOs {
    pub fn new() -> Self {
        let mut state = MockState::default();
        state.next_module = 1;
        state.next_task = 1;
        state.next_object = 1000;
        state.next_file = 1;
        Self {
            state: Mutex::new(state),
        }
    }

    // ── Test setup ──────────────────────────────────────────

    /// Define a resolvable symbol.
    pub fn add_symbol(&self, name: &str, address: usize) {
        self.state.lock().symbols.insert(name.to_string(), address);
    }

    /// Make lookups of `name` fail even if the symbol is defined.
    pub fn fail_symbol(&self, name: &str) {
        self.state.lock().symbol_failures.insert(name.to_string());
    }

    /// Make loads of `file_name` fail.
    pub fn fail_module_load(&self, file_name: &str) {
        self.state.lock().load_failures.insert(file_name.to_string());
    }

    /// Choose the handle value assigned to the next loaded module.
    pub fn set_next_module_handle(&self, handle: u32) {
        self.state.lock().next_module = handle;
    }

    /// Make `module_info` report no valid addresses for `module`.
    pub fn invalidate_module_info(&self, module: ModuleHandle) {
        self.state.lock().invalid_module_info.insert(module.0);
    }

    /// Make every task creation fail.
    pub fn fail_task_create(&self, fail: bool) {
        self.state.lock().fail_task_create = fail;
    }

    /// Make deletion of a specific task fail.
    pub fn fail_task_delete(&self, task: TaskHandle) {
        self.state.lock().task_delete_failures.insert(task.0);
    }

    /// Create an object owned by `owner`.
    pub fn add_object(&self, owner: TaskHandle, kind: ObjectKind) -> ObjectId {
        let mut st = self.state.lock();
        let id = st.next_object;
        st.next_object += 1;
        st.objects.insert(
            id,
            MockObject {
                owner,
                kind,
                fail_deletes: 0,
            },
        );
        ObjectId(id)
    }

    /// Mark an object as permanently refusing deletion.
    pub fn set_object_stuck(&self, id: ObjectId, stuck: bool) {
        if let Some(obj) = self.state.lock().objects.get_mut(&id.0) {
            obj.fail_deletes = if stuck { u32::MAX } else { 0 };
        }
    }

    /// Make the next `count` delete attempts on an object fail.
    pub fn fail_object_deletes(&self, id: ObjectId, count: u32) {
        if let Some(obj) = self.state.lock().objects.get_mut(&id.0) {
            obj.fail_deletes = count;
        }
    }

    /// Make a library init entry at `address` report failure.
    pub fn fail_library_init(&self, address: usize) {
        self.state.lock().lib_init_failures.insert(address);
    }

    /// Install a file readable through the port.
    pub fn add_file(&self, path: &str, content: &[u8]) {
        self.state
            .lock()
            .files
            .insert(path.to_string(), content.to_vec());
    }

    // ── Observers ───────────────────────────────────────────

    /// Number of modules currently loaded.
    pub fn loaded_module_count(&self) -> usize {
        self.state.lock().modules.len()
    }

    /// Whether a module registered under `name` is currently loaded.
    pub fn module_loaded(&self, name: &str) -> bool {
        self.state.lock().modules.values().any(|n| n == name)
    }

    /// How many times `module` has been unloaded.
    pub fn unload_count(&self, module: ModuleHandle) -> usize {
        self.state
            .lock()
            .unloads
            .iter()
            .filter(|&&h| h == module.0)
            .count()
    }

    /// Whether a task handle names a live task.
    pub fn task_alive(&self, task: TaskHandle) -> bool {
        self.state.lock().tasks.contains_key(&task.0)
    }

    /// Number of live objects owned by `owner`.
    pub fn object_count(&self, owner: TaskHandle) -> usize {
        self.state
            .lock()
            .objects
            .values()
            .filter(|o| o.owner == owner)
            .count()
    }

    /// Number of `for_each_object` passes performed so far.
    pub fn enumeration_passes(&self) -> u32 {
        self.state.lock().enumeration_passes
    }

    /// Every `(entry address, lib slot)` init invocation so far.
    pub fn lib_init_calls(&self) -> Vec<(usize, usize)> {
        self.state.lock().lib_init_calls.clone()
    }
}

impl OsPort for MockOs {
    fn module_load(&self, module_name: &str, file_name: &str) -> Result<ModuleHandle, OsError> {
        let mut st = self.state.lock();
        if st.load_failures.contains(file_name) {
            return Err(OsError(-1));
        }
        let handle = st.next_module;
        st.next_module += 1;
        st.modules.insert(handle, module_name.to_string());
        Ok(ModuleHandle(handle))
    }

    fn module_unload(&self, module: ModuleHandle) -> Result<(), OsError> {
        let mut st = self.state.lock();
        st.unloads.push(module.0);
        if st.modules.remove(&module.0).is_some() {
            Ok(())
        } else {
            Err(OsError(-5))
        }
    }

    fn symbol_lookup(&self, symbol: &str) -> Result<StartAddress, OsError> {
        let st = self.state.lock();
        if st.symbol_failures.contains(symbol) {
            return Err(OsError(-8));
        }
        st.symbols
            .get(symbol)
            .map(|&a| StartAddress(a))
            .ok_or(OsError(-8))
    }

    fn module_info(&self, module: ModuleHandle) -> Result<ModuleAddressInfo, OsError> {
        let st = self.state.lock();
        if !st.modules.contains_key(&module.0) {
            return Err(OsError(-5));
        }
        if st.invalid_module_info.contains(&module.0) {
            return Ok(ModuleAddressInfo::default());
        }
        let base = 0x1_0000 * module.0 as usize;
        Ok(ModuleAddressInfo {
            code_address: base,
            code_size: 0x4000,
            data_address: base + 0x4000,
            data_size: 0x1000,
            bss_address: base + 0x5000,
            bss_size: 0x800,
            valid: true,
        })
    }

    fn task_create(
        &self,
        name: &str,
        _entry: StartAddress,
        _stack_size: u32,
        _priority: u32,
        _fp_enabled: bool,
    ) -> Result<TaskHandle, OsError> {
        let mut st = self.state.lock();
        if st.fail_task_create {
            return Err(OsError(-17));
        }
        let handle = st.next_task;
        st.next_task += 1;
        st.tasks.insert(handle, name.to_string());
        Ok(TaskHandle(handle))
    }

    fn task_index(&self, task: TaskHandle) -> Result<usize, OsError> {
        Ok(task.0 as usize % config::MAX_TASKS)
    }

    fn for_each_object(&self, creator: TaskHandle, visit: &mut dyn FnMut(ObjectId)) {
        // Snapshot the id set first: the visit callback re-enters this
        // port to delete objects, so the lock cannot be held across it.
        let ids: Vec<u32> = {
            let mut st = self.state.lock();
            st.enumeration_passes += 1;
            st.objects
                .iter()
                .filter(|(_, o)| o.owner == creator)
                .map(|(&id, _)| id)
                .collect()
        };
        for id in ids {
            visit(ObjectId(id));
        }
    }

    fn identify_object(&self, id: ObjectId) -> ObjectKind {
        let st = self.state.lock();
        if let Some(obj) = st.objects.get(&id.0) {
            obj.kind
        } else if st.tasks.contains_key(&id.0) {
            ObjectKind::Task
        } else {
            ObjectKind::Unknown
        }
    }

    fn delete_object(&self, kind: ObjectKind, id: ObjectId) -> Result<(), OsError> {
        let mut st = self.state.lock();
        if let Some(obj) = st.objects.get_mut(&id.0) {
            if obj.fail_deletes > 0 {
                if obj.fail_deletes != u32::MAX {
                    obj.fail_deletes -= 1;
                }
                return Err(OsError(-21));
            }
            st.objects.remove(&id.0);
            return Ok(());
        }
        if kind == ObjectKind::Task {
            if st.task_delete_failures.contains(&id.0) {
                return Err(OsError(-22));
            }
            if st.tasks.remove(&id.0).is_some() {
                return Ok(());
            }
        }
        Err(OsError(-20))
    }

    fn call_library_init(&self, entry: StartAddress, lib_slot: usize) -> Result<(), OsError> {
        let mut st = self.state.lock();
        st.lib_init_calls.push((entry.0, lib_slot));
        if st.lib_init_failures.contains(&entry.0) {
            Err(OsError(-30))
        } else {
            Ok(())
        }
    }

    fn open(&self, path: &str) -> Result<FileHandle, OsError> {
        let mut st = self.state.lock();
        if !st.files.contains_key(path) {
            return Err(OsError(-2));
        }
        let fd = st.next_file;
        st.next_file += 1;
        st.open_files.insert(fd, (path.to_string(), 0));
        Ok(FileHandle(fd))
    }

    fn read(&self, file: FileHandle, buf: &mut [u8]) -> Result<usize, OsError> {
        let mut st = self.state.lock();
        let (path, pos) = match st.open_files.get(&file.0) {
            Some(open) => open.clone(),
            None => return Err(OsError(-4)),
        };
        let content = match st.files.get(&path) {
            Some(c) => c,
            None => return Err(OsError(-4)),
        };
        if pos >= content.len() {
            return Ok(0);
        }
        let n = buf.len().min(content.len() - pos);
        buf[..n].copy_from_slice(&content[pos..pos + n]);
        st.open_files.insert(file.0, (path, pos + n));
        Ok(n)
    }

    fn close(&self, file: FileHandle) {
        self.state.lock().open_files.remove(&file.0);
    }
}

// ── Tests ───────────────────────────────────────────────────
