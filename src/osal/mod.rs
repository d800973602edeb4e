//! OS Abstraction Port
//!
//! The executive depends on a capability set, not on a concrete operating
//! system: module load/unload, symbol lookup, task creation, per-task
//! object enumeration and deletion, and byte-oriented file reads for the
//! startup script. A flight target implements [`OsPort`] over the real
//! kernel services; [`mock::MockOs`] implements it for host testing.
//!
//! OS failures cross this boundary as opaque numeric [`OsError`] codes;
//! the executive maps them into its own error taxonomy.

pub mod mock;

use core::fmt;

// ── Handles ─────────────────────────────────────────────────

/// Opaque token for a loaded module image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ModuleHandle(pub u32);

/// Opaque token for an OS task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TaskHandle(pub u32);

impl TaskHandle {
    /// The task viewed as a generic OS object, for deletion.
    pub fn as_object(self) -> ObjectId {
        ObjectId(self.0)
    }
}

/// Opaque id of any OS object (task, queue, semaphore, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectId(pub u32);

/// Opaque descriptor for an open byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHandle(pub u32);

/// Resolved address of an entry-point symbol. The executive never
/// dereferences it; the port performs any indirect call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StartAddress(pub usize);

/// Opaque OS status code for a failed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OsError(pub i32);

impl fmt::Display for OsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OS error {}", self.0)
    }
}

// ── Object kinds ────────────────────────────────────────────

/// Kind of an OS object, as reported by [`OsPort::identify_object`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Task,
    Queue,
    BinSem,
    CountSem,
    Mutex,
    Timer,
    Stream,
    Module,
    /// The id does not name a live object.
    Unknown,
}

/// Address layout of a loaded module, from [`OsPort::module_info`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ModuleAddressInfo {
    pub code_address: usize,
    pub code_size: usize,
    pub data_address: usize,
    pub data_size: usize,
    pub bss_address: usize,
    pub bss_size: usize,
    /// False when the underlying loader cannot report addresses.
    pub valid: bool,
}

// ── Port trait ──────────────────────────────────────────────

/// Operating-system services consumed by the executive.
///
/// Every method may be called concurrently from multiple tasks.
/// `for_each_object` must not hold port-internal locks across the visit
/// callback, because the callback deletes objects through this same trait.
pub trait OsPort: Send + Sync {
    /// Load a module image from `file_name`, registering it as `module_name`.
    fn module_load(&self, module_name: &str, file_name: &str) -> Result<ModuleHandle, OsError>;

    /// Unload a previously loaded module image.
    fn module_unload(&self, module: ModuleHandle) -> Result<(), OsError>;

    /// Resolve a global symbol to its load address.
    fn symbol_lookup(&self, symbol: &str) -> Result<StartAddress, OsError>;

    /// Report the address layout of a loaded module.
    fn module_info(&self, module: ModuleHandle) -> Result<ModuleAddressInfo, OsError>;

    /// Create a task that begins execution at `entry`.
    fn task_create(
        &self,
        name: &str,
        entry: StartAddress,
        stack_size: u32,
        priority: u32,
        fp_enabled: bool,
    ) -> Result<TaskHandle, OsError>;

    /// Convert a task handle to a dense index into the task table.
    fn task_index(&self, task: TaskHandle) -> Result<usize, OsError>;

    /// Visit every live object created by `creator`. The visit callback
    /// may delete objects through this port.
    fn for_each_object(&self, creator: TaskHandle, visit: &mut dyn FnMut(ObjectId));

    /// Report the kind of an object id.
    fn identify_object(&self, id: ObjectId) -> ObjectKind;

    /// Delete one object of a known kind.
    fn delete_object(&self, kind: ObjectKind, id: ObjectId) -> Result<(), OsError>;

    /// Invoke a library initialization entry point on the caller's task,
    /// passing the library's slot index.
    fn call_library_init(&self, entry: StartAddress, lib_slot: usize) -> Result<(), OsError>;

    /// Open a file for byte-oriented reading.
    fn open(&self, path: &str) -> Result<FileHandle, OsError>;

    /// Read up to `buf.len()` bytes; `Ok(0)` signals end of file.
    fn read(&self, file: FileHandle, buf: &mut [u8]) -> Result<usize, OsError>;

    /// Close an open file.
    fn close(&self, file: FileHandle);
}
