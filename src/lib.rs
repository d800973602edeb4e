//! Flight-Software Executive — Application Lifecycle Core
//!
//! Loads external application modules from a filesystem, binds their
//! entry points, creates their primary tasks, tracks their runtime
//! state, and performs controlled teardown with recovery of every owned
//! OS resource.
//!
//! ```text
//! startup script ──▶ startup ──▶ creation ──▶ registry ◀─── info
//!                                   │            ▲
//!                                   ▼            │ (global lock)
//! commands ──▶ control request ──▶ scanner ──▶ control ──▶ reclaim
//! ```
//!
//! The operating system sits behind the [`osal::OsPort`] trait; everything
//! above it runs unchanged on a flight target or against
//! [`osal::mock::MockOs`] on the host. All shared state is one structure
//! behind one lock, and a slot index is a record's identity for as long
//! as the record is live.

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

extern crate alloc;

pub mod config;
pub mod control;
pub mod creation;
pub mod error;
pub mod events;
pub mod executive;
pub mod info;
pub mod osal;
pub mod reclaim;
pub mod registry;
pub mod scanner;
pub mod startup;
pub mod syslog;

pub use creation::LibLoadOutcome;
pub use error::ExecError;
pub use events::{Event, EventId, EventSink, NullSink, RecordingSink, Severity};
pub use executive::Executive;
pub use info::AppInfo;
pub use reclaim::{CleanupHook, FnCleanupHook};
pub use registry::{
    AppRecord, AppState, AppType, ControlRequest, ExceptionAction, LibRecord, StartParams,
    TaskRecord,
};
pub use startup::ResetType;
pub use syslog::SysLog;

use spin::Once;

static EXECUTIVE: Once<Executive> = Once::new();

/// Install the process-wide executive instance. The first call wins;
/// later calls return the already-installed instance.
pub fn init(executive: Executive) -> &'static Executive {
    EXECUTIVE.call_once(|| executive)
}

/// The process-wide executive, if [`init`] has run.
pub fn global() -> Option<&'static Executive> {
    EXECUTIVE.get()
}
