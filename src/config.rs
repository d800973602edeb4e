//! Executive configuration constants.
//!
//! Compile-time platform configuration. Values here size the slotted
//! registries, bound names and paths, and set the background-scan cadence.

/// Maximum number of application slots.
pub const MAX_APPLICATIONS: usize = 32;

/// Maximum number of shared-library slots.
pub const MAX_LIBRARIES: usize = 10;

/// Maximum number of task records (sized to the OS task table).
pub const MAX_TASKS: usize = 64;

/// Maximum length of an app/library/task/symbol name, in bytes.
pub const MAX_API_NAME: usize = 20;

/// Maximum length of a filesystem path, in bytes.
pub const MAX_PATH_LEN: usize = 64;

/// Background scan period in milliseconds.
pub const APP_SCAN_RATE_MS: u32 = 1000;

/// Number of scan periods an app in WAITING is given to exit on its own
/// before its resources are forcibly reclaimed.
pub const APP_KILL_TIMEOUT: u32 = 5;

/// Cumulative byte capacity of one startup-script record.
pub const STARTUP_RECORD_CAP: usize = 128;

/// Maximum number of tokens in one startup-script record.
pub const STARTUP_MAX_TOKENS: usize = 16;

/// Startup script location on the volatile disk, tried first after a
/// processor reset.
pub const VOLATILE_STARTUP_PATH: &str = "/ram/startup.scr";

/// Number of system-log lines retained before the oldest are evicted.
pub const SYSLOG_CAPACITY: usize = 256;
