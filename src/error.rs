//! Executive Error Types
//!
//! Defines all error kinds produced by the app management core.
//!
//! Creation failures are rolled back locally and reported to the caller.
//! Teardown failures are logged, aggregated into a worst-case status, and
//! never abort a cleanup mid-way.

use core::fmt;

/// Executive error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecError {
    /// App could not be created: slot exhausted, module load failed,
    /// entry symbol missing, or task creation failed.
    AppCreate,
    /// Library could not be loaded: slot exhausted or init function failed.
    LoadLib,
    /// Null/empty input or over-length name or path.
    BadArgument,
    /// One or more OS objects could not be deleted during cleanup.
    AppCleanup,
    /// The primary task could not be deleted.
    TaskDelete,
    /// A child task refused to delete during resource reclamation.
    ChildTaskDelete,
    /// A queue refused to delete during resource reclamation.
    QueueDelete,
    /// A binary semaphore refused to delete during resource reclamation.
    BinSemDelete,
    /// A counting semaphore refused to delete during resource reclamation.
    CountSemDelete,
    /// A mutex refused to delete during resource reclamation.
    MutSemDelete,
    /// A timer refused to delete during resource reclamation.
    TimerDelete,
}

impl fmt::Display for ExecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecError::AppCreate => write!(f, "app create failed"),
            ExecError::LoadLib => write!(f, "library load failed"),
            ExecError::BadArgument => write!(f, "bad argument"),
            ExecError::AppCleanup => write!(f, "app cleanup incomplete"),
            ExecError::TaskDelete => write!(f, "task delete failed"),
            ExecError::ChildTaskDelete => write!(f, "child task delete failed"),
            ExecError::QueueDelete => write!(f, "queue delete failed"),
            ExecError::BinSemDelete => write!(f, "binary semaphore delete failed"),
            ExecError::CountSemDelete => write!(f, "counting semaphore delete failed"),
            ExecError::MutSemDelete => write!(f, "mutex delete failed"),
            ExecError::TimerDelete => write!(f, "timer delete failed"),
        }
    }
}
