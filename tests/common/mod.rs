//! Shared fixtures for the integration and property tests.

use std::sync::Arc;

use fsw_exec::osal::mock::MockOs;
use fsw_exec::{ExceptionAction, Executive, RecordingSink};

/// A fresh executive wired to a mock OS and a recording event sink.
pub fn new_exec() -> (Arc<MockOs>, Arc<RecordingSink>, Executive) {
    let os = Arc::new(MockOs::new());
    let sink = RecordingSink::new();
    let exec = Executive::new(os.clone(), sink.clone());
    (os, sink, exec)
}

/// Create a running app the way the startup script would.
#[allow(dead_code)]
pub fn create_app(exec: &Executive, os: &MockOs, name: &str) -> usize {
    os.add_symbol("Main", 0xDEAD);
    exec.app_create(
        "/cf/x.so",
        "Main",
        name,
        100,
        4096,
        ExceptionAction::RestartApp,
    )
    .unwrap()
}
