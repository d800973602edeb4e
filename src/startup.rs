//! Startup Script Processing
//!
//! Reads the startup script one byte at a time through the OS port and
//! dispatches each record to the app or library creator.
//!
//! # Grammar
//!
//! ```text
//! record  := token ( ',' token )* ';'
//! token   := bytes with value > 0x20, excluding ',' ';' '!'
//! file    := record* '!'
//! ```
//!
//! Whitespace (any byte <= 0x20) is ignored everywhere. A record needs at
//! least eight tokens: entry type, file name, entry point, app name,
//! priority, stack size, one unused field, and the exception action.
//! Records that are too short, too long, or of unknown entry type are
//! logged and skipped; parsing continues with the next record.

use alloc::string::String;
use alloc::vec::Vec;

use crate::config;
use crate::error::ExecError;
use crate::events::{EventId, Severity};
use crate::executive::Executive;
use crate::registry::ExceptionAction;
use crate::syslog::es_log;

/// Kind of reset that led to this startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetType {
    /// Full power-on: volatile storage is gone.
    PowerOn,
    /// Processor reset: volatile storage survived and may carry a
    /// replacement startup script.
    Processor,
}

impl Executive {
    /// Load and start every app and library named in the startup script.
    ///
    /// After a processor reset the volatile script location is tried
    /// first; on a power-on reset, or when the volatile file cannot be
    /// opened, the non-volatile `start_file_path` is used.
    pub fn start_applications(&self, reset: ResetType, start_file_path: &str) {
        let mut file = None;

        if reset == ResetType::Processor {
            match self.os().open(config::VOLATILE_STARTUP_PATH) {
                Ok(fd) => {
                    es_log!(
                        self.syslog(),
                        "Startup: opened startup file: {}",
                        config::VOLATILE_STARTUP_PATH
                    );
                    file = Some(fd);
                }
                Err(_) => {
                    es_log!(
                        self.syslog(),
                        "Startup: cannot open volatile startup file, trying nonvolatile"
                    );
                }
            }
        }

        if file.is_none() {
            match self.os().open(start_file_path) {
                Ok(fd) => {
                    es_log!(
                        self.syslog(),
                        "Startup: opened startup file: {}",
                        start_file_path
                    );
                    file = Some(fd);
                }
                Err(e) => {
                    es_log!(
                        self.syslog(),
                        "Startup: cannot open startup file {}: {}",
                        start_file_path,
                        e
                    );
                }
            }
        }

        let Some(fd) = file else {
            return;
        };

        let mut tokens: Vec<String> = Vec::new();
        let mut current = String::new();
        let mut record_len = 0usize;
        let mut too_long = false;
        let mut byte = [0u8; 1];

        loop {
            match self.os().read(fd, &mut byte) {
                Err(e) => {
                    es_log!(self.syslog(), "Startup: error reading startup file: {}", e);
                    break;
                }
                Ok(0) => break,
                Ok(_) => {}
            }
            let c = byte[0];

            if c == b'!' {
                // end-of-file sentinel
                break;
            }
            if c <= b' ' {
                continue;
            }

            if c == b',' {
                // the delimiter costs one byte of record capacity
                if record_len >= config::STARTUP_RECORD_CAP {
                    too_long = true;
                }
                record_len += 1;
                if tokens.len() < config::STARTUP_MAX_TOKENS - 1 {
                    tokens.push(core::mem::take(&mut current));
                } else {
                    current.clear();
                }
            } else if c != b';' {
                if record_len < config::STARTUP_RECORD_CAP {
                    current.push(c as char);
                } else {
                    too_long = true;
                }
                record_len += 1;
            } else {
                if too_long {
                    es_log!(
                        self.syslog(),
                        "Startup: startup record is too long: {} bytes",
                        record_len
                    );
                    too_long = false;
                } else {
                    tokens.push(core::mem::take(&mut current));
                    let _ = self.parse_file_entry(&tokens);
                }
                tokens.clear();
                current.clear();
                record_len = 0;
            }
        }

        self.os().close(fd);
    }

    /// Dispatch one tokenized startup record.
    pub fn parse_file_entry(&self, tokens: &[String]) -> Result<usize, ExecError> {
        if tokens.len() < 8 {
            es_log!(
                self.syslog(),
                "Startup: invalid startup record: {} tokens",
                tokens.len()
            );
            return Err(ExecError::AppCreate);
        }

        let entry_type = tokens[0].as_str();
        let file_name = tokens[1].as_str();
        let entry_point = tokens[2].as_str();
        let name = tokens[3].as_str();
        let priority = parse_startup_number(&tokens[4]);
        let stack_size = parse_startup_number(&tokens[5]);
        let exception_action = parse_startup_number(&tokens[7]);

        match entry_type {
            "CFE_APP" => {
                es_log!(
                    self.syslog(),
                    "Startup: loading file: {}, APP: {}",
                    file_name,
                    name
                );
                // anything beyond "restart the app" is taken to mean a
                // processor restart
                let action = if exception_action > 0 {
                    ExceptionAction::ProcRestart
                } else {
                    ExceptionAction::RestartApp
                };
                let result =
                    self.app_create(file_name, entry_point, name, priority, stack_size, action);
                if let Err(e) = result {
                    self.send_event(
                        EventId::StartAppErr,
                        Severity::Error,
                        alloc::format!("Failed to start {} from {}: {}.", name, file_name, e),
                    );
                }
                result
            }
            "CFE_LIB" => {
                es_log!(
                    self.syslog(),
                    "Startup: loading shared library: {}",
                    file_name
                );
                let result = self
                    .load_library(Some(file_name), Some(entry_point), name)
                    .map(|outcome| outcome.slot());
                if let Err(e) = result {
                    self.send_event(
                        EventId::StartAppErr,
                        Severity::Error,
                        alloc::format!("Failed to load {} from {}: {}.", name, file_name, e),
                    );
                }
                result
            }
            other => {
                es_log!(
                    self.syslog(),
                    "Startup: unexpected entry type {} in startup file",
                    other
                );
                Err(ExecError::AppCreate)
            }
        }
    }
}

/// Parse an unsigned startup-script number with base auto-detection:
/// `0x` selects hex and a leading `0` selects octal. Parsing stops at
/// the first invalid digit, so trailing garbage is dropped; a token with
/// no leading digits is zero. Deliberately permissive — the startup
/// script is trusted input.
fn parse_startup_number(token: &str) -> u32 {
    let bytes = token.as_bytes();
    let (base, digits): (u32, &[u8]) = if bytes.len() >= 2 && (bytes[..2] == *b"0x" || bytes[..2] == *b"0X")
    {
        (16, &bytes[2..])
    } else if bytes.len() > 1 && bytes[0] == b'0' {
        (8, &bytes[1..])
    } else {
        (10, bytes)
    };

    let mut value: u32 = 0;
    for &b in digits {
        let digit = match (b as char).to_digit(base) {
            Some(d) => d,
            None => break,
        };
        value = value.wrapping_mul(base).wrapping_add(digit);
    }
    value
}

// ── Tests ───────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RecordingSink;
    use crate::osal::mock::MockOs;
    use crate::registry::AppState;
    use alloc::string::ToString;
    use alloc::sync::Arc;

    fn exec_with_script(script: &[u8]) -> (Arc<MockOs>, Executive) {
        let os = Arc::new(MockOs::new());
        os.add_symbol("Main", 0xDEAD);
        os.add_file("/cf/startup.scr", script);
        let exec = Executive::new(os.clone(), RecordingSink::new());
        (os, exec)
    }

    fn tokens(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_script_starts_app_and_library() {
        let (os, exec) = exec_with_script(
            b"CFE_APP, /cf/x.so, Main, APPX, 100, 4096, 0, 0;\n\
              CFE_LIB, /cf/lib.so, NULL, MYLIB, 0, 0, 0, 0;\n\
              !",
        );
        exec.start_applications(ResetType::PowerOn, "/cf/startup.scr");

        assert_eq!(exec.app_state(0), Some(AppState::Running));
        assert_eq!(exec.registered_external_apps(), 1);
        assert_eq!(exec.registered_libs(), 1);
        assert!(os.module_loaded("APPX"));
        assert!(os.module_loaded("MYLIB"));
    }

    #[test]
    fn test_content_after_sentinel_is_ignored() {
        let (_os, exec) = exec_with_script(
            b"CFE_APP, /cf/x.so, Main, APPX, 100, 4096, 0, 0;\n\
              !\n\
              CFE_APP, /cf/y.so, Main, APPY, 100, 4096, 0, 0;",
        );
        exec.start_applications(ResetType::PowerOn, "/cf/startup.scr");

        assert_eq!(exec.registered_external_apps(), 1);
        assert!(exec.find_app_by_name("APPY").is_none());
    }

    #[test]
    fn test_short_record_skipped_and_parsing_continues() {
        let (_os, exec) = exec_with_script(
            b"CFE_APP, /cf/x.so, Main;\n\
              CFE_APP, /cf/x.so, Main, APPX, 100, 4096, 0, 0;\n\
              !",
        );
        exec.start_applications(ResetType::PowerOn, "/cf/startup.scr");

        assert!(exec.syslog().contains("invalid startup record"));
        assert_eq!(exec.registered_external_apps(), 1);
    }

    #[test]
    fn test_overlong_record_dropped_at_terminator() {
        let mut script = Vec::new();
        script.extend_from_slice(b"CFE_APP, /cf/x.so, Main, APPLONG, 100, 4096, 0, ");
        script.extend_from_slice(&[b'9'; config::STARTUP_RECORD_CAP]);
        script.extend_from_slice(b";\nCFE_APP, /cf/x.so, Main, APPX, 100, 4096, 0, 0;\n!");
        let (_os, exec) = exec_with_script(&script);

        exec.start_applications(ResetType::PowerOn, "/cf/startup.scr");

        assert!(exec.syslog().contains("too long"));
        assert!(exec.find_app_by_name("APPLONG").is_none());
        assert_eq!(exec.find_app_by_name("APPX"), Some(0));
    }

    #[test]
    fn test_unknown_entry_type_logged_and_skipped() {
        let (_os, exec) = exec_with_script(
            b"CFE_DRV, /cf/d.so, Main, DRV, 0, 0, 0, 0;\n\
              CFE_APP, /cf/x.so, Main, APPX, 100, 4096, 0, 0;\n\
              !",
        );
        exec.start_applications(ResetType::PowerOn, "/cf/startup.scr");

        assert!(exec.syslog().contains("unexpected entry type"));
        assert_eq!(exec.registered_external_apps(), 1);
    }

    #[test]
    fn test_processor_reset_prefers_volatile_script() {
        let (os, exec) = exec_with_script(
            b"CFE_APP, /cf/x.so, Main, NONVOL, 100, 4096, 0, 0;\n!",
        );
        os.add_file(
            config::VOLATILE_STARTUP_PATH,
            b"CFE_APP, /cf/x.so, Main, VOLAPP, 100, 4096, 0, 0;\n!",
        );

        exec.start_applications(ResetType::Processor, "/cf/startup.scr");

        assert!(exec.find_app_by_name("VOLAPP").is_some());
        assert!(exec.find_app_by_name("NONVOL").is_none());
    }

    #[test]
    fn test_processor_reset_falls_back_to_nonvolatile() {
        let (_os, exec) = exec_with_script(
            b"CFE_APP, /cf/x.so, Main, NONVOL, 100, 4096, 0, 0;\n!",
        );
        exec.start_applications(ResetType::Processor, "/cf/startup.scr");

        assert!(exec.syslog().contains("trying nonvolatile"));
        assert!(exec.find_app_by_name("NONVOL").is_some());
    }

    #[test]
    fn test_power_on_reset_ignores_volatile_script() {
        let (os, exec) = exec_with_script(
            b"CFE_APP, /cf/x.so, Main, NONVOL, 100, 4096, 0, 0;\n!",
        );
        os.add_file(
            config::VOLATILE_STARTUP_PATH,
            b"CFE_APP, /cf/x.so, Main, VOLAPP, 100, 4096, 0, 0;\n!",
        );

        exec.start_applications(ResetType::PowerOn, "/cf/startup.scr");

        assert!(exec.find_app_by_name("NONVOL").is_some());
        assert!(exec.find_app_by_name("VOLAPP").is_none());
    }

    #[test]
    fn test_missing_startup_file_is_logged() {
        let os = Arc::new(MockOs::new());
        let exec = Executive::new(os, RecordingSink::new());
        exec.start_applications(ResetType::PowerOn, "/cf/absent.scr");
        assert!(exec.syslog().contains("cannot open startup file"));
    }

    #[test]
    fn test_exception_action_clamped_to_proc_restart() {
        let (_os, exec) = exec_with_script(
            b"CFE_APP, /cf/x.so, Main, APPX, 100, 4096, 0, 7;\n!",
        );
        exec.start_applications(ResetType::PowerOn, "/cf/startup.scr");

        let st = exec.state();
        assert_eq!(
            st.apps[0].start_params.exception_action,
            ExceptionAction::ProcRestart
        );
    }

    #[test]
    fn test_parse_file_entry_requires_eight_tokens() {
        let os = Arc::new(MockOs::new());
        let exec = Executive::new(os, RecordingSink::new());
        let result = exec.parse_file_entry(&tokens(&[
            "CFE_APP", "/cf/x.so", "Main", "APPX", "100", "4096", "0",
        ]));
        assert_eq!(result, Err(ExecError::AppCreate));
    }

    #[test]
    fn test_parse_startup_number_bases() {
        assert_eq!(parse_startup_number("100"), 100);
        assert_eq!(parse_startup_number("0x20"), 32);
        assert_eq!(parse_startup_number("0X20"), 32);
        assert_eq!(parse_startup_number("010"), 8);
        assert_eq!(parse_startup_number("0"), 0);
        assert_eq!(parse_startup_number(""), 0);
    }

    #[test]
    fn test_parse_startup_number_drops_trailing_garbage() {
        assert_eq!(parse_startup_number("123xyz"), 123);
        assert_eq!(parse_startup_number("0x1fg"), 0x1f);
        assert_eq!(parse_startup_number("xyz"), 0);
    }
}
