//! Dispatches parsed USB command lines to the mode manager, settings manager, and storage, and
//! formats the response line. See spec §4.10.
//!
//! Grounded on `execution::handle_command`'s shape: a free function taking every collaborator as
//! an explicit `&mut` parameter rather than a struct that owns them, since the same
//! `ModeManager`/`SettingsManager`/`Storage` are also driven once per tick by the chip-state
//! orchestrator and must not be locked up behind a USB-manager-only owner.

use std::io::{BufRead, Write};

use crate::hal::Hal;
use crate::incoming::{CliCommand, ParserError};
use crate::log::Log;
use crate::mode_manager::ModeManager;
use crate::settings::SettingsManager;
use crate::storage::Storage;

/// Name reserved for a throwaway preview mode: it is applied immediately via `setMode` but never
/// written to flash, so a client can preview a pattern without burning a flash write cycle on
/// every keystroke of an equation editor.
const TRANSIENT_TEST_NAME: &str = "transientTest";

fn path_for(err: &ParserError) -> Option<String> {
    match err {
        ParserError::MissingField(field) => Some((*field).to_string()),
        ParserError::StringTooShort { field, .. }
        | ParserError::StringTooLong { field, .. }
        | ParserError::ValueTooSmall { field }
        | ParserError::ValueTooLarge { field }
        | ParserError::ArrayTooShort { field, .. } => Some((*field).to_string()),
        ParserError::NotAnObject | ParserError::Malformed(_) | ParserError::InvalidVariant(_) => None,
        ParserError::ValidationFailed(_) => None,
    }
}

/// Format the `{"error":"<desc>","path":"<path>"}` response line for a failed parse.
///
/// A generic, non-JSON-shaped failure is reported with the firmware's fixed wording rather than
/// the `serde_json` message, which would leak implementation detail the client can't act on.
fn error_response(err: &ParserError) -> String {
    let desc = match err {
        ParserError::Malformed(_) => "unable to parse json".to_string(),
        other => other.to_string(),
    };
    match path_for(err) {
        Some(path) => serde_json::json!({ "error": desc, "path": path }).to_string(),
        None => serde_json::json!({ "error": desc }).to_string(),
    }
}

/// Parse and dispatch one command line, returning the response line to write back (without its
/// trailing `\n`), or `None` for commands with no response body.
pub fn dispatch<H: Hal>(
    line: &str,
    mode_manager: &mut ModeManager,
    settings: &mut SettingsManager,
    storage: &mut Storage,
    hal: &mut H,
    log: &dyn Log,
) -> Option<String> {
    let command = match CliCommand::parse(line) {
        Ok(c) => c,
        Err(e) => return Some(error_response(&e)),
    };

    match command {
        CliCommand::WriteMode { index, mode } => {
            let json = serde_json::to_string(&mode).expect("Mode always serializes");
            if mode.name != TRANSIENT_TEST_NAME {
                if let Err(e) = storage.save_mode_json(index, &json) {
                    log.log(&format!(r#"{{"error":"failed to persist mode: {e}"}}"#));
                }
            }
            if let Err(e) = mode_manager.load_mode(index, &json, log) {
                return Some(serde_json::json!({ "error": e.to_string() }).to_string());
            }
            if let Err(e) = mode_manager.set_mode(index) {
                return Some(serde_json::json!({ "error": e.to_string() }).to_string());
            }
            None
        }
        CliCommand::ReadMode { index } => {
            Some(storage.load_mode_json(index).unwrap_or_else(|| "null".to_string()))
        }
        CliCommand::WriteSettings { settings: new_settings } => {
            if let Err(e) = settings.write(new_settings, storage) {
                return Some(serde_json::json!({ "error": e.to_string() }).to_string());
            }
            None
        }
        CliCommand::ReadSettings => Some(settings.response_json()),
        CliCommand::Dfu => {
            if let Err(e) = hal.enter_dfu() {
                log.log(&format!("{{\"error\":\"enterDfu failed: {e:?}\"}}"));
            }
            None
        }
    }
}

/// Read `\n`-terminated command lines from `reader` until it closes, dispatching each one and
/// writing any response line (with its trailing `\n`) to `writer`.
pub fn run<R: BufRead, W: Write, H: Hal>(
    mut reader: R,
    mut writer: W,
    mode_manager: &mut ModeManager,
    settings: &mut SettingsManager,
    storage: &mut Storage,
    hal: &mut H,
    log: &dyn Log,
) -> std::io::Result<()> {
    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            return Ok(());
        }
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.is_empty() {
            continue;
        }
        if let Some(response) = dispatch(trimmed, mode_manager, settings, storage, hal, log) {
            writer.write_all(response.as_bytes())?;
            writer.write_all(b"\n")?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::DummyHal;
    use crate::log::NullLog;

    fn fresh() -> (ModeManager, SettingsManager, Storage, DummyHal) {
        let storage = Storage::new(2);
        let settings = SettingsManager::load(&storage);
        let mode_manager = ModeManager::new(2);
        let hal = DummyHal::new(2, 16);
        (mode_manager, settings, storage, hal)
    }

    #[test]
    fn read_settings_returns_compound_response() {
        let (mut mm, mut settings, mut storage, mut hal) = fresh();
        let response =
            dispatch("{\"type\":\"readSettings\"}", &mut mm, &mut settings, &mut storage, &mut hal, &NullLog)
                .unwrap();
        let value: serde_json::Value = serde_json::from_str(&response).unwrap();
        assert!(value.get("settings").is_some());
        assert!(value.get("defaults").is_some());
    }

    #[test]
    fn read_mode_on_empty_slot_returns_null() {
        let (mut mm, mut settings, mut storage, mut hal) = fresh();
        let response =
            dispatch("{\"type\":\"readMode\",\"index\":0}", &mut mm, &mut settings, &mut storage, &mut hal, &NullLog)
                .unwrap();
        assert_eq!(response, "null");
    }

    #[test]
    fn write_mode_persists_and_activates() {
        let (mut mm, mut settings, mut storage, mut hal) = fresh();
        let line = r#"{"type":"writeMode","index":0,"mode":{"name":"blink","front":{"pattern":{"type":"simple","duration":1,"changeAt":[{"ms":0,"output":{"type":"bulb","value":"high"}}]}}}}"#;
        let response = dispatch(line, &mut mm, &mut settings, &mut storage, &mut hal, &NullLog);
        assert_eq!(response, None);
        assert!(storage.load_mode_json(0).is_some());
        assert_eq!(mm.active_index(), 0);
    }

    #[test]
    fn transient_test_mode_is_applied_without_persisting() {
        let (mut mm, mut settings, mut storage, mut hal) = fresh();
        let line = r#"{"type":"writeMode","index":0,"mode":{"name":"transientTest","front":{"pattern":{"type":"simple","duration":1,"changeAt":[{"ms":0,"output":{"type":"bulb","value":"high"}}]}}}}"#;
        dispatch(line, &mut mm, &mut settings, &mut storage, &mut hal, &NullLog);
        assert_eq!(mm.active_index(), 0);
        assert!(storage.load_mode_json(0).is_none());
    }

    #[test]
    fn write_settings_persists_and_updates() {
        let (mut mm, mut settings, mut storage, mut hal) = fresh();
        let line = r#"{"type":"writeSettings","settings":{"modeCount":2,"minutesUntilAutoOff":5,"minutesUntilLockAfterAutoOff":1,"equationEvalIntervalMs":16,"enableChargerSerial":false,"enableI2cFailureReporting":false}}"#;
        let response = dispatch(line, &mut mm, &mut settings, &mut storage, &mut hal, &NullLog);
        assert_eq!(response, None);
        assert_eq!(settings.current().minutes_until_auto_off, 5);
        assert!(storage.load_settings_json().is_some());
    }

    #[test]
    fn dfu_invokes_the_hal_callback() {
        let (mut mm, mut settings, mut storage, mut hal) = fresh();
        let response = dispatch("{\"type\":\"dfu\"}", &mut mm, &mut settings, &mut storage, &mut hal, &NullLog);
        assert_eq!(response, None);
        assert!(hal.dfu_entered);
    }

    #[test]
    fn malformed_json_reports_the_generic_error() {
        let (mut mm, mut settings, mut storage, mut hal) = fresh();
        let response =
            dispatch("{not json", &mut mm, &mut settings, &mut storage, &mut hal, &NullLog).unwrap();
        let value: serde_json::Value = serde_json::from_str(&response).unwrap();
        assert_eq!(value["error"], "unable to parse json");
    }

    #[test]
    fn missing_field_reports_a_path() {
        let (mut mm, mut settings, mut storage, mut hal) = fresh();
        let response =
            dispatch("{\"type\":\"readMode\"}", &mut mm, &mut settings, &mut storage, &mut hal, &NullLog)
                .unwrap();
        let value: serde_json::Value = serde_json::from_str(&response).unwrap();
        assert_eq!(value["path"], "index");
    }

    #[test]
    fn run_processes_lines_until_the_stream_closes() {
        let (mut mm, mut settings, mut storage, mut hal) = fresh();
        let input = b"{\"type\":\"readSettings\"}\n{\"type\":\"dfu\"}\n".as_slice();
        let mut output = Vec::new();
        run(input, &mut output, &mut mm, &mut settings, &mut storage, &mut hal, &NullLog).unwrap();
        let text = String::from_utf8(output).unwrap();
        assert_eq!(text.lines().count(), 1); // dfu has no response line
        assert!(hal.dfu_entered);
    }
}
