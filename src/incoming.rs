//! Parsing and validating incoming USB commands. See spec §4.9.
//!
//! Grounded on `config::Configuration::parse`'s parse-then-validate shape, but the wire protocol
//! here calls for reporting *which* field failed and *how*, not just "the JSON was malformed" —
//! so each line is decoded into a generic [`serde_json::Value`] first, checked field-by-field
//! against the taxonomy the USB manager reports back to the client, and only then handed to
//! `serde_json` for the final typed decode.

use serde_json::{Map, Value};

use crate::model::{ChipSettings, Mode, ValidationError};

#[derive(Debug, PartialEq, Eq)]
/// A parsed line from the USB command stream, ready for [`crate::usb_manager`] to dispatch.
pub enum CliCommand {
    WriteMode { index: u8, mode: Mode },
    ReadMode { index: u8 },
    WriteSettings { settings: ChipSettings },
    ReadSettings,
    Dfu,
}

#[derive(Debug, PartialEq, Eq)]
/// The ways a command line can fail to parse, reported back to the client by name rather than
/// as an opaque JSON error.
pub enum ParserError {
    /// Valid JSON, but not an object at all.
    NotAnObject,
    /// The line was not valid JSON.
    Malformed(String),
    /// A required field was absent.
    MissingField(&'static str),
    /// A string field was shorter than the protocol allows.
    StringTooShort { field: &'static str, min: usize },
    /// A string field exceeded the protocol's length limit.
    StringTooLong { field: &'static str, max: usize },
    /// A numeric field was below its allowed range.
    ValueTooSmall { field: &'static str },
    /// A numeric field was above its allowed range.
    ValueTooLarge { field: &'static str },
    /// An array field had fewer elements than required.
    ArrayTooShort { field: &'static str, min: usize },
    /// The `type` tag named a command this firmware doesn't recognize.
    InvalidVariant(String),
    /// The command parsed structurally but failed a `Mode`/`ChipSettings` invariant.
    ValidationFailed(ValidationError),
}

impl std::fmt::Display for ParserError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParserError::NotAnObject => write!(f, "expected a JSON object"),
            ParserError::Malformed(msg) => write!(f, "malformed JSON: {msg}"),
            ParserError::MissingField(field) => write!(f, "missing field '{field}'"),
            ParserError::StringTooShort { field, min } => {
                write!(f, "field '{field}' must be at least {min} characters")
            }
            ParserError::StringTooLong { field, max } => {
                write!(f, "field '{field}' must be at most {max} characters")
            }
            ParserError::ValueTooSmall { field } => write!(f, "field '{field}' is below its minimum"),
            ParserError::ValueTooLarge { field } => write!(f, "field '{field}' is above its maximum"),
            ParserError::ArrayTooShort { field, min } => {
                write!(f, "array '{field}' must have at least {min} element(s)")
            }
            ParserError::InvalidVariant(v) => write!(f, "unrecognized command type '{v}'"),
            ParserError::ValidationFailed(e) => write!(f, "validation failed: {e}"),
        }
    }
}

fn require_object(value: &Value) -> Result<&Map<String, Value>, ParserError> {
    value.as_object().ok_or(ParserError::NotAnObject)
}

fn require_u8(obj: &Map<String, Value>, field: &'static str) -> Result<u8, ParserError> {
    let raw = obj.get(field).ok_or(ParserError::MissingField(field))?;
    let n = raw.as_u64().ok_or(ParserError::MissingField(field))?;
    u8::try_from(n).map_err(|_| ParserError::ValueTooLarge { field })
}

fn require_field<'a>(obj: &'a Map<String, Value>, field: &'static str) -> Result<&'a Value, ParserError> {
    obj.get(field).ok_or(ParserError::MissingField(field))
}

/// Reject a declared-but-empty `accel.triggers` array before it ever reaches
/// [`Mode::validate`] — an explicit `"triggers": []` is meaningless and the protocol flags it as
/// its own error rather than silently accepting a no-op accel config.
fn check_accel_triggers(mode_value: &Value) -> Result<(), ParserError> {
    let Some(accel) = mode_value.get("accel") else { return Ok(()) };
    let Some(triggers) = accel.get("triggers") else { return Ok(()) };
    if triggers.as_array().is_some_and(|a| a.is_empty()) {
        return Err(ParserError::ArrayTooShort { field: "accel.triggers", min: 1 });
    }
    Ok(())
}

impl CliCommand {
    /// Parse one line of the USB command protocol.
    pub fn parse(line: &str) -> Result<CliCommand, ParserError> {
        let value: Value = serde_json::from_str(line).map_err(|e| ParserError::Malformed(e.to_string()))?;
        let obj = require_object(&value)?;
        let command_type = require_field(obj, "type")?
            .as_str()
            .ok_or(ParserError::MissingField("type"))?;

        match command_type {
            "writeMode" => {
                let index = require_u8(obj, "index")?;
                let mode_value = require_field(obj, "mode")?;
                check_accel_triggers(mode_value)?;
                let mode: Mode = serde_json::from_value(mode_value.clone())
                    .map_err(|e| ParserError::Malformed(e.to_string()))?;
                if mode.name.is_empty() {
                    return Err(ParserError::StringTooShort { field: "name", min: 1 });
                }
                mode.validate().map_err(ParserError::ValidationFailed)?;
                Ok(CliCommand::WriteMode { index, mode })
            }
            "readMode" => Ok(CliCommand::ReadMode { index: require_u8(obj, "index")? }),
            "writeSettings" => {
                let settings_value = require_field(obj, "settings")?;
                let settings: ChipSettings = serde_json::from_value(settings_value.clone())
                    .map_err(|e| ParserError::Malformed(e.to_string()))?;
                if !ChipSettings::MODE_COUNT_RANGE.contains(&settings.mode_count) {
                    return Err(ParserError::ValueTooLarge { field: "modeCount" });
                }
                Ok(CliCommand::WriteSettings { settings })
            }
            "readSettings" => Ok(CliCommand::ReadSettings),
            "dfu" => Ok(CliCommand::Dfu),
            other => Err(ParserError::InvalidVariant(other.to_string())),
        }
    }
}
