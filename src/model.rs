//! The fixed-capacity data model shared by patterns, modes, and the JSON command protocol.
//!
//! Every type here is plain data; nothing in this module owns a compiled expression handle or
//! any other runtime resource. See [`crate::equation`] and [`crate::mode_state`] for the stateful
//! counterparts that interpret these values.

use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Maximum number of change points in a [`SimplePattern`].
pub const MAX_CHANGES: usize = 64;
/// Maximum length (in bytes) of an equation source string.
pub const EQ_LEN: usize = 128;
/// Maximum number of sections in a [`ChannelConfig`].
pub const SECTIONS_MAX: usize = 4;
/// Maximum number of triggers in an [`AccelConfig`].
pub const TRIGGERS_MAX: usize = 4;
/// Maximum length (in bytes) of a [`Mode`] name.
pub const MODE_NAME_MAX: usize = 32;
/// Reserved mode index for the always-present fake-off mode.
pub const FAKE_OFF_MODE_INDEX: u8 = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
/// The logic level driven onto the legacy monochrome bulb pin.
pub enum BulbLevel {
    High,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
/// The output of a single change point: either a bulb logic level or an RGB triple.
pub enum SimpleOutput {
    Bulb { value: BulbLevel },
    Rgb { r: u8, g: u8, b: u8 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
/// A single entry in a [`SimplePattern`]'s change list.
pub struct ChangeAt {
    pub ms: u32,
    pub output: SimpleOutput,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// A time-ordered list of change points, looping every `duration` milliseconds.
pub struct SimplePattern {
    pub duration: u32,
    #[serde(rename = "changeAt")]
    pub change_at: Vec<ChangeAt>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// One section of a channel's equation program: an expression valid for `duration` milliseconds.
pub struct EquationSection {
    pub duration: u32,
    pub equation: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// The ordered equation sections driving a single color channel (red, green, or blue).
pub struct ChannelConfig {
    pub sections: Vec<EquationSection>,
    #[serde(rename = "loopAfterDuration")]
    pub loop_after_duration: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// A real-valued-equation pattern, evaluated independently on each of three color channels.
pub struct EquationPattern {
    pub duration: u32,
    pub red: ChannelConfig,
    pub green: ChannelConfig,
    pub blue: ChannelConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
/// Either a simple change-point pattern or an equation-driven one.
pub enum Pattern {
    Simple {
        #[serde(flatten)]
        pattern: SimplePattern,
    },
    Equation {
        #[serde(flatten)]
        pattern: EquationPattern,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// A pattern driving one output (front or case).
pub struct ModeComponent {
    pub pattern: Pattern,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// A single acceleration-triggered override.
pub struct AccelTrigger {
    pub threshold: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub front: Option<ModeComponent>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "caseComp")]
    pub case_comp: Option<ModeComponent>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// The set of acceleration triggers for a mode, ordered by ascending threshold.
pub struct AccelConfig {
    pub triggers: Vec<AccelTrigger>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// A complete, user-selectable mode.
pub struct Mode {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub front: Option<ModeComponent>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "caseComp")]
    pub case_comp: Option<ModeComponent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accel: Option<AccelConfig>,
}

#[derive(Debug, PartialEq, Eq)]
/// Reasons a [`Mode`] or its nested patterns can fail validation.
pub enum ValidationError {
    /// Mode name exceeded [`MODE_NAME_MAX`].
    NameTooLong,
    /// A simple pattern's first change point was not at `ms == 0`.
    FirstChangeNotAtZero,
    /// A simple pattern's change points were not strictly increasing.
    ChangeAtNotIncreasing,
    /// A simple pattern's change point fell at or past `duration`.
    ChangeAtPastDuration,
    /// A simple pattern exceeded [`MAX_CHANGES`].
    TooManyChanges,
    /// A channel's equation exceeded [`EQ_LEN`].
    EquationTooLong,
    /// A channel exceeded [`SECTIONS_MAX`] sections.
    TooManySections,
    /// An `AccelConfig` exceeded [`TRIGGERS_MAX`] triggers.
    TooManyTriggers,
    /// `AccelConfig` triggers were not in ascending threshold order.
    TriggersNotAscending,
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::NameTooLong => {
                write!(f, "mode name exceeds {MODE_NAME_MAX} characters")
            }
            ValidationError::FirstChangeNotAtZero => {
                write!(f, "first change point must be at ms 0")
            }
            ValidationError::ChangeAtNotIncreasing => {
                write!(f, "change points must be strictly increasing")
            }
            ValidationError::ChangeAtPastDuration => {
                write!(f, "change point occurs at or after the pattern duration")
            }
            ValidationError::TooManyChanges => {
                write!(f, "pattern has more than {MAX_CHANGES} change points")
            }
            ValidationError::EquationTooLong => {
                write!(f, "equation exceeds {EQ_LEN} characters")
            }
            ValidationError::TooManySections => {
                write!(f, "channel has more than {SECTIONS_MAX} sections")
            }
            ValidationError::TooManyTriggers => {
                write!(f, "accel config has more than {TRIGGERS_MAX} triggers")
            }
            ValidationError::TriggersNotAscending => {
                write!(f, "accel triggers must be in ascending threshold order")
            }
        }
    }
}

fn validate_simple(duration: u32, change_at: &[ChangeAt]) -> Result<(), ValidationError> {
    if change_at.len() > MAX_CHANGES {
        return Err(ValidationError::TooManyChanges);
    }
    if let Some(first) = change_at.first() {
        if first.ms != 0 {
            return Err(ValidationError::FirstChangeNotAtZero);
        }
    }
    for pair in change_at.windows(2) {
        if pair[1].ms <= pair[0].ms {
            return Err(ValidationError::ChangeAtNotIncreasing);
        }
    }
    for c in change_at {
        if c.ms >= duration && duration > 0 {
            return Err(ValidationError::ChangeAtPastDuration);
        }
    }
    Ok(())
}

fn validate_channel(channel: &ChannelConfig) -> Result<(), ValidationError> {
    if channel.sections.len() > SECTIONS_MAX {
        return Err(ValidationError::TooManySections);
    }
    for section in &channel.sections {
        if section.equation.len() > EQ_LEN {
            return Err(ValidationError::EquationTooLong);
        }
    }
    Ok(())
}

fn validate_component(component: &ModeComponent) -> Result<(), ValidationError> {
    match &component.pattern {
        Pattern::Simple { pattern } => validate_simple(pattern.duration, &pattern.change_at),
        Pattern::Equation { pattern } => {
            validate_channel(&pattern.red)?;
            validate_channel(&pattern.green)?;
            validate_channel(&pattern.blue)
        }
    }
}

impl AccelConfig {
    /// Validate that triggers are ascending and within the capacity bound.
    ///
    /// A robust port rejects unordered triggers at parse time rather than relying on the
    /// cascade-evaluation short-circuit in [`crate::mode_manager`] to mask the error silently
    /// (see spec Open Questions in §9).
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.triggers.len() > TRIGGERS_MAX {
            return Err(ValidationError::TooManyTriggers);
        }
        for pair in self.triggers.windows(2) {
            if pair[1].threshold < pair[0].threshold {
                return Err(ValidationError::TriggersNotAscending);
            }
        }
        Ok(())
    }
}

impl Mode {
    /// Validate a whole mode tree: name length, every pattern's invariants, and trigger ordering.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.len() > MODE_NAME_MAX {
            return Err(ValidationError::NameTooLong);
        }
        if let Some(front) = &self.front {
            validate_component(front)?;
        }
        if let Some(case_comp) = &self.case_comp {
            validate_component(case_comp)?;
        }
        if let Some(accel) = &self.accel {
            accel.validate()?;
            for trigger in &accel.triggers {
                if let Some(front) = &trigger.front {
                    validate_component(front)?;
                }
                if let Some(case_comp) = &trigger.case_comp {
                    validate_component(case_comp)?;
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
/// Persistent, user-tunable controller settings (§3 `ChipSettings`).
pub struct ChipSettings {
    pub mode_count: u8,
    pub minutes_until_auto_off: u8,
    pub minutes_until_lock_after_auto_off: u8,
    pub equation_eval_interval_ms: u8,
    pub enable_charger_serial: bool,
    pub enable_i2c_failure_reporting: bool,
}

impl Default for ChipSettings {
    fn default() -> Self {
        ChipSettings {
            mode_count: 1,
            minutes_until_auto_off: 90,
            minutes_until_lock_after_auto_off: 10,
            equation_eval_interval_ms: 16,
            enable_charger_serial: false,
            enable_i2c_failure_reporting: false,
        }
    }
}

impl ChipSettings {
    /// The inclusive range `modeCount` must fall within.
    pub const MODE_COUNT_RANGE: std::ops::RangeInclusive<u8> = 0..=7;
}
