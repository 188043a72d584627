//! Mode selection and the accelerometer-trigger cascade. See spec §4.4.
//!
//! Grounded on the dispatch shape of `execution::handle_command`: a small set of top-level
//! operations (`load_mode`, `set_mode`, `mode_task`) each returning a typed error, with the
//! orchestrator owning the mutable state instead of passing it around piecemeal.

use crate::accel::AccelDetector;
use crate::log::Log;
use crate::model::{
    BulbLevel, ChangeAt, Mode, ModeComponent, Pattern, SimpleOutput, SimplePattern,
    FAKE_OFF_MODE_INDEX,
};
use crate::mode_state::{ComponentState, PathedCompileError};

#[derive(Debug)]
pub enum Error {
    /// `index` named a mode slot beyond the configured `modeCount`.
    ModeOutOfBounds { index: u8, mode_count: u8 },
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::ModeOutOfBounds { index, mode_count } => {
                write!(f, "mode index {index} is out of bounds for modeCount {mode_count}")
            }
        }
    }
}

/// The two LED outputs produced by one `mode_task` tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeOutputs {
    pub front: Option<SimpleOutput>,
    pub case_comp: Option<SimpleOutput>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Default,
    Trigger(usize),
}

fn off_pattern(output: SimpleOutput) -> ModeComponent {
    ModeComponent {
        pattern: Pattern::Simple {
            pattern: SimplePattern { duration: 1, change_at: vec![ChangeAt { ms: 0, output }] },
        },
    }
}

/// The built-in mode substituted for a slot whenever its saved JSON fails to parse or validate.
fn default_mode() -> Mode {
    Mode {
        name: "default".to_string(),
        front: Some(off_pattern(SimpleOutput::Bulb { value: BulbLevel::Low })),
        case_comp: Some(off_pattern(SimpleOutput::Rgb { r: 0, g: 0, b: 0 })),
        accel: None,
    }
}

/// The fixed, always-present mode at [`FAKE_OFF_MODE_INDEX`]: every output held off.
fn fake_off_mode() -> Mode {
    Mode {
        name: "fakeOff".to_string(),
        front: Some(off_pattern(SimpleOutput::Bulb { value: BulbLevel::Low })),
        case_comp: Some(off_pattern(SimpleOutput::Rgb { r: 0, g: 0, b: 0 })),
        accel: None,
    }
}

/// Resolve which component (default, or a specific trigger's override) is active for `front` and
/// `case_comp`, given the current accelerometer reading in `accel`.
///
/// Triggers are walked in ascending threshold order (validated at parse time, see
/// [`crate::model::AccelConfig::validate`]); the walk stops the moment a trigger's threshold is
/// not exceeded (`accel.is_over_threshold` per spec §4.7's formula), so the surviving source is
/// always the highest-threshold trigger currently exceeded that actually defines that component
/// (spec property 4: trigger cascade).
fn resolve_sources(mode: &Mode, accel: &AccelDetector) -> (Source, Source) {
    let mut front = Source::Default;
    let mut case_comp = Source::Default;
    if let Some(accel_config) = &mode.accel {
        for (i, trigger) in accel_config.triggers.iter().enumerate() {
            if !accel.is_over_threshold(trigger.threshold) {
                break;
            }
            if trigger.front.is_some() {
                front = Source::Trigger(i);
            }
            if trigger.case_comp.is_some() {
                case_comp = Source::Trigger(i);
            }
        }
    }
    (front, case_comp)
}

fn component_for<'a>(mode: &'a Mode, source: Source, front: bool) -> Option<&'a ModeComponent> {
    match source {
        Source::Default => {
            if front {
                mode.front.as_ref()
            } else {
                mode.case_comp.as_ref()
            }
        }
        Source::Trigger(i) => {
            let trigger = &mode.accel.as_ref()?.triggers[i];
            if front {
                trigger.front.as_ref()
            } else {
                trigger.case_comp.as_ref()
            }
        }
    }
}

/// Owns the loaded mode table, the active selection, and the running component state for the
/// currently-resolved front and case patterns.
pub struct ModeManager {
    modes: Vec<Mode>,
    active_index: u8,
    active_mode: Mode,
    front_source: Option<Source>,
    front_state: Option<ComponentState>,
    case_source: Option<Source>,
    case_state: Option<ComponentState>,
}

impl ModeManager {
    /// Build a manager with `mode_count` slots, all initialized to [`default_mode`], and the
    /// fake-off mode active.
    pub fn new(mode_count: u8) -> Self {
        ModeManager {
            modes: (0..mode_count).map(|_| default_mode()).collect(),
            active_index: FAKE_OFF_MODE_INDEX,
            active_mode: fake_off_mode(),
            front_source: None,
            front_state: None,
            case_source: None,
            case_state: None,
        }
    }

    /// Replace the mode stored at `index` with the result of parsing `json`.
    ///
    /// On a parse or validation failure, logs a `"corrupt saved mode"` line (matching the
    /// original firmware's exact wording) and falls back to [`default_mode`] instead — the
    /// two-tier fallback described in spec.md's supplemented-features notes.
    pub fn load_mode(&mut self, index: u8, json: &str, log: &dyn Log) -> Result<(), Error> {
        let mode_count = self.modes.len() as u8;
        if index >= mode_count {
            return Err(Error::ModeOutOfBounds { index, mode_count });
        }
        let mode = serde_json::from_str::<Mode>(json)
            .ok()
            .filter(|m| m.validate().is_ok())
            .unwrap_or_else(|| {
                log.log(&format!(
                    r#"{{"error":"corrupt saved mode","index":{index}}}"#
                ));
                default_mode()
            });
        self.modes[index as usize] = mode;
        Ok(())
    }

    /// Switch the active mode. `index == FAKE_OFF_MODE_INDEX` selects the built-in off mode;
    /// any other value must be a valid slot.
    ///
    /// Component state is cleared, not eagerly rebuilt — `mode_task` lazily reinitializes it
    /// (and compiles any equations) the next time it resolves a source, so `set_mode` itself
    /// never has to report a compile error.
    pub fn set_mode(&mut self, index: u8) -> Result<(), Error> {
        let mode = if index == FAKE_OFF_MODE_INDEX {
            fake_off_mode()
        } else {
            let mode_count = self.modes.len() as u8;
            if index >= mode_count {
                return Err(Error::ModeOutOfBounds { index, mode_count });
            }
            self.modes[index as usize].clone()
        };
        self.active_index = index;
        self.active_mode = mode;
        self.front_source = None;
        self.front_state = None;
        self.case_source = None;
        self.case_state = None;
        Ok(())
    }

    pub fn active_index(&self) -> u8 {
        self.active_index
    }

    pub fn mode_count(&self) -> u8 {
        self.modes.len() as u8
    }

    /// Advance the active mode to `now_ms` given the latest accelerometer reading in `accel`, and
    /// return the resolved front/case outputs.
    ///
    /// Any compile errors surfaced while lazily initializing a newly-resolved component are
    /// returned alongside the outputs rather than blocking them — a failed equation degrades that
    /// one component to no output, it does not stall the whole tick.
    pub fn mode_task(
        &mut self,
        now_ms: u32,
        accel: &AccelDetector,
        eval_interval_ms: u32,
    ) -> (ModeOutputs, Vec<PathedCompileError>) {
        let (new_front_source, new_case_source) = resolve_sources(&self.active_mode, accel);
        let mut errors = Vec::new();

        if self.front_source != Some(new_front_source) {
            self.front_source = Some(new_front_source);
            self.front_state = component_for(&self.active_mode, new_front_source, true).map(|c| {
                let (state, mut errs) = ComponentState::initialize(c, "front");
                errors.append(&mut errs);
                state
            });
        }
        if self.case_source != Some(new_case_source) {
            self.case_source = Some(new_case_source);
            self.case_state =
                component_for(&self.active_mode, new_case_source, false).map(|c| {
                    let (state, mut errs) = ComponentState::initialize(c, "caseComp");
                    errors.append(&mut errs);
                    state
                });
        }

        if let Some(state) = &mut self.front_state {
            state.advance(now_ms);
        }
        if let Some(state) = &mut self.case_state {
            state.advance(now_ms);
        }

        let outputs = ModeOutputs {
            front: self.front_state.as_mut().and_then(|s| s.output(eval_interval_ms)),
            case_comp: self.case_state.as_mut().and_then(|s| s.output(eval_interval_ms)),
        };
        (outputs, errors)
    }
}
