//! Per-component runtime state: advancing and sampling a single [`ModeComponent`] (the front LED
//! or the case LED) over time. See spec §4.3.
//!
//! A [`ComponentState`] owns whatever runtime resources its pattern needs — nothing, for a
//! [`crate::model::Pattern::Simple`], or a set of compiled expression handles for a
//! [`crate::model::Pattern::Equation`]. Swapping in a new pattern (`initialize`) simply replaces
//! the old [`ComponentState`], which drops any handles it held; Rust's ownership model gives us
//! the "release before reinitializing" contract for free, rather than requiring an explicit
//! teardown call before the new one is built.

use crate::equation::{self, CompileError, CompiledExpr};
use crate::model::{ChannelConfig, ModeComponent, Pattern, SimpleOutput};
use crate::pattern::SimplePatternState;

/// Elapsed time fed to an equation's `t` variable is capped at this many seconds worth of
/// milliseconds to keep the value within the range `f32` trig still resolves meaningfully (spec
/// §4.2's 10,000,000ms cap, carried from the original firmware).
const ELAPSED_CAP_MS: u32 = 10_000_000;

/// A compile failure anchored to the dotted path of the field that produced it, e.g.
/// `"accel[1].front.red.sections[2]"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathedCompileError {
    pub path: String,
    pub error: CompileError,
}

impl std::fmt::Display for PathedCompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.error.message)
    }
}

struct EquationChannelState {
    section_index: usize,
    elapsed_ms: u32,
    last_eval_ms: Option<u32>,
    cached_value: u8,
    compiled: Vec<Option<CompiledExpr>>,
}

impl EquationChannelState {
    fn new(config: &ChannelConfig, path: &str) -> (Self, Vec<PathedCompileError>) {
        let (compiled, first_error) = equation::compile_channel(config);
        let mut errors = Vec::new();
        if let Some(error) = first_error {
            // compile_channel only reports the first failure among this channel's sections; walk
            // again to find which section index it belongs to for the dotted path.
            for (i, section) in config.sections.iter().enumerate() {
                if compiled.get(i).map(|s| s.is_none()).unwrap_or(false) {
                    if let Err(err) = equation::compile(&section.equation) {
                        errors.push(PathedCompileError {
                            path: format!("{path}.sections[{i}]"),
                            error: err,
                        });
                    }
                }
            }
            if errors.is_empty() {
                errors.push(PathedCompileError { path: path.to_string(), error });
            }
        }
        (
            EquationChannelState {
                section_index: 0,
                elapsed_ms: 0,
                last_eval_ms: None,
                cached_value: 0,
                compiled,
            },
            errors,
        )
    }

    fn total_duration(config: &ChannelConfig) -> u32 {
        config.sections.iter().map(|s| s.duration).sum()
    }

    fn reset(&mut self) {
        self.section_index = 0;
        self.elapsed_ms = 0;
        self.last_eval_ms = None;
        self.cached_value = 0;
    }

    fn advance(&mut self, config: &ChannelConfig, delta_ms: u32) {
        if config.sections.is_empty() {
            self.reset();
            return;
        }
        let total = Self::total_duration(config);
        if total == 0 {
            self.reset();
            return;
        }

        let mut elapsed = self.elapsed_ms.saturating_add(delta_ms);
        if config.loop_after_duration {
            while elapsed >= total {
                elapsed -= total;
            }
        } else {
            elapsed = elapsed.min(total - 1);
        }
        self.elapsed_ms = elapsed.min(ELAPSED_CAP_MS);

        let mut boundary = 0u32;
        let mut index = 0usize;
        for (i, section) in config.sections.iter().enumerate() {
            if self.elapsed_ms < boundary + section.duration || i == config.sections.len() - 1 {
                index = i;
                break;
            }
            boundary += section.duration;
        }
        self.section_index = index;
    }

    /// Time elapsed since the start of the current section, used as the equation's `t` variable
    /// (in seconds).
    fn section_elapsed_seconds(&self, config: &ChannelConfig) -> f32 {
        let boundary: u32 = config.sections[..self.section_index]
            .iter()
            .map(|s| s.duration)
            .sum();
        (self.elapsed_ms.saturating_sub(boundary)) as f32 / 1000.0
    }

    /// Sample the current value, recomputing only when `eval_interval_ms` have passed since the
    /// last sample (spec property 6: cache idempotence within the interval).
    fn value(&mut self, config: &ChannelConfig, eval_interval_ms: u32) -> u8 {
        if config.sections.is_empty() {
            return 0;
        }
        let should_eval = match self.last_eval_ms {
            None => true,
            Some(last) => self.elapsed_ms.abs_diff(last) >= eval_interval_ms,
        };
        if should_eval {
            let t = self.section_elapsed_seconds(config);
            let handle = self.compiled.get(self.section_index).and_then(|h| h.as_ref());
            self.cached_value = equation::eval_clamped(handle, t);
            self.last_eval_ms = Some(self.elapsed_ms);
        }
        self.cached_value
    }
}

enum ComponentRuntime {
    Simple(SimplePatternState),
    Equation {
        red: EquationChannelState,
        green: EquationChannelState,
        blue: EquationChannelState,
    },
}

/// The live state of one mode component (front or case): which pattern it holds, and the
/// runtime's progress through it.
pub struct ComponentState {
    pattern: Pattern,
    runtime: ComponentRuntime,
    last_ms: Option<u32>,
}

impl ComponentState {
    /// Build runtime state for `component`, compiling any equations it contains. Compile errors
    /// are collected (not short-circuited) so every equation in the component gets a chance to
    /// report its own problem in one pass.
    pub fn initialize(component: &ModeComponent, path: &str) -> (Self, Vec<PathedCompileError>) {
        match &component.pattern {
            Pattern::Simple { .. } => {
                let state = ComponentState {
                    pattern: component.pattern.clone(),
                    runtime: ComponentRuntime::Simple(SimplePatternState::default()),
                    last_ms: None,
                };
                (state, Vec::new())
            }
            Pattern::Equation { pattern } => {
                let (red, mut errors_r) = EquationChannelState::new(&pattern.red, &format!("{path}.red"));
                let (green, mut errors_g) =
                    EquationChannelState::new(&pattern.green, &format!("{path}.green"));
                let (blue, mut errors_b) =
                    EquationChannelState::new(&pattern.blue, &format!("{path}.blue"));
                let mut errors = Vec::new();
                errors.append(&mut errors_r);
                errors.append(&mut errors_g);
                errors.append(&mut errors_b);
                let state = ComponentState {
                    pattern: component.pattern.clone(),
                    runtime: ComponentRuntime::Equation { red, green, blue },
                    last_ms: None,
                };
                (state, errors)
            }
        }
    }

    /// Advance this component to absolute time `now_ms`.
    ///
    /// Non-monotonic timestamps (`now_ms <= last observed ms`) are ignored outright (spec
    /// property 3), rather than treated as a negative delta.
    pub fn advance(&mut self, now_ms: u32) {
        let delta = match self.last_ms {
            None => 0,
            Some(last) if now_ms <= last => {
                return;
            }
            Some(last) => now_ms - last,
        };
        self.last_ms = Some(now_ms);
        if delta == 0 {
            return;
        }
        match (&mut self.runtime, &self.pattern) {
            (ComponentRuntime::Simple(state), Pattern::Simple { pattern }) => {
                state.advance(pattern, delta);
            }
            (ComponentRuntime::Equation { red, green, blue }, Pattern::Equation { pattern }) => {
                red.advance(&pattern.red, delta);
                green.advance(&pattern.green, delta);
                blue.advance(&pattern.blue, delta);
            }
            _ => unreachable!("runtime kind always matches pattern kind"),
        }
    }

    /// Sample the component's current output.
    pub fn output(&mut self, eval_interval_ms: u32) -> Option<SimpleOutput> {
        match (&mut self.runtime, &self.pattern) {
            (ComponentRuntime::Simple(state), Pattern::Simple { pattern }) => {
                state.current(pattern)
            }
            (ComponentRuntime::Equation { red, green, blue }, Pattern::Equation { pattern }) => {
                Some(SimpleOutput::Rgb {
                    r: red.value(&pattern.red, eval_interval_ms),
                    g: green.value(&pattern.green, eval_interval_ms),
                    b: blue.value(&pattern.blue, eval_interval_ms),
                })
            }
            _ => unreachable!("runtime kind always matches pattern kind"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BulbLevel, ChangeAt, EquationSection};

    fn simple_component() -> ModeComponent {
        ModeComponent {
            pattern: Pattern::Simple {
                pattern: crate::model::SimplePattern {
                    duration: 1000,
                    change_at: vec![
                        ChangeAt { ms: 0, output: SimpleOutput::Bulb { value: BulbLevel::High } },
                        ChangeAt { ms: 500, output: SimpleOutput::Bulb { value: BulbLevel::Low } },
                    ],
                },
            },
        }
    }

    fn equation_component() -> ModeComponent {
        let channel = |equation: &str| ChannelConfig {
            sections: vec![EquationSection { duration: 1000, equation: equation.to_string() }],
            loop_after_duration: true,
        };
        ModeComponent {
            pattern: Pattern::Equation {
                pattern: crate::model::EquationPattern {
                    duration: 1000,
                    red: channel("255"),
                    green: channel("0"),
                    blue: channel("bogus(t)"),
                },
            },
        }
    }

    #[test]
    fn simple_component_advances_and_reports_output() {
        let (mut state, errors) = ComponentState::initialize(&simple_component(), "front");
        assert!(errors.is_empty());
        state.advance(100);
        match state.output(16) {
            Some(SimpleOutput::Bulb { value: BulbLevel::High }) => {}
            other => panic!("unexpected output {other:?}"),
        }
    }

    #[test]
    fn non_monotonic_time_is_ignored() {
        let (mut state, _) = ComponentState::initialize(&simple_component(), "front");
        state.advance(600);
        let after_forward = format!("{:?}", state.output(16));
        state.advance(100); // time went backwards relative to 600; must be ignored
        let after_backward = format!("{:?}", state.output(16));
        assert_eq!(after_forward, after_backward);
    }

    #[test]
    fn equation_component_reports_error_with_dotted_path() {
        let (_, errors) = ComponentState::initialize(&equation_component(), "front");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].path, "front.blue.sections[0]");
    }

    #[test]
    fn equation_component_evaluates_constants() {
        let (mut state, _) = ComponentState::initialize(&equation_component(), "front");
        state.advance(16);
        match state.output(16) {
            Some(SimpleOutput::Rgb { r, g, b }) => {
                assert_eq!(r, 255);
                assert_eq!(g, 0);
                assert_eq!(b, 0); // the bogus blue equation failed to compile, so it evaluates to 0
            }
            other => panic!("unexpected output {other:?}"),
        }
    }

    #[test]
    fn cache_holds_within_eval_interval() {
        let component = ModeComponent {
            pattern: Pattern::Equation {
                pattern: crate::model::EquationPattern {
                    duration: 10_000,
                    red: ChannelConfig {
                        sections: vec![EquationSection { duration: 10_000, equation: "t * 100".into() }],
                        loop_after_duration: false,
                    },
                    green: ChannelConfig { sections: vec![], loop_after_duration: false },
                    blue: ChannelConfig { sections: vec![], loop_after_duration: false },
                },
            },
        };
        let (mut state, _) = ComponentState::initialize(&component, "front");
        state.advance(5);
        let first = state.output(16);
        state.advance(5); // still within the 16ms eval interval
        let second = state.output(16);
        assert_eq!(format!("{first:?}"), format!("{second:?}"));
    }
}
