//! The button's evaluating/elapsed-time state machine. See spec §4.5.
//!
//! Grounded on `heartbeat.rs`'s shape for a small, self-contained task driving a single pin, but
//! the button needs to *read* a pin and classify how long it was held rather than just drive one,
//! so the state machine lives here as plain data advanced by millisecond timestamps instead of a
//! sleeping loop — that keeps it host-testable without a real clock, matching this crate's
//! "advance by elapsed time" style used throughout `pattern.rs` and `mode_state.rs`.

use crate::led::TransientSignal;

/// Below this held duration, a release is debounce noise rather than a real click (spec §4.5's
/// debounce floor).
pub const DEBOUNCE_FLOOR_MS: u32 = 50;
/// The ms-band in which a still-held button shows the "shutdown" cue.
pub const SHUTDOWN_BAND_MS: (u32, u32) = (1_000, 1_100);
/// The ms-band in which a still-held button shows the "locked" cue.
pub const LOCK_BAND_MS: (u32, u32) = (2_000, 2_100);

/// What the orchestrator should do in response to one `task` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonOutcome {
    /// Nothing committed this tick — still idle, or still mid-evaluation.
    Ignore,
    /// A short press-and-release: cycle the active mode.
    Clicked,
    /// A press held past the shutdown band: enter fake-off.
    Shutdown,
    /// A press held past the lock band: lock (or hardware-reset) the charger immediately.
    LockOrHardwareReset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Evaluating { eval_start_ms: u32 },
}

/// Tracks the button's evaluation window: captures when a press started, and classifies the
/// eventual release (or an in-progress long hold) against the shutdown/lock ms-bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonState {
    phase: Phase,
}

impl Default for ButtonState {
    fn default() -> Self {
        ButtonState { phase: Phase::Idle }
    }
}

impl ButtonState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a press is currently being evaluated. The orchestrator skips its own case-LED
    /// update while this holds, since the button cues below are driving the case LED instead.
    pub fn is_evaluating(&self) -> bool {
        matches!(self.phase, Phase::Evaluating { .. })
    }

    /// Run one tick of the state machine: `pressed` is the current raw pin read, `interrupt_triggered`
    /// is the press-edge ISR-equivalent signal that starts a new evaluation, and `now_ms` is the
    /// current timestamp.
    ///
    /// Returns the committed outcome (almost always `Ignore`) and, if the case LED should show a
    /// cue this instant, which one.
    pub fn task(
        &mut self,
        pressed: bool,
        now_ms: u32,
        interrupt_triggered: bool,
    ) -> (ButtonOutcome, Option<TransientSignal>) {
        match self.phase {
            Phase::Idle => {
                if interrupt_triggered {
                    self.phase = Phase::Evaluating { eval_start_ms: now_ms };
                    return (ButtonOutcome::Ignore, Some(TransientSignal::Evaluating));
                }
                (ButtonOutcome::Ignore, None)
            }
            Phase::Evaluating { eval_start_ms } => {
                let elapsed = now_ms.saturating_sub(eval_start_ms);
                if pressed {
                    let cue = if elapsed > SHUTDOWN_BAND_MS.0 && elapsed < SHUTDOWN_BAND_MS.1 {
                        Some(TransientSignal::Shutdown)
                    } else if elapsed > LOCK_BAND_MS.0 && elapsed < LOCK_BAND_MS.1 {
                        Some(TransientSignal::Locked)
                    } else {
                        None
                    };
                    return (ButtonOutcome::Ignore, cue);
                }

                self.phase = Phase::Idle;
                if elapsed <= DEBOUNCE_FLOOR_MS {
                    (ButtonOutcome::Ignore, None)
                } else if elapsed > LOCK_BAND_MS.0 {
                    (ButtonOutcome::LockOrHardwareReset, None)
                } else if elapsed > SHUTDOWN_BAND_MS.0 {
                    (ButtonOutcome::Shutdown, None)
                } else {
                    (ButtonOutcome::Clicked, Some(TransientSignal::Success))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    /// S1: a clean press held past the debounce floor but released quickly commits `Clicked` with
    /// the success cue.
    fn scenario_s1_clean_click() {
        let mut button = ButtonState::new();
        assert_eq!(button.task(true, 0, true), (ButtonOutcome::Ignore, Some(TransientSignal::Evaluating)));
        assert_eq!(button.task(true, 60, false), (ButtonOutcome::Ignore, None));
        assert_eq!(
            button.task(false, 120, false),
            (ButtonOutcome::Clicked, Some(TransientSignal::Success))
        );
        assert!(!button.is_evaluating());
    }

    #[test]
    /// S2: a release inside the debounce floor is ignored outright (bounce, not a real click).
    fn scenario_s2_bounce_is_ignored() {
        let mut button = ButtonState::new();
        button.task(true, 0, true);
        assert_eq!(button.task(false, 20, false), (ButtonOutcome::Ignore, None));
        assert!(!button.is_evaluating());
    }

    #[test]
    fn a_press_released_past_1000ms_reads_as_shutdown() {
        let mut button = ButtonState::new();
        button.task(true, 0, true);
        assert_eq!(button.task(false, 1_050, false), (ButtonOutcome::Shutdown, None));
    }

    #[test]
    fn a_press_released_past_2000ms_reads_as_lock_or_hardware_reset() {
        let mut button = ButtonState::new();
        button.task(true, 0, true);
        assert_eq!(button.task(false, 2_200, false), (ButtonOutcome::LockOrHardwareReset, None));
    }

    #[test]
    fn the_shutdown_cue_shows_only_within_its_ms_band_while_still_held() {
        let mut button = ButtonState::new();
        button.task(true, 0, true);
        assert_eq!(button.task(true, 900, false), (ButtonOutcome::Ignore, None));
        assert_eq!(button.task(true, 1_050, false), (ButtonOutcome::Ignore, Some(TransientSignal::Shutdown)));
        assert_eq!(button.task(true, 1_500, false), (ButtonOutcome::Ignore, None));
    }

    #[test]
    fn the_locked_cue_shows_only_within_its_ms_band_while_still_held() {
        let mut button = ButtonState::new();
        button.task(true, 0, true);
        assert_eq!(button.task(true, 2_050, false), (ButtonOutcome::Ignore, Some(TransientSignal::Locked)));
        assert_eq!(button.task(true, 2_500, false), (ButtonOutcome::Ignore, None));
    }

    #[test]
    fn an_interrupt_while_already_evaluating_is_not_a_new_evaluation() {
        let mut button = ButtonState::new();
        button.task(true, 0, true);
        assert_eq!(button.task(true, 10, true), (ButtonOutcome::Ignore, None));
    }
}
