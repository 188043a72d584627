//! Transient status overlay for the case and front LEDs. See spec §4.8.
//!
//! The mode manager decides the steady-state color; this module decides whether that color is
//! currently being overridden by a short-lived status flash (button feedback, charger state) and
//! for how long. Grounded on `hardware/mod.rs`'s trait-based device abstraction — the overlay only
//! produces the color to drive, it never touches a pin directly.

use crate::model::SimpleOutput;

/// How long a transient status color is shown before the underlying mode output returns.
pub const TRANSIENT_DURATION_MS: u32 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// A short-lived event that should visibly override the current LED color. Colors are spec
/// §4.8's exact values.
pub enum TransientSignal {
    /// A clicked button press committed (spec §4.5's "success" cue).
    Success,
    /// The lock timer tripped, or a long button press is read as `lockOrHardwareReset`.
    Locked,
    /// The auto-off timer tripped, or a long button press is read as `shutdown`.
    Shutdown,
    /// Charger IC reports connected but not actively charging.
    NotCharging,
    /// Charger IC reports constant-current charging.
    CcCharging,
    /// Charger IC reports constant-voltage charging.
    CvCharging,
    /// Charger IC reports the pack is fully charged.
    Done,
    /// The button is mid-evaluation (spec §4.5's "no color" cue) — not one of the §4.8 charge/click
    /// cues, but the same forced-color-for-a-while mechanism.
    Evaluating,
}

impl TransientSignal {
    /// The fixed color shown for this signal, independent of the mode's own palette.
    pub fn color(self) -> SimpleOutput {
        let (r, g, b) = match self {
            TransientSignal::Success => (10, 10, 10),
            TransientSignal::Locked => (0, 0, 20),
            TransientSignal::Shutdown => (20, 20, 20),
            TransientSignal::NotCharging => (10, 0, 10),
            TransientSignal::CcCharging => (2, 0, 0),
            TransientSignal::CvCharging => (2, 2, 0),
            TransientSignal::Done => (0, 2, 0),
            TransientSignal::Evaluating => (0, 0, 0),
        };
        SimpleOutput::Rgb { r, g, b }
    }
}

/// Tracks at most one active transient override at a time; triggering a new one replaces
/// whatever was already showing.
#[derive(Debug, Clone, Copy, Default)]
pub struct LedOverlay {
    active: Option<(TransientSignal, u32)>,
}

impl LedOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&mut self, signal: TransientSignal, now_ms: u32) {
        self.active = Some((signal, now_ms));
    }

    /// Clear any active transient immediately, without waiting for it to time out.
    pub fn clear(&mut self) {
        self.active = None;
    }

    /// Resolve the color that should actually be driven at `now_ms`, given the mode's own
    /// `underlying` output: the active transient color while it's still within its window, or
    /// `underlying` once the window has elapsed.
    pub fn resolve(&mut self, now_ms: u32, underlying: Option<SimpleOutput>) -> Option<SimpleOutput> {
        if let Some((signal, started)) = self.active {
            if now_ms.saturating_sub(started) < TRANSIENT_DURATION_MS {
                return Some(signal.color());
            }
            self.active = None;
        }
        underlying
    }
}
