//! Interrupt-to-main-loop signaling primitives. See spec §5.
//!
//! Grounded on `state::Guard`'s `RwLock`-with-poison-handling shape, but for the narrower case of
//! a boolean flag set from interrupt context and drained by the main loop — an `AtomicBool` is the
//! idiomatic replacement for what the firmware implements as a `volatile` flag plus a disable-irq
//! critical section.

use std::sync::atomic::{AtomicBool, Ordering};

/// A one-shot flag: settable from interrupt context, observed and cleared by the main loop.
///
/// `take` is the only way to observe a `true` value — reading does not require a separate clear
/// step, which mirrors the original `chipTickInterrupt`/`stateTask` pairing where the ISR sets the
/// flag and the task that consumes it clears it in the same breath to avoid missing a tick.
#[derive(Debug, Default)]
pub struct InterruptFlag {
    flag: AtomicBool,
}

impl InterruptFlag {
    pub fn new() -> Self {
        InterruptFlag { flag: AtomicBool::new(false) }
    }

    /// Set the flag. Safe to call from an interrupt handler: never blocks, never allocates.
    pub fn set(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Atomically read and clear the flag, returning whether it was set.
    pub fn take(&self) -> bool {
        self.flag.swap(false, Ordering::SeqCst)
    }
}

/// The two interrupt-driven signals the chip state orchestrator polls each pass: the periodic
/// tick (spec §4.11's `chipTickInterrupt`) and the auto-off timer expiring
/// (`autoOffTimerInterrupt`).
#[derive(Debug, Default)]
pub struct ChipSignals {
    pub tick: InterruptFlag,
    pub auto_off_timer: InterruptFlag,
}

impl ChipSignals {
    pub fn new() -> Self {
        ChipSignals::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_round_trips() {
        let flag = InterruptFlag::new();
        assert!(!flag.take());
        flag.set();
        assert!(flag.take());
        assert!(!flag.take());
    }

    #[test]
    fn chip_signals_are_independent() {
        let signals = ChipSignals::new();
        signals.tick.set();
        assert!(signals.tick.take());
        assert!(!signals.auto_off_timer.take());
    }
}
