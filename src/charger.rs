//! Charger IC driver: state tracking, dual polling, the charging-LED flash pattern, and the
//! unplug-lock. See spec §4.6.
//!
//! Grounded on `data.rs`'s polling-loop shape (a periodic interval check alongside an
//! interrupt-driven "read now" path), adapted here into pure state advanced by timestamps rather
//! than a thread that sleeps, matching the rest of this crate's host-testable style.

use crate::led::TransientSignal;
use crate::sync::InterruptFlag;

/// How often the charger IC is re-polled even with no interrupt (spec §4.6: "~30s cadence").
pub const PERIODIC_POLL_MS: u32 = 30_000;
/// The flash's repeat period, expressed as the bitmask spec §4.6's `ms & 0x3FF < 50` uses.
const FLASH_PERIOD_MASK: u32 = 0x3FF;
/// How much of each [`FLASH_PERIOD_MASK`] window the indicator spends lit.
const FLASH_ON_MS: u32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargeState {
    /// No charger plugged in.
    NotConnected,
    /// Plugged in, but the IC isn't actively charging (e.g. a fault condition).
    NotCharging,
    /// Actively charging in the constant-current phase.
    ConstantCurrent,
    /// Actively charging in the constant-voltage phase.
    ConstantVoltage,
    /// Charging has completed.
    Done,
}

/// Tracks the charger IC's reported state, decides when the flash LED should be lit, and
/// enforces the unplug-lock.
pub struct ChargerDriver {
    state: ChargeState,
    last_poll_ms: Option<u32>,
    flash_enabled: bool,
    locked: bool,
}

impl ChargerDriver {
    pub fn new() -> Self {
        ChargerDriver {
            state: ChargeState::NotConnected,
            last_poll_ms: None,
            flash_enabled: false,
            locked: false,
        }
    }

    pub fn state(&self) -> ChargeState {
        self.state
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn is_charging(&self) -> bool {
        matches!(self.state, ChargeState::ConstantCurrent | ChargeState::ConstantVoltage)
    }

    /// Poll the charger IC if either the periodic interval has elapsed or `on_demand` is set
    /// (spec §4.6's dual polling: a steady ~30s cadence plus an immediate interrupt-driven read).
    ///
    /// `unplug_lock_enabled` gates the disconnect-locks-the-IC behavior (spec §4.6/§4.11 step 5:
    /// only armed while the chip is off — locking on every disconnect during normal use would
    /// ship-mode the charger out from under an active user). `read` performs the actual IC
    /// register read; it is only invoked when a poll is due, so callers can wire in real I2C
    /// traffic without it firing every tick.
    pub fn poll(
        &mut self,
        now_ms: u32,
        on_demand: &InterruptFlag,
        unplug_lock_enabled: bool,
        read: impl FnOnce() -> ChargeState,
    ) {
        if self.is_due(now_ms, on_demand) {
            let new_state = read();
            self.apply_state(new_state, unplug_lock_enabled);
        }
    }

    /// Same dual-polling gate as [`poll`](Self::poll), for a `read` that can fail (e.g. a real
    /// I2C transaction through [`crate::hal::Hal`]).
    pub fn poll_fallible<E>(
        &mut self,
        now_ms: u32,
        on_demand: &InterruptFlag,
        unplug_lock_enabled: bool,
        read: impl FnOnce() -> Result<ChargeState, E>,
    ) -> Result<(), E> {
        if self.is_due(now_ms, on_demand) {
            let new_state = read()?;
            self.apply_state(new_state, unplug_lock_enabled);
        }
        Ok(())
    }

    fn is_due(&mut self, now_ms: u32, on_demand: &InterruptFlag) -> bool {
        let on_demand_due = on_demand.take();
        let periodic_due = match self.last_poll_ms {
            None => true,
            Some(last) => now_ms.saturating_sub(last) >= PERIODIC_POLL_MS,
        };
        let due = on_demand_due || periodic_due;
        if due {
            self.last_poll_ms = Some(now_ms);
        }
        due
    }

    fn apply_state(&mut self, new_state: ChargeState, unplug_lock_enabled: bool) {
        let was_connected = self.state != ChargeState::NotConnected;
        self.state = new_state;
        self.flash_enabled = matches!(
            new_state,
            ChargeState::ConstantCurrent | ChargeState::ConstantVoltage
        );

        // Unplugging while off locks the IC into ship mode (or triggers a hardware reset) until
        // the user explicitly wakes it (spec §4.6's unplug-lock behavior).
        if new_state == ChargeState::NotConnected && was_connected && unplug_lock_enabled {
            self.lock();
        }
    }

    /// Whether the charging-indicator LED should currently be lit, per spec §4.6's literal
    /// bit-pattern: on for the first 50ms of every 1024ms window, while the flash is enabled.
    pub fn flash_is_on(&self, now_ms: u32) -> bool {
        self.flash_enabled && (now_ms & FLASH_PERIOD_MASK) < FLASH_ON_MS
    }

    /// The case-LED cue matching the current charger state, or `None` when there's nothing to
    /// show (no charger connected).
    pub fn cue(&self) -> Option<TransientSignal> {
        match self.state {
            ChargeState::NotConnected => None,
            ChargeState::NotCharging => Some(TransientSignal::NotCharging),
            ChargeState::ConstantCurrent => Some(TransientSignal::CcCharging),
            ChargeState::ConstantVoltage => Some(TransientSignal::CvCharging),
            ChargeState::Done => Some(TransientSignal::Done),
        }
    }

    /// Put the charger IC into ship mode (disables charging and discharge FETs until woken).
    pub fn lock(&mut self) {
        self.locked = true;
    }

    /// Wake the charger IC out of ship mode, e.g. after a hardware reset or explicit user action.
    pub fn unlock(&mut self) {
        self.locked = false;
    }
}

impl Default for ChargerDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn periodic_poll_fires_after_interval() {
        let mut charger = ChargerDriver::new();
        let flag = InterruptFlag::new();
        let mut calls = 0;
        charger.poll(0, &flag, false, || {
            calls += 1;
            ChargeState::NotCharging
        });
        assert_eq!(calls, 1); // first poll always due

        charger.poll(1_000, &flag, false, || {
            calls += 1;
            ChargeState::NotCharging
        });
        assert_eq!(calls, 1); // too soon

        charger.poll(PERIODIC_POLL_MS + 1, &flag, false, || {
            calls += 1;
            ChargeState::NotCharging
        });
        assert_eq!(calls, 2);
    }

    #[test]
    fn on_demand_flag_forces_an_immediate_poll() {
        let mut charger = ChargerDriver::new();
        let flag = InterruptFlag::new();
        flag.set();
        let mut calls = 0;
        charger.poll(5, &flag, false, || {
            calls += 1;
            ChargeState::ConstantCurrent
        });
        assert_eq!(calls, 1);
        assert!(!flag.take());
    }

    #[test]
    fn flash_pattern_is_periodic_while_charging() {
        let mut charger = ChargerDriver::new();
        let flag = InterruptFlag::new();
        charger.poll(0, &flag, false, || ChargeState::ConstantCurrent);
        assert!(charger.flash_is_on(0));
        assert!(!charger.flash_is_on(500));
        assert!(charger.flash_is_on(1_024));
    }

    #[test]
    fn unplugging_while_off_locks_the_charger() {
        let mut charger = ChargerDriver::new();
        let flag = InterruptFlag::new();
        charger.poll(0, &flag, true, || ChargeState::ConstantCurrent);
        assert!(!charger.is_locked());
        charger.poll(PERIODIC_POLL_MS, &flag, true, || ChargeState::NotConnected);
        assert!(charger.is_locked());
    }

    #[test]
    fn unplugging_while_active_does_not_lock() {
        // unplug_lock_enabled is only armed while the chip is off; a disconnect during normal,
        // active use must not ship-mode the charger out from under the user.
        let mut charger = ChargerDriver::new();
        let flag = InterruptFlag::new();
        charger.poll(0, &flag, false, || ChargeState::ConstantCurrent);
        assert!(!charger.is_locked());
        charger.poll(PERIODIC_POLL_MS, &flag, false, || ChargeState::NotConnected);
        assert!(!charger.is_locked());
    }

    #[test]
    fn unplugging_when_already_disconnected_does_not_lock() {
        let mut charger = ChargerDriver::new();
        let flag = InterruptFlag::new();
        charger.poll(0, &flag, true, || ChargeState::NotConnected);
        assert!(!charger.is_locked());
    }

    #[test]
    fn cue_reflects_the_current_charge_state() {
        let mut charger = ChargerDriver::new();
        let flag = InterruptFlag::new();
        assert_eq!(charger.cue(), None);
        charger.poll(0, &flag, false, || ChargeState::ConstantVoltage);
        assert_eq!(charger.cue(), Some(TransientSignal::CvCharging));
        charger.poll(PERIODIC_POLL_MS, &flag, false, || ChargeState::Done);
        assert_eq!(charger.cue(), Some(TransientSignal::Done));
    }
}
