//! Top-level orchestration: ties the mode manager, button, charger, accelerometer, and LED
//! overlays together into the single per-iteration `state_task`, and tracks the chip's power
//! state (auto-off / fake-off / lock). See spec §4.11.
//!
//! Grounded on `main.rs`/`server::run`'s top-level wiring shape (one object owning every
//! subsystem, one function driving them all each pass) and `execution.rs::handle_command`'s
//! "dispatch on an event, only reset shared counters when something real happened" pattern.

use crate::accel::AccelDetector;
use crate::button::{ButtonOutcome, ButtonState};
use crate::charger::ChargerDriver;
use crate::hal::Hal;
use crate::led::{LedOverlay, TransientSignal};
use crate::log::Log;
use crate::mode_manager::{ModeManager, ModeOutputs};
use crate::model::{BulbLevel, ChipSettings, SimpleOutput};
use crate::sync::{ChipSignals, InterruptFlag};

/// `minutes` converted to however many `autoOffTimerInterrupt` firings that many minutes
/// represents. The timer fires at ~0.1 Hz, so one minute is 6 ticks (spec §4.11:
/// `minutesUntilAutoOff * 6`, written here as `* 60 / 10` to match the wording spec.md uses
/// elsewhere for the same conversion).
///
/// `minutes == 0` yields `0` ticks, tripping on the very next firing rather than disabling the
/// timer — an accepted quirk carried over from the original firmware rather than special-cased
/// away (see `DESIGN.md`).
fn minutes_to_ticks(minutes: u8) -> u32 {
    u32::from(minutes) * 60 / 10
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChipPowerState {
    /// Fully awake: LEDs animate, USB is live, button/accel are sampled.
    Active,
    /// Auto-off has tripped: outputs are held off, but the chip is still ready to wake on
    /// activity.
    FakeOff,
    /// The lock timer has also tripped: the charger IC has been put in ship mode.
    Locked,
}

fn off_output() -> SimpleOutput {
    SimpleOutput::Bulb { value: BulbLevel::Low }
}

/// Owns every runtime subsystem and drives them all from a single `state_task` call per main-loop
/// iteration.
pub struct Chip<H: Hal> {
    hal: H,
    mode_manager: ModeManager,
    button: ButtonState,
    button_prev_raw: bool,
    charger: ChargerDriver,
    charger_interrupt: InterruptFlag,
    accel: AccelDetector,
    front_led: LedOverlay,
    case_led: LedOverlay,
    power: ChipPowerState,
    ticks_since_activity: u32,
}

impl<H: Hal> Chip<H> {
    pub fn new(hal: H, mode_count: u8) -> Self {
        Chip {
            hal,
            mode_manager: ModeManager::new(mode_count),
            button: ButtonState::new(),
            button_prev_raw: false,
            charger: ChargerDriver::new(),
            charger_interrupt: InterruptFlag::new(),
            accel: AccelDetector::new(),
            front_led: LedOverlay::new(),
            case_led: LedOverlay::new(),
            power: ChipPowerState::Active,
            ticks_since_activity: 0,
        }
    }

    pub fn power_state(&self) -> ChipPowerState {
        self.power
    }

    pub fn mode_manager(&mut self) -> &mut ModeManager {
        &mut self.mode_manager
    }

    pub fn hal(&mut self) -> &mut H {
        &mut self.hal
    }

    /// Borrow the mode manager and the HAL at once. A plain `chip.mode_manager()` and
    /// `chip.hal()` pair can't both be live as call arguments — each accessor opaquely borrows
    /// all of `*self` from the caller's point of view — so callers that need both (the USB
    /// dispatch path) go through this instead, where the two fields are visibly disjoint.
    pub fn mode_manager_and_hal(&mut self) -> (&mut ModeManager, &mut H) {
        (&mut self.mode_manager, &mut self.hal)
    }

    /// The charger IC's own interrupt line, separate from [`ChipSignals`]: an ISR-equivalent
    /// caller sets this to force an immediate poll outside the ~30s cadence.
    pub fn charger_interrupt(&self) -> &InterruptFlag {
        &self.charger_interrupt
    }

    fn apply_output(&mut self, output: SimpleOutput) -> Result<(), H::Error> {
        match output {
            SimpleOutput::Bulb { value } => self.hal.write_bulb(value == BulbLevel::High),
            SimpleOutput::Rgb { r, g, b } => self.hal.write_rgb(r, g, b),
        }
    }

    /// Auto-off / lock timer handling: spec §4.11 step 1.
    fn advance_power_timer(&mut self, settings: &ChipSettings) -> Result<(), H::Error> {
        let charging = self.charger.is_charging();
        if !charging {
            self.ticks_since_activity += 1;
        }
        let threshold = match self.power {
            ChipPowerState::FakeOff => minutes_to_ticks(settings.minutes_until_lock_after_auto_off),
            ChipPowerState::Active | ChipPowerState::Locked => {
                minutes_to_ticks(settings.minutes_until_auto_off)
            }
        };
        if self.ticks_since_activity < threshold {
            return Ok(());
        }
        match self.power {
            ChipPowerState::FakeOff => {
                self.charger.lock();
                self.hal.lock_charger()?;
                self.power = ChipPowerState::Locked;
            }
            ChipPowerState::Active => {
                self.power = ChipPowerState::FakeOff;
                self.ticks_since_activity = 0;
            }
            ChipPowerState::Locked => {}
        }
        Ok(())
    }

    fn register_activity(&mut self) {
        self.ticks_since_activity = 0;
        if self.power == ChipPowerState::FakeOff {
            self.power = ChipPowerState::Active;
        }
    }

    /// Run one iteration of the main loop at timestamp `now_ms`, draining `signals` and acting on
    /// whichever are set.
    pub fn state_task(
        &mut self,
        now_ms: u32,
        signals: &ChipSignals,
        settings: &ChipSettings,
        log: &dyn Log,
    ) -> Result<(), H::Error> {
        signals.tick.take();
        if signals.auto_off_timer.take() {
            self.advance_power_timer(settings)?;
        }

        let is_off = self.power != ChipPowerState::Active;
        // Captured before `button.task` runs below, per spec §4.11 step 2: it reflects the
        // previous tick's debounce phase, not this tick's.
        let can_update_case_led = !self.button.is_evaluating();

        self.accel.sample(self.hal.read_accel()?, now_ms);
        let (outputs, errors) = if is_off {
            (ModeOutputs { front: None, case_comp: None }, Vec::new())
        } else {
            self.mode_manager.mode_task(
                now_ms,
                &self.accel,
                u32::from(settings.equation_eval_interval_ms),
            )
        };
        for e in &errors {
            log.log(&format!(r#"{{"error":"{e}"}}"#));
        }

        // The raw pin edge stands in for the GPIO EXTI interrupt spec §4.5 expects to arm a new
        // evaluation window; host tooling has no such interrupt, only the polled pin reading.
        let raw_pressed = self.hal.read_button()?;
        let interrupt_triggered = raw_pressed && !self.button_prev_raw;
        self.button_prev_raw = raw_pressed;
        let (outcome, cue) = self.button.task(raw_pressed, now_ms, interrupt_triggered);
        match outcome {
            ButtonOutcome::Clicked => {
                let mode_count = u16::from(self.mode_manager.mode_count().max(1));
                let next = ((u16::from(self.mode_manager.active_index()) + 1) % mode_count) as u8;
                let _ = self.mode_manager.set_mode(next);
            }
            ButtonOutcome::Shutdown => {
                self.power = ChipPowerState::FakeOff;
                self.ticks_since_activity = 0;
            }
            ButtonOutcome::LockOrHardwareReset => {
                self.charger.lock();
                self.hal.lock_charger()?;
                self.power = ChipPowerState::Locked;
            }
            ButtonOutcome::Ignore => {}
        }
        if outcome != ButtonOutcome::Ignore {
            self.register_activity();
        }
        if let Some(signal) = cue {
            self.case_led.trigger(signal, now_ms);
        }

        // Re-read after a possible `Shutdown`/`LockOrHardwareReset` transition just above, so the
        // unplug-lock and charge-LED gating below reflect this tick's power state.
        let is_off = self.power != ChipPowerState::Active;
        let unplug_lock_enabled = is_off;
        {
            let hal = &mut self.hal;
            self.charger.poll_fallible(now_ms, &self.charger_interrupt, unplug_lock_enabled, || {
                hal.read_charger()
            })?;
        }
        let charge_led_enabled = is_off && can_update_case_led;

        if let Some(front) = self.front_led.resolve(now_ms, outputs.front.or(is_off.then(off_output))) {
            self.apply_output(front)?;
        }
        if can_update_case_led {
            let underlying = if charge_led_enabled && self.charger.flash_is_on(now_ms) {
                self.charger.cue().map(TransientSignal::color).or(is_off.then(off_output))
            } else {
                outputs.case_comp.or(is_off.then(off_output))
            };
            if let Some(case) = self.case_led.resolve(now_ms, underlying) {
                self.apply_output(case)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::charger::ChargeState;
    use crate::hal::DummyHal;
    use crate::log::NullLog;

    fn settings(auto_off_minutes: u8, lock_minutes: u8) -> ChipSettings {
        ChipSettings {
            minutes_until_auto_off: auto_off_minutes,
            minutes_until_lock_after_auto_off: lock_minutes,
            ..ChipSettings::default()
        }
    }

    #[test]
    fn zero_minutes_is_the_documented_immediate_trip_quirk() {
        assert_eq!(minutes_to_ticks(0), 0);
    }

    #[test]
    fn auto_off_timer_trips_into_fake_off() {
        let mut chip = Chip::new(DummyHal::new(1, 16), 1);
        let signals = ChipSignals::new();
        signals.auto_off_timer.set();
        chip.state_task(0, &signals, &settings(0, 10), &NullLog).unwrap();
        assert_eq!(chip.power_state(), ChipPowerState::FakeOff);
    }

    #[test]
    fn fake_off_locks_the_charger_after_enough_ticks() {
        let mut chip = Chip::new(DummyHal::new(1, 16), 1);
        let signals = ChipSignals::new();
        signals.auto_off_timer.set();
        chip.state_task(0, &signals, &settings(0, 0), &NullLog).unwrap();
        assert_eq!(chip.power_state(), ChipPowerState::FakeOff);

        signals.auto_off_timer.set();
        chip.state_task(10, &signals, &settings(0, 0), &NullLog).unwrap();
        assert_eq!(chip.power_state(), ChipPowerState::Locked);
        assert!(chip.hal().charger_locked);
    }

    #[test]
    fn button_click_cycles_the_active_mode() {
        let mut chip = Chip::new(DummyHal::new(2, 16), 2);
        let signals = ChipSignals::new();
        assert_eq!(chip.mode_manager().active_index(), crate::model::FAKE_OFF_MODE_INDEX);

        chip.hal().button_pressed = true;
        chip.state_task(0, &signals, &settings(90, 10), &NullLog).unwrap(); // arms evaluation
        chip.hal().button_pressed = false;
        chip.state_task(60, &signals, &settings(90, 10), &NullLog).unwrap(); // release commits a click
        assert_eq!(chip.mode_manager().active_index(), 0);
    }

    #[test]
    fn holding_the_button_does_not_click_until_release() {
        let mut chip = Chip::new(DummyHal::new(2, 16), 2);
        let signals = ChipSignals::new();
        chip.hal().button_pressed = true;
        chip.state_task(0, &signals, &settings(90, 10), &NullLog).unwrap();
        chip.state_task(60, &signals, &settings(90, 10), &NullLog).unwrap();
        assert_eq!(chip.mode_manager().active_index(), crate::model::FAKE_OFF_MODE_INDEX);
    }

    #[test]
    fn a_long_press_released_past_the_lock_band_locks_the_charger() {
        let mut chip = Chip::new(DummyHal::new(1, 16), 1);
        let signals = ChipSignals::new();
        chip.hal().button_pressed = true;
        chip.state_task(0, &signals, &settings(90, 10), &NullLog).unwrap(); // arms evaluation
        chip.state_task(2_050, &signals, &settings(90, 10), &NullLog).unwrap(); // still held, in the lock band
        assert_eq!(chip.power_state(), ChipPowerState::Active); // the cue shows, but nothing commits yet
        chip.hal().button_pressed = false;
        chip.state_task(2_080, &signals, &settings(90, 10), &NullLog).unwrap(); // released past the lock band
        assert_eq!(chip.power_state(), ChipPowerState::Locked);
        assert!(chip.hal().charger_locked);
    }

    #[test]
    fn button_click_wakes_the_chip_from_fake_off() {
        let mut chip = Chip::new(DummyHal::new(1, 16), 1);
        let signals = ChipSignals::new();
        signals.auto_off_timer.set();
        chip.state_task(0, &signals, &settings(0, 10), &NullLog).unwrap();
        assert_eq!(chip.power_state(), ChipPowerState::FakeOff);

        chip.hal().button_pressed = true;
        chip.state_task(10, &signals, &settings(0, 10), &NullLog).unwrap(); // arms evaluation
        chip.hal().button_pressed = false;
        chip.state_task(70, &signals, &settings(0, 10), &NullLog).unwrap(); // release commits a click
        assert_eq!(chip.power_state(), ChipPowerState::Active);
    }

    #[test]
    fn charging_flash_drives_the_case_led_while_off() {
        let mut chip = Chip::new(DummyHal::new(1, 16), 1);
        chip.hal().charger_state = ChargeState::ConstantCurrent;
        let signals = ChipSignals::new();
        signals.auto_off_timer.set();
        chip.state_task(0, &signals, &settings(0, 10), &NullLog).unwrap();
        assert_eq!(chip.power_state(), ChipPowerState::FakeOff);

        assert!(chip.hal().rgb_history.iter().any(|&rgb| rgb == (2, 0, 0)));
    }

    #[test]
    fn unplugging_while_active_does_not_lock_the_charger() {
        let mut chip = Chip::new(DummyHal::new(1, 16), 1);
        let signals = ChipSignals::new();
        chip.hal().charger_state = ChargeState::ConstantCurrent;
        chip.state_task(0, &signals, &settings(90, 10), &NullLog).unwrap();
        chip.hal().charger_state = ChargeState::NotConnected;
        chip.charger_interrupt().set();
        chip.state_task(10, &signals, &settings(90, 10), &NullLog).unwrap();
        assert!(!chip.hal().charger_locked);
    }
}
