//! The `bulbctl` entry point for a real chip.
//!
//! Wiring a real STM32C071 target's I2C, PWM, and flash peripherals is out of scope (spec.md §1:
//! "no target-specific peripheral drivers"), so [`TargetHal`] below is a placeholder that compiles
//! and links but returns [`Unwired`] for every operation. A real port replaces `TargetHal` with a
//! concrete implementation of [`bulbctl::hal::Hal`] and leaves `main` unchanged.
//!
//! # Arguments
//!
//! The first argument (via `std::env::args`) is the mode count to configure the chip with,
//! defaulting to 1 if not given.

use bulbctl::accel::AccelSample;
use bulbctl::charger::ChargeState;
use bulbctl::hal::Hal;
use bulbctl::log::UserLog;

/// Indicates an operation reached a peripheral this port has not wired up.
#[derive(Debug)]
pub struct Unwired;

/// A placeholder [`Hal`] for a target whose real peripherals are not yet wired.
struct TargetHal;

impl Hal for TargetHal {
    type Error = Unwired;

    fn write_bulb(&mut self, _high: bool) -> Result<(), Self::Error> {
        Err(Unwired)
    }

    fn write_rgb(&mut self, _r: u8, _g: u8, _b: u8) -> Result<(), Self::Error> {
        Err(Unwired)
    }

    fn read_button(&mut self) -> Result<bool, Self::Error> {
        Err(Unwired)
    }

    fn read_accel(&mut self) -> Result<AccelSample, Self::Error> {
        Err(Unwired)
    }

    fn read_charger(&mut self) -> Result<ChargeState, Self::Error> {
        Err(Unwired)
    }

    fn lock_charger(&mut self) -> Result<(), Self::Error> {
        Err(Unwired)
    }

    fn read_flash_page(&mut self, _page: usize) -> Result<Vec<u8>, Self::Error> {
        Err(Unwired)
    }

    fn write_flash_page(&mut self, _page: usize, _data: &[u8]) -> Result<(), Self::Error> {
        Err(Unwired)
    }

    fn enter_dfu(&mut self) -> Result<(), Self::Error> {
        Err(Unwired)
    }
}

fn main() -> std::io::Result<()> {
    let mode_count: u8 = std::env::args().nth(1).and_then(|s| s.parse().ok()).unwrap_or(1);

    let log = UserLog::new(std::io::sink());
    bulbctl::runtime::run(TargetHal, mode_count, &log)
}
