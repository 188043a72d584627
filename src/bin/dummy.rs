//! A dummy entry point for `bulbctl`: runs the firmware core against an in-memory [`DummyHal`]
//! for interactive manual testing, the same role slonk's own `dummy.rs` plays for hardware that
//! isn't a real target device.
//!
//! # Arguments
//!
//! The first argument (via `std::env::args`) is the mode count to configure the chip with,
//! defaulting to 1 if not given.

use bulbctl::hal::DummyHal;
use bulbctl::log::UserLog;

fn main() -> std::io::Result<()> {
    let mode_count: u8 = std::env::args().nth(1).and_then(|s| s.parse().ok()).unwrap_or(1);

    let log = UserLog::new(std::io::sink());
    let hal = DummyHal::new(usize::from(mode_count.max(1)), 2048);
    bulbctl::runtime::run(hal, mode_count, &log)
}
