//! Host-side wiring that drives a [`Chip`] against a real stdin/stdout terminal: one thread reads
//! USB command lines, another fires the tick/auto-off signals on a fixed cadence, both operating
//! on a [`Mutex`]-guarded chip. See spec §4.11, §5.
//!
//! Spec §5 describes the real firmware's concurrency model as strictly single-threaded
//! cooperative scheduling with two interrupt-equivalent callbacks. That model has no stdin to
//! read from; it has a UART ISR. Host tooling has neither a UART nor an ISR, so this module
//! approximates both with threads, grounded on `server.rs::run`'s `thread::scope` plus
//! `Mutex`-guarded shared state (`driver_lines`, `cmd_file`) rather than single-threaded polling.

use std::io::{BufRead, BufReader, Write};
use std::sync::Mutex;
use std::time::Duration;

use crate::chip_state::Chip;
use crate::hal::Hal;
use crate::log::Log;
use crate::settings::SettingsManager;
use crate::storage::Storage;
use crate::sync::ChipSignals;
use crate::usb_manager;

/// Wall-clock spacing between simulated `chipTickInterrupt` firings.
const TICK_INTERVAL: Duration = Duration::from_millis(20);
/// How many ticks make up one simulated `autoOffTimerInterrupt` firing (spec §4.11: ~0.1 Hz).
const TICKS_PER_AUTO_OFF_FIRING: u32 = 500;

struct Shared<H: Hal> {
    chip: Chip<H>,
    settings: SettingsManager,
    storage: Storage,
}

/// Run the firmware core against `hal` until stdin closes.
///
/// Spawns a tick thread (driving [`Chip::state_task`] on [`TICK_INTERVAL`]) alongside a thread
/// reading `\n`-terminated command lines from stdin and writing responses to stdout, both
/// borrowing the same [`Mutex`]-guarded [`Chip`]/[`SettingsManager`]/[`Storage`].
///
/// # Errors
///
/// Returns an error if stdin/stdout I/O fails.
pub fn run<H: Hal + Send>(hal: H, mode_count: u8, log: &(dyn Log + Sync)) -> std::io::Result<()> {
    let storage = Storage::new(mode_count);
    let settings = SettingsManager::load(&storage);
    let chip = Chip::new(hal, mode_count);
    let shared = Mutex::new(Shared { chip, settings, storage });
    let signals = ChipSignals::new();

    std::thread::scope(|scope| {
        scope.spawn(|| {
            let mut now_ms: u32 = 0;
            let mut ticks_since_auto_off: u32 = 0;
            loop {
                std::thread::sleep(TICK_INTERVAL);
                now_ms = now_ms.wrapping_add(TICK_INTERVAL.as_millis() as u32);
                signals.tick.set();
                ticks_since_auto_off += 1;
                if ticks_since_auto_off >= TICKS_PER_AUTO_OFF_FIRING {
                    ticks_since_auto_off = 0;
                    signals.auto_off_timer.set();
                }
                let mut guard = shared.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
                let settings = *guard.settings.current();
                if let Err(e) = guard.chip.state_task(now_ms, &signals, &settings, log) {
                    log.log(&format!("{{\"error\":\"state_task failed: {e:?}\"}}"));
                }
            }
        });

        let mut stdin = BufReader::new(std::io::stdin());
        let mut stdout = std::io::stdout();
        let mut line = String::new();
        loop {
            line.clear();
            if stdin.read_line(&mut line)? == 0 {
                return Ok(());
            }
            let trimmed = line.trim_end_matches(['\r', '\n']);
            if trimmed.is_empty() {
                continue;
            }
            let response = {
                let mut guard = shared.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
                let Shared { chip, settings, storage } = &mut *guard;
                let (mode_manager, hal) = chip.mode_manager_and_hal();
                usb_manager::dispatch(trimmed, mode_manager, settings, storage, hal, log)
            };
            if let Some(response) = response {
                stdout.write_all(response.as_bytes())?;
                stdout.write_all(b"\n")?;
                stdout.flush()?;
            }
        }
    })
}
