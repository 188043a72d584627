//! Logging for the firmware core and the host tools that drive it.
//!
//! The firmware core itself only ever calls a single logging operation — `manager.log(msg)` in
//! the original C, one function pointer, no levels — so the types here are split in two: [`Log`]
//! is the narrow trait the core borrows (grouped with other hardware collaborators rather than
//! threaded through as a bare function pointer, per the "group collaborators" shape used
//! elsewhere), and [`UserLog`] is the leveled, timestamped, dual-writing logger the host binaries
//! construct and hand in as a `Log` implementation.

use std::{fmt::Display, io::Write, sync::Mutex, time::SystemTime};

/// The logging operation the firmware core actually needs: write one line, no levels.
pub trait Log {
    fn log(&self, message: &str);
}

impl<W: Write> Log for UserLog<W> {
    fn log(&self, message: &str) {
        // The core has no notion of severity, so every message it sends arrives at `Info`.
        let _ = self.info(message);
    }
}

/// A no-op logger for tests and throwaway tools that don't care about output.
pub struct NullLog;

impl Log for NullLog {
    fn log(&self, _message: &str) {}
}

/// A log for data displayed to the user, leveled and timestamped, double-written to stdout (with
/// ANSI color) and to a backing buffer.
pub struct UserLog<W: Write> {
    log_buffer: Mutex<W>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum LogLevel {
    Debug = 0,
    Info = 1,
    Warn = 2,
    Critical = 3,
}

impl Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                LogLevel::Debug => "DEBUG",
                LogLevel::Info => "INFO",
                LogLevel::Warn => "WARN",
                LogLevel::Critical => "CRITICAL",
            }
        )
    }
}

impl<W: Write> UserLog<W> {
    pub fn new(buf: W) -> UserLog<W> {
        UserLog { log_buffer: Mutex::new(buf) }
    }

    #[allow(clippy::missing_errors_doc)]
    pub fn debug(&self, string: &str) -> std::io::Result<()> {
        self.write(LogLevel::Debug, string)
    }

    #[allow(clippy::missing_errors_doc)]
    pub fn info(&self, string: &str) -> std::io::Result<()> {
        self.write(LogLevel::Info, string)
    }

    #[allow(clippy::missing_errors_doc)]
    pub fn warn(&self, string: &str) -> std::io::Result<()> {
        self.write(LogLevel::Warn, string)
    }

    #[allow(clippy::missing_errors_doc)]
    pub fn critical(&self, string: &str) -> std::io::Result<()> {
        self.write(LogLevel::Critical, string)
    }

    fn write(&self, level: LogLevel, string: &str) -> std::io::Result<()> {
        let log_time_nanos = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap()
            .as_nanos();

        match level {
            LogLevel::Critical => print!("\x1b[31m"),
            LogLevel::Warn => print!("\x1b[33m"),
            LogLevel::Info => (),
            LogLevel::Debug => print!("\x1b[90m"),
        };
        println!("[{log_time_nanos}] [{level}] {string}");
        print!("\x1b[0m");

        writeln!(self.log_buffer.lock().unwrap(), "[{log_time_nanos}] [{level}] {string}")?;
        Ok(())
    }
}
