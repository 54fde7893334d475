// kernel/src/logging/mod.rs
//
// Kernel log.
//
// Role:
// - the one log call every subsystem and collaborator uses:
//   log(level, subsystem, message)
// - filter by minimum level and per-subsystem mask
// - fan out to the enabled outputs: MEMORY ring (always compiled, off by
//   default; whoever turns it on reads it through with_logger),
//   SERIAL (COM1) and VGA text mode (bare-metal target only)
//
// Doesn't:
// - allocate. Formatted messages go through a fixed buffer and are truncated.
// - get used from fault handlers. Those write through panic.rs's unlocked path.

mod buffer;

#[cfg(all(target_os = "none", feature = "log_serial"))]
pub mod serial;
#[cfg(any(test, all(target_os = "none", feature = "log_vga")))]
mod vga;

use core::fmt;

use bitflags::bitflags;
use spin::Mutex;

pub use buffer::{FixedStr, LogBuffer, LogRecord, LOG_BUFFER_CAP, MESSAGE_CAP};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Level {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
    Fatal = 5,
}

impl Level {
    pub const fn prefix(self) -> &'static str {
        match self {
            Level::Trace => "[TRACE] ",
            Level::Debug => "[DEBUG] ",
            Level::Info => "[INFO] ",
            Level::Warn => "[WARN] ",
            Level::Error => "[ERROR] ",
            Level::Fatal => "[FATAL] ",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Subsystem {
    Boot = 0,
    Kernel = 1,
    Memory = 2,
    Interrupts = 3,
    Process = 4,
    Graphics = 5,
    Audio = 6,
    Network = 7,
    Shell = 8,
    Drivers = 9,
}

impl Subsystem {
    pub const ALL_MASK: u16 = (1 << 10) - 1;

    pub const fn bit(self) -> u16 {
        1 << (self as u16)
    }

    pub const fn name(self) -> &'static str {
        match self {
            Subsystem::Boot => "boot",
            Subsystem::Kernel => "kernel",
            Subsystem::Memory => "memory",
            Subsystem::Interrupts => "interrupts",
            Subsystem::Process => "process",
            Subsystem::Graphics => "graphics",
            Subsystem::Audio => "audio",
            Subsystem::Network => "network",
            Subsystem::Shell => "shell",
            Subsystem::Drivers => "drivers",
        }
    }
}

bitflags! {
    /// Where accepted records go.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct Outputs: u8 {
        const VGA = 1 << 0;
        const SERIAL = 1 << 1;
        const MEMORY = 1 << 2;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LogConfig {
    pub min_level: Level,
    pub outputs: Outputs,
    pub subsystem_mask: u16,
}

impl LogConfig {
    pub const DEFAULT: LogConfig = LogConfig {
        min_level: Level::Info,
        outputs: Outputs::VGA.union(Outputs::SERIAL),
        subsystem_mask: Subsystem::ALL_MASK,
    };
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LogStats {
    pub accepted: u64,
    pub filtered: u64,
    pub warnings: u64,
    pub errors: u64,
    pub fatals: u64,
}

pub struct Logger {
    config: LogConfig,
    ring: LogBuffer,
    stats: LogStats,
    sequence: u64,
}

impl Logger {
    pub const fn new(config: LogConfig) -> Self {
        Logger {
            config,
            ring: LogBuffer::new(),
            stats: LogStats {
                accepted: 0,
                filtered: 0,
                warnings: 0,
                errors: 0,
                fatals: 0,
            },
            sequence: 0,
        }
    }

    pub fn config(&self) -> LogConfig {
        self.config
    }

    pub fn set_config(&mut self, config: LogConfig) {
        self.config = config;
    }

    pub fn enabled(&self, level: Level, subsystem: Subsystem) -> bool {
        level >= self.config.min_level && self.config.subsystem_mask & subsystem.bit() != 0
    }

    /// Filters, counts and stores one record. Returns false if filtered.
    pub fn record(&mut self, level: Level, subsystem: Subsystem, msg: &str) -> bool {
        if !self.enabled(level, subsystem) {
            self.stats.filtered += 1;
            return false;
        }

        self.stats.accepted += 1;
        match level {
            Level::Warn => self.stats.warnings += 1,
            Level::Error => self.stats.errors += 1,
            Level::Fatal => self.stats.fatals += 1,
            _ => {}
        }

        let sequence = self.sequence;
        self.sequence += 1;

        if self.config.outputs.contains(Outputs::MEMORY) {
            self.ring.push(LogRecord {
                sequence,
                level,
                subsystem,
                message: FixedStr::from_str(msg),
            });
        }
        true
    }

    pub fn ring(&self) -> &LogBuffer {
        &self.ring
    }

    pub fn stats(&self) -> LogStats {
        self.stats
    }
}

static LOGGER: Mutex<Logger> = Mutex::new(Logger::new(LogConfig::DEFAULT));

/// Runs `f` on the global logger with interrupts masked on hardware, so a
/// handler can never spin on a lock its own mainline holds.
pub fn with_logger<R>(f: impl FnOnce(&mut Logger) -> R) -> R {
    #[cfg(target_os = "none")]
    {
        x86_64::instructions::interrupts::without_interrupts(|| f(&mut LOGGER.lock()))
    }
    #[cfg(not(target_os = "none"))]
    {
        f(&mut LOGGER.lock())
    }
}

pub fn init(config: LogConfig) {
    #[cfg(all(target_os = "none", feature = "log_vga"))]
    vga::init();
    #[cfg(all(target_os = "none", feature = "log_serial"))]
    serial::init();

    with_logger(|logger| logger.set_config(config));
}

pub fn log(level: Level, subsystem: Subsystem, msg: &str) {
    with_logger(|logger| {
        if !logger.record(level, subsystem, msg) {
            return;
        }
        emit(logger.config().outputs, level, subsystem, msg);
    });
}

/// Formats into a fixed buffer first; long messages are truncated.
pub fn logf(level: Level, subsystem: Subsystem, args: fmt::Arguments<'_>) {
    let mut msg: FixedStr<MESSAGE_CAP> = FixedStr::new();
    let _ = fmt::write(&mut msg, args);
    log(level, subsystem, msg.as_str());
}

#[allow(unused_variables)]
fn emit(outputs: Outputs, level: Level, subsystem: Subsystem, msg: &str) {
    #[cfg(all(target_os = "none", feature = "log_serial"))]
    if outputs.contains(Outputs::SERIAL) {
        serial::write_str(level.prefix());
        serial::write_str(subsystem.name());
        serial::write_str(": ");
        serial::write_line(msg);
    }

    #[cfg(all(target_os = "none", feature = "log_vga"))]
    if outputs.contains(Outputs::VGA) {
        vga::write_record(level, subsystem, msg);
    }
}

pub fn trace(subsystem: Subsystem, msg: &str) {
    log(Level::Trace, subsystem, msg);
}

pub fn debug(subsystem: Subsystem, msg: &str) {
    log(Level::Debug, subsystem, msg);
}

pub fn info(subsystem: Subsystem, msg: &str) {
    log(Level::Info, subsystem, msg);
}

pub fn warn(subsystem: Subsystem, msg: &str) {
    log(Level::Warn, subsystem, msg);
}

pub fn error(subsystem: Subsystem, msg: &str) {
    log(Level::Error, subsystem, msg);
}

pub fn fatal(subsystem: Subsystem, msg: &str) {
    log(Level::Fatal, subsystem, msg);
}

/// `key = value` at Info, formatted without fmt machinery.
pub fn info_u64(subsystem: Subsystem, key: &str, value: u64) {
    let mut digits = [0u8; 20];
    let value = u64_to_decimal(value, &mut digits);

    let mut msg: FixedStr<MESSAGE_CAP> = FixedStr::new();
    if !key.is_empty() {
        msg.push_str(key);
        msg.push_str(" = ");
    }
    msg.push_str(value);
    info(subsystem, msg.as_str());
}

pub fn stats() -> LogStats {
    with_logger(|logger| logger.stats())
}

pub(crate) fn u64_to_decimal(mut value: u64, buf: &mut [u8; 20]) -> &str {
    let mut i = buf.len();
    loop {
        i -= 1;
        buf[i] = b'0' + (value % 10) as u8;
        value /= 10;
        if value == 0 {
            break;
        }
    }
    core::str::from_utf8(&buf[i..]).unwrap_or("?")
}

/// `hex` formatting for addresses, fixed 16 digits.
pub(crate) fn u64_to_hex(value: u64, buf: &mut [u8; 18]) -> &str {
    buf[0] = b'0';
    buf[1] = b'x';
    for i in 0..16 {
        let n = ((value >> ((15 - i) * 4)) & 0xF) as u8;
        buf[2 + i] = if n < 10 { b'0' + n } else { b'a' + (n - 10) };
    }
    core::str::from_utf8(&buf[..]).unwrap_or("0x?")
}
