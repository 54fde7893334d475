// kernel/src/panic.rs
//
// Panic path shared by Rust panics and CPU faults.
//
// - first entry: interrupts off, emergency output (no locks), halt
// - re-entry (a fault while already panicking): halt immediately
// - output goes straight to debugcon 0xE9 and COM1; the logger and VGA
//   writer sit behind locks that the faulting code may hold
// - the message is not formatted; location is printed as numbers only

use core::sync::atomic::{AtomicBool, Ordering};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PanicEntry {
    First,
    Reentered,
}

pub struct PanicLatch {
    tripped: AtomicBool,
}

impl PanicLatch {
    pub const fn new() -> Self {
        PanicLatch {
            tripped: AtomicBool::new(false),
        }
    }

    pub fn enter(&self) -> PanicEntry {
        if self.tripped.swap(true, Ordering::AcqRel) {
            PanicEntry::Reentered
        } else {
            PanicEntry::First
        }
    }

    pub fn is_tripped(&self) -> bool {
        self.tripped.load(Ordering::Acquire)
    }
}

impl Default for PanicLatch {
    fn default() -> Self {
        Self::new()
    }
}

pub static PANIC_LATCH: PanicLatch = PanicLatch::new();

#[cfg(target_os = "none")]
mod halt {
    use core::panic::PanicInfo;

    use x86_64::instructions::interrupts;
    use x86_64::instructions::port::Port;

    use super::{PanicEntry, PANIC_LATCH};
    use crate::arch;
    use crate::interrupts::FaultReport;
    use crate::mem::layout::{DEBUGCON_PORT, SERIAL_PORT_BASE};

    const LSR_THR_EMPTY: u8 = 0x20;

    fn emergency_write_byte(b: u8) {
        unsafe {
            Port::<u8>::new(DEBUGCON_PORT).write(b);

            let mut lsr = Port::<u8>::new(SERIAL_PORT_BASE + 5);
            let mut data = Port::<u8>::new(SERIAL_PORT_BASE);
            for _ in 0..10_000 {
                if (lsr.read() & LSR_THR_EMPTY) != 0 {
                    break;
                }
            }
            data.write(b);
        }
    }

    fn emergency_write_str(s: &str) {
        for b in s.bytes() {
            emergency_write_byte(b);
        }
    }

    fn emergency_write_hex_u64(v: u64) {
        let mut buf = [0u8; 18];
        emergency_write_str(crate::logging::u64_to_hex(v, &mut buf));
    }

    /// Interrupts off and latch taken; false means we were already here.
    fn enter() -> bool {
        interrupts::disable();
        if PANIC_LATCH.enter() == PanicEntry::Reentered {
            emergency_write_str("[PANIC] re-entered => halt\n");
            return false;
        }
        crate::kernel::mark_panicked();
        true
    }

    pub fn fault_panic(report: &FaultReport) -> ! {
        if enter() {
            emergency_write_str("[PANIC] unhandled exception: ");
            emergency_write_str(report.description());
            emergency_write_str("\n[PANIC] vector=");
            emergency_write_hex_u64(report.kind.vector() as u64);
            emergency_write_str(" rip=");
            emergency_write_hex_u64(report.frame.instruction_pointer);
            if report.kind.has_error_code() {
                emergency_write_str(" error=");
                emergency_write_hex_u64(report.frame.error_code.unwrap_or(0));
            }
            emergency_write_str("\n[PANIC] system halted\n");
        }
        arch::halt_loop()
    }

    #[panic_handler]
    fn panic(info: &PanicInfo) -> ! {
        if enter() {
            emergency_write_str("[PANIC] kernel panic\n");
            if let Some(loc) = info.location() {
                emergency_write_str("[PANIC] location line=");
                emergency_write_hex_u64(loc.line() as u64);
                emergency_write_str(" col=");
                emergency_write_hex_u64(loc.column() as u64);
                emergency_write_str("\n");
            } else {
                emergency_write_str("[PANIC] location unknown\n");
            }
        }
        arch::halt_loop()
    }
}

#[cfg(target_os = "none")]
pub use halt::fault_panic;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latch_trips_once() {
        let latch = PanicLatch::new();
        assert!(!latch.is_tripped());
        assert_eq!(latch.enter(), PanicEntry::First);
        assert!(latch.is_tripped());
        assert_eq!(latch.enter(), PanicEntry::Reentered);
        assert_eq!(latch.enter(), PanicEntry::Reentered);
    }
}
