// kernel/src/lib.rs
//
// hellos kernel core.
//
// Layout:
// - boot:       boot transition protocol (real mode -> long mode) over a mockable HAL
// - mem:        fixed memory layout + block heap allocator
// - interrupts: IDT population, 8259 pair, dispatcher, keyboard decoding
// - sched:      priority ready queue + time-slice accounting
// - kernel:     KernelState (owns all of the above) and the init chain
// - logging:    leveled/subsystem log with ring buffer, serial and VGA sinks
// - arch:       x86_64 glue; only compiled for the bare-metal target
//
// Everything outside arch/ is plain logic and runs under the host test harness.

#![cfg_attr(not(test), no_std)]
#![feature(abi_x86_interrupt)]

pub mod boot;
pub mod config;
pub mod error;
pub mod interrupts;
pub mod kernel;
pub mod logging;
pub mod mem;
pub mod panic;
pub mod sched;

#[cfg(target_os = "none")]
pub mod arch;

pub use config::KernelConfig;
pub use error::{KernelError, Severity};
