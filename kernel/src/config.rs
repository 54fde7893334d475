// kernel/src/config.rs
//
// Boot-time configuration. Everything is const so the kernel can build its
// state without parsing anything; DEFAULT encodes the fixed layout.

use crate::interrupts::PicConfig;
use crate::logging::LogConfig;
use crate::mem::KERNEL_ARENA_SIZE;
use crate::sched::SchedConfig;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KernelConfig {
    /// Bytes of the static arena handed to the heap.
    pub heap_size: usize,
    pub sched: SchedConfig,
    pub log: LogConfig,
    pub pics: PicConfig,
    /// Run the heap/scheduler invariant checks every this many ticks
    /// (0 disables them). A heap walk is linear in the block count, so
    /// keep this well above 1 outside of tests.
    pub self_check_interval: u64,
}

impl KernelConfig {
    pub const DEFAULT: KernelConfig = KernelConfig {
        heap_size: KERNEL_ARENA_SIZE,
        sched: SchedConfig::DEFAULT,
        log: LogConfig::DEFAULT,
        pics: PicConfig::DEFAULT,
        self_check_interval: 100,
    };
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}
