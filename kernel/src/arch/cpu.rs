// kernel/src/arch/cpu.rs
// CPU instruction wrappers. unsafe kept to the minimum.

use core::arch::x86_64::__cpuid;

use x86_64::registers::control::{Cr0, Cr4};
use x86_64::registers::model_specific::Efer;

use crate::boot::HandoffRegisters;

const CPUID_EXT_MAX: u32 = 0x8000_0000;
const CPUID_EXT_FEATURES: u32 = 0x8000_0001;
const EDX_LONG_MODE: u32 = 1 << 29;

pub fn halt_loop() -> ! {
    loop {
        unsafe {
            core::arch::asm!("hlt", options(nomem, nostack, preserves_flags));
        }
    }
}

/// One hlt; returns after the next interrupt.
pub fn halt_once() {
    unsafe {
        core::arch::asm!("hlt", options(nomem, nostack, preserves_flags));
    }
}

pub fn cpu_supports_long_mode() -> bool {
    // Safety: cpuid is available on every x86_64 CPU.
    let max = unsafe { __cpuid(CPUID_EXT_MAX) }.eax;
    if max < CPUID_EXT_FEATURES {
        return false;
    }
    unsafe { __cpuid(CPUID_EXT_FEATURES) }.edx & EDX_LONG_MODE != 0
}

pub fn read_handoff_registers() -> HandoffRegisters {
    HandoffRegisters {
        cr0: Cr0::read(),
        cr4: Cr4::read(),
        efer: Efer::read(),
        cpuid_long_mode: cpu_supports_long_mode(),
    }
}
