// kernel/src/boot/handoff.rs
//
// Kernel-entry audit: the control registers the kernel finds must be the
// ones the mode switch leaves behind. Register reads happen in arch; this
// only judges the values.

use core::fmt;

use x86_64::registers::control::{Cr0Flags, Cr4Flags};
use x86_64::registers::model_specific::EferFlags;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HandoffRegisters {
    pub cr0: Cr0Flags,
    pub cr4: Cr4Flags,
    pub efer: EferFlags,
    /// CPUID 0x8000_0001 EDX bit 29.
    pub cpuid_long_mode: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandoffError {
    NoLongModeCpu,
    PagingOff,
    ProtectedModeOff,
    PaeOff,
    LongModeNotEnabled,
    LongModeNotActive,
}

impl HandoffError {
    pub const fn as_str(self) -> &'static str {
        match self {
            HandoffError::NoLongModeCpu => "CPUID reports no long mode",
            HandoffError::PagingOff => "CR0.PG clear",
            HandoffError::ProtectedModeOff => "CR0.PE clear",
            HandoffError::PaeOff => "CR4.PAE clear",
            HandoffError::LongModeNotEnabled => "EFER.LME clear",
            HandoffError::LongModeNotActive => "EFER.LMA clear",
        }
    }
}

impl fmt::Display for HandoffError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl HandoffRegisters {
    /// First mismatch, checked in the order the protocol sets them.
    pub fn audit(&self) -> Result<(), HandoffError> {
        if !self.cpuid_long_mode {
            return Err(HandoffError::NoLongModeCpu);
        }
        if !self.cr4.contains(Cr4Flags::PHYSICAL_ADDRESS_EXTENSION) {
            return Err(HandoffError::PaeOff);
        }
        if !self.efer.contains(EferFlags::LONG_MODE_ENABLE) {
            return Err(HandoffError::LongModeNotEnabled);
        }
        if !self.cr0.contains(Cr0Flags::PROTECTED_MODE_ENABLE) {
            return Err(HandoffError::ProtectedModeOff);
        }
        if !self.cr0.contains(Cr0Flags::PAGING) {
            return Err(HandoffError::PagingOff);
        }
        if !self.efer.contains(EferFlags::LONG_MODE_ACTIVE) {
            return Err(HandoffError::LongModeNotActive);
        }
        Ok(())
    }

    /// CR4.PGE is set by the protocol but other loaders may leave it off.
    pub fn global_pages(&self) -> bool {
        self.cr4.contains(Cr4Flags::PAGE_GLOBAL)
    }
}
