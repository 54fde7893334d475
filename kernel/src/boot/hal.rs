// kernel/src/boot/hal.rs
//
// Hardware the boot protocol touches, as a trait. Real mode has no Rust
// implementation here (the bootloader crate performs those stages on
// hardware); the mock below records every call so the protocol's ordering
// can be checked.

use x86_64::registers::control::{Cr0Flags, Cr4Flags};
use x86_64::registers::model_specific::EferFlags;

use super::gdt::FlatGdt;
use super::sector::ChsRead;

/// Firmware disk-service failure (INT 13h carry set, AH = status).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MediaFault {
    pub status: u8,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HaltReason {
    MediaError,
    UnsupportedCpu,
}

impl HaltReason {
    pub const fn message(self) -> &'static str {
        match self {
            HaltReason::MediaError => "Disk read error",
            HaltReason::UnsupportedCpu => "Long mode not supported",
        }
    }
}

pub trait BootHal {
    fn read_sectors(&mut self, drive: u8, read: &ChsRead) -> Result<(), MediaFault>;
    fn cpu_supports_long_mode(&mut self) -> bool;

    fn zero_table(&mut self, table: u64);
    fn write_table_entry(&mut self, table: u64, index: usize, entry: u64);

    fn read_cr0(&mut self) -> Cr0Flags;
    fn write_cr0(&mut self, value: Cr0Flags);
    fn read_cr4(&mut self) -> Cr4Flags;
    fn write_cr4(&mut self, value: Cr4Flags);
    fn write_cr3(&mut self, pml4: u64);
    fn read_efer(&mut self) -> EferFlags;
    fn write_efer(&mut self, value: EferFlags);
    fn load_gdt(&mut self, gdt: &FlatGdt);

    /// In real mode `selector` is a segment; segment 0 makes `target` the
    /// linear address.
    fn far_jump(&mut self, selector: u16, target: u64);
    fn halt(&mut self, reason: HaltReason);
}
