// kernel/src/boot/gdt.rs
//
// Flat GDT loaded just before the mode switch: null, 64-bit code, data.
// Selector values are part of the layout contract (mem::layout::*_SEG).

use x86_64::structures::gdt::DescriptorFlags;

use crate::mem::layout::{CODE_SEG, DATA_SEG, NULL_SEG};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(C, align(8))]
pub struct FlatGdt {
    entries: [u64; 3],
}

const _: () = assert!(NULL_SEG == 0 && CODE_SEG == 0x08 && DATA_SEG == 0x10);

impl FlatGdt {
    pub const fn new() -> Self {
        FlatGdt {
            entries: [
                0,
                DescriptorFlags::KERNEL_CODE64.bits(),
                DescriptorFlags::KERNEL_DATA.bits(),
            ],
        }
    }

    pub fn entries(&self) -> &[u64; 3] {
        &self.entries
    }

    pub fn entry_for(&self, selector: u16) -> Option<u64> {
        self.entries.get((selector >> 3) as usize).copied()
    }

    /// GDTR limit.
    pub const fn limit(&self) -> u16 {
        (core::mem::size_of::<[u64; 3]>() - 1) as u16
    }
}

impl Default for FlatGdt {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_selector_is_long_mode_code() {
        let gdt = FlatGdt::new();
        let code = DescriptorFlags::from_bits_truncate(gdt.entry_for(CODE_SEG).unwrap());
        assert!(code.contains(DescriptorFlags::LONG_MODE | DescriptorFlags::EXECUTABLE));
        assert!(code.contains(DescriptorFlags::PRESENT));

        let data = DescriptorFlags::from_bits_truncate(gdt.entry_for(DATA_SEG).unwrap());
        assert!(!data.contains(DescriptorFlags::EXECUTABLE));
        assert_eq!(gdt.entry_for(NULL_SEG), Some(0));
        assert_eq!(gdt.limit(), 23);
    }
}
