// kernel/src/boot/paging.rs
//
// Boot page-table hierarchy: one table per level in the scratch region
// at 0x1000..0x5000, identity mapping the first 2 MiB with 4 KiB pages.
//
//   PML4[0] -> PDPT, PDPT[0] -> PD, PD[0] -> PT   (present + writable)
//   PT[i]   -> frame i * 4 KiB, i in 0..512       (present + writable)
//
// Built once, never changed after the mode switch.

use x86_64::structures::paging::PageTableFlags;

use super::hal::BootHal;
use crate::mem::layout::{
    BOOT_PAGE_TABLE_END, BOOT_PD_ADDR, BOOT_PDPT_ADDR, BOOT_PML4_ADDR, BOOT_PT_ADDR,
    IDENTITY_MAP_SIZE,
};

pub const ENTRIES_PER_TABLE: usize = 512;
pub const PAGE_SIZE: u64 = 4096;

pub const LEVELS: [u64; 4] = [BOOT_PML4_ADDR, BOOT_PDPT_ADDR, BOOT_PD_ADDR, BOOT_PT_ADDR];

const _: () = assert!(BOOT_PT_ADDR + PAGE_SIZE == BOOT_PAGE_TABLE_END);
const _: () = assert!(ENTRIES_PER_TABLE as u64 * PAGE_SIZE == IDENTITY_MAP_SIZE);

pub fn boot_entry_flags() -> PageTableFlags {
    PageTableFlags::PRESENT | PageTableFlags::WRITABLE
}

pub fn entry(addr: u64) -> u64 {
    addr | boot_entry_flags().bits()
}

/// Writes the hierarchy through the HAL and returns the PML4 base for CR3.
pub fn build_identity_map(hal: &mut impl BootHal) -> u64 {
    for table in LEVELS {
        hal.zero_table(table);
    }

    for pair in LEVELS.windows(2) {
        hal.write_table_entry(pair[0], 0, entry(pair[1]));
    }

    for i in 0..ENTRIES_PER_TABLE {
        hal.write_table_entry(BOOT_PT_ADDR, i, entry(i as u64 * PAGE_SIZE));
    }

    BOOT_PML4_ADDR
}
