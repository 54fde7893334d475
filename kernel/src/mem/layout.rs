// kernel/src/mem/layout.rs
//
// Fixed physical memory layout shared by every boot stage and the kernel.
//
// These are link-time facts, not tunables: stage 1, stage 2 and the kernel
// each hard-code them, so a change here must be mirrored everywhere that
// consumes the image.
//
//   0x0000_0000 ..= 0x0000_03ff  real-mode IVT
//   0x0000_0400 ..= 0x0000_04ff  BIOS data area
//   0x0000_1000 ..= 0x0000_4fff  boot page tables (PML4, PDPT, PD, PT)
//   0x0000_7c00 ..= 0x0000_7dff  stage 1 (boot sector)
//   0x0000_7e00 ..= 0x0000_7fff  stage 2
//   0x0000_8000 ..= 0x0001_7fff  kernel image (max 64 KiB)
//   0x0008_8000 ..= 0x0008_ffff  kernel stack (grows down from 0x90000)
//   0x000b_8000                  VGA text buffer
//   0x0020_0000 ..= 0x002f_ffff  kernel heap arena

pub const SECTOR_SIZE: usize = 512;
pub const BOOT_SECTOR_SIZE: usize = 512;
pub const BOOT_SIGNATURE: u16 = 0xAA55;

pub const BOOTLOADER_LOAD_ADDR: u64 = 0x7C00;
pub const BOOTLOADER_STACK_ADDR: u64 = 0x7C00;

pub const STAGE2_LOAD_ADDR: u64 = 0x7E00;
pub const STAGE2_START_LBA: u32 = 1;
pub const STAGE2_SECTORS: u16 = 1;

pub const KERNEL_LOAD_ADDR: u64 = 0x8000;
pub const KERNEL_MAX_SIZE: u64 = 0x10000;
pub const KERNEL_START_LBA: u32 = STAGE2_START_LBA + STAGE2_SECTORS as u32;
pub const KERNEL_SECTORS: u16 = (KERNEL_MAX_SIZE / SECTOR_SIZE as u64) as u16;

pub const KERNEL_STACK_ADDR: u64 = 0x90000;
pub const STACK_SIZE: u64 = 0x8000;
pub const STACK_GUARD_SIZE: u64 = 0x1000;
pub const KERNEL_STACK_BASE: u64 = KERNEL_STACK_ADDR - STACK_SIZE;
pub const KERNEL_STACK_TOP: u64 = KERNEL_STACK_ADDR;

/// Scratch region the paging bootstrap builds its four tables in, one 4 KiB
/// page per level, PML4 first.
pub const BOOT_PML4_ADDR: u64 = 0x1000;
pub const BOOT_PDPT_ADDR: u64 = 0x2000;
pub const BOOT_PD_ADDR: u64 = 0x3000;
pub const BOOT_PT_ADDR: u64 = 0x4000;
pub const BOOT_PAGE_TABLE_END: u64 = 0x5000;

/// Identity-mapped by the boot page tables: 512 frames of 4 KiB.
pub const IDENTITY_MAP_SIZE: u64 = 2 * 1024 * 1024;

pub const VGA_TEXT_BUFFER: u64 = 0xB8000;
pub const VGA_TEXT_WIDTH: usize = 80;
pub const VGA_TEXT_HEIGHT: usize = 25;

pub const SERIAL_PORT_BASE: u16 = 0x3F8;
pub const DEBUGCON_PORT: u16 = 0xE9;

/// Segment for real-mode jumps between loader stages.
pub const REAL_MODE_SEGMENT: u16 = 0x0000;

pub const NULL_SEG: u16 = 0x00;
pub const CODE_SEG: u16 = 0x08;
pub const DATA_SEG: u16 = 0x10;

pub const HEAP_START: u64 = 0x200000;
pub const HEAP_INITIAL_SIZE: usize = 0x100000;

pub const fn is_valid_kernel_addr(addr: u64) -> bool {
    addr >= KERNEL_LOAD_ADDR && addr < KERNEL_LOAD_ADDR + KERNEL_MAX_SIZE
}

pub const fn is_valid_stack_addr(addr: u64) -> bool {
    addr >= KERNEL_STACK_BASE && addr < KERNEL_STACK_TOP
}

pub const fn overlaps_kernel(addr: u64, size: u64) -> bool {
    addr < KERNEL_LOAD_ADDR + KERNEL_MAX_SIZE && addr + size > KERNEL_LOAD_ADDR
}

pub const fn overlaps_stack(addr: u64, size: u64) -> bool {
    addr < KERNEL_STACK_TOP && addr + size > KERNEL_STACK_BASE
}

// Cross-stage consistency, checked at compile time.
const _: () = {
    assert!(STAGE2_LOAD_ADDR == BOOTLOADER_LOAD_ADDR + BOOT_SECTOR_SIZE as u64);
    assert!(STAGE2_LOAD_ADDR + STAGE2_SECTORS as u64 * SECTOR_SIZE as u64 <= KERNEL_LOAD_ADDR);
    assert!(BOOT_PAGE_TABLE_END <= BOOTLOADER_LOAD_ADDR);
    assert!(!overlaps_stack(KERNEL_LOAD_ADDR, KERNEL_MAX_SIZE));
    assert!(!overlaps_kernel(HEAP_START, HEAP_INITIAL_SIZE as u64));
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernel_image_fits_its_sector_budget() {
        assert_eq!(KERNEL_START_LBA, 2);
        assert_eq!(KERNEL_SECTORS, 128);
        assert!(is_valid_kernel_addr(KERNEL_LOAD_ADDR));
        assert!(!is_valid_kernel_addr(KERNEL_LOAD_ADDR + KERNEL_MAX_SIZE));
    }

    #[test]
    fn stack_window() {
        assert_eq!(KERNEL_STACK_BASE, 0x88000);
        assert!(is_valid_stack_addr(KERNEL_STACK_TOP - 8));
        assert!(!is_valid_stack_addr(KERNEL_STACK_TOP));
        assert!(overlaps_stack(KERNEL_STACK_BASE - 0x10, 0x20));
    }
}
