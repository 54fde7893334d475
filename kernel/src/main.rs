// kernel/src/main.rs
//
// Binary entry. The bootloader crate builds the disk image, enters long mode
// with the physical memory map, and jumps here.

#![cfg_attr(target_os = "none", no_std)]
#![cfg_attr(target_os = "none", no_main)]

#[cfg(target_os = "none")]
mod entry {
    use bootloader::{entry_point, BootInfo};

    use hellos_kernel::kernel;

    entry_point!(kernel_main);

    fn kernel_main(boot_info: &'static BootInfo) -> ! {
        kernel::entry::start(boot_info)
    }
}

#[cfg(not(target_os = "none"))]
fn main() {
    eprintln!("hellos-kernel only runs on the x86_64 bare-metal target (target_os = \"none\")");
}
