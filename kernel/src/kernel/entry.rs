// kernel/src/kernel/entry.rs
//
// Kernel entry glue: the chain from the bootloader hand-off to the idle loop.
//
//   logging -> hand-off audit -> memory map report -> heap arena
//   -> KernelState (PICs, kernel process) -> vector table -> sti -> idle
//
// Doesn't:
// - decide anything about scheduling or memory (KernelState does)
// - touch KernelState except through state_ref once interrupts are live

use bootloader::bootinfo::MemoryRegionType;
use bootloader::BootInfo;

use crate::arch::{self, port::HardwarePorts};
use crate::config::KernelConfig;
use crate::logging::{self, Level, Subsystem};
use crate::mem;

use super::state_ref::{register_kernel_state, with_kernel_state};
use super::KernelState;

pub fn start(boot_info: &'static BootInfo) -> ! {
    let config = KernelConfig::DEFAULT;
    logging::init(config.log);
    logging::info(Subsystem::Kernel, "kernel::start()");

    if let Err(e) = arch::cpu::read_handoff_registers().audit() {
        logging::logf(Level::Fatal, Subsystem::Boot, format_args!("hand-off audit: {}", e));
        arch::halt_loop();
    }
    logging::info(Subsystem::Boot, "long mode hand-off verified");

    report_memory_map(boot_info);

    let Some(arena) = mem::take_kernel_arena() else {
        logging::fatal(Subsystem::Memory, "kernel arena already taken");
        arch::halt_loop();
    };

    let mut kstate = match KernelState::new(config, arena) {
        Ok(ks) => ks,
        Err(e) => {
            logging::logf(Level::Fatal, Subsystem::Kernel, format_args!("KernelState::new: {}", e));
            arch::halt_loop();
        }
    };
    if let Err(e) = kstate.bootstrap(&mut HardwarePorts) {
        logging::logf(Level::Fatal, Subsystem::Kernel, format_args!("bootstrap: {}", e));
        arch::halt_loop();
    }

    // Safety: kstate lives in this frame, which never returns.
    unsafe { register_kernel_state(&mut kstate) };
    arch::interrupts::install();
    arch::interrupts::enable();
    logging::info(Subsystem::Interrupts, "interrupts enabled");

    idle()
}

fn idle() -> ! {
    loop {
        arch::cpu::halt_once();

        let halt = with_kernel_state(|ks| {
            while let Some(c) = ks.read_input() {
                let mut buf = [0u8; 4];
                logging::debug(Subsystem::Shell, c.encode_utf8(&mut buf));
            }
            ks.should_halt()
        });

        if halt == Some(true) {
            break;
        }
    }

    arch::interrupts::disable();
    let _ = with_kernel_state(|ks| ks.dump_events());
    arch::halt_loop();
}

fn report_memory_map(boot_info: &'static BootInfo) {
    let mut usable = 0u64;
    for region in boot_info.memory_map.iter() {
        if region.region_type == MemoryRegionType::Usable {
            usable += region.range.end_addr() - region.range.start_addr();
        }
    }
    logging::info_u64(Subsystem::Memory, "usable physical bytes", usable);
}
