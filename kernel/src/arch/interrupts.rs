// kernel/src/arch/interrupts.rs
//
// Role:
// - hardware VectorSink for the stubs in interrupts::idt
// - build the IDT once and load it
//
// Policy:
// - hardware entries go through with_kernel_state(); if the state is not
//   reachable (not registered yet, or already borrowed) they still EOI
// - fault entries never wait on a lock: they try to record the fault, then
//   take the panic path unconditionally

use spin::Once;
use x86_64::instructions::interrupts;
use x86_64::structures::idt::InterruptDescriptorTable;

use super::port::HardwarePorts;
use crate::interrupts::{idt, ChainedPics, FaultFrame, FaultReport, PicConfig, VectorSink};
use crate::kernel::state_ref::with_kernel_state;
use crate::logging::{self, Subsystem};
use crate::panic;

static IDT: Once<InterruptDescriptorTable> = Once::new();

pub fn enable() {
    interrupts::enable();
}

pub fn disable() {
    interrupts::disable();
}

/// Builds the table once and loads it. Later calls reload the same table.
pub fn install() {
    interrupts::without_interrupts(|| {
        let table = IDT.call_once(idt::build::<Hardware>);
        table.load();
        logging::info(Subsystem::Interrupts, "arch::interrupts::install: IDT loaded");
    });
}

struct Hardware;

impl VectorSink for Hardware {
    fn hardware(vector: u8) {
        let handled = with_kernel_state(|ks| {
            ks.handle_interrupt(&mut HardwarePorts, vector, FaultFrame::default());
        });
        if handled.is_none() {
            let pics = ChainedPics::new(PicConfig::DEFAULT);
            if pics.handles(vector) {
                pics.acknowledge(&mut HardwarePorts, vector);
            } else {
                pics.end_of_interrupt_all(&mut HardwarePorts);
            }
        }
    }

    fn fault(report: FaultReport) -> ! {
        // best effort; a fault inside a borrowed section gets None here
        let _ = with_kernel_state(|ks| {
            ks.handle_interrupt(&mut HardwarePorts, report.kind.vector(), report.frame);
        });
        panic::fault_panic(&report)
    }
}
