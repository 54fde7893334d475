// kernel/src/arch/mod.rs
//
// x86_64 glue; unsafe stays in here as far as possible.
// - cpu:        hlt loop, hand-off register reads
// - port:       PortBus over real I/O ports
// - interrupts: hardware vector sink, IDT install, IF control

pub mod cpu;
pub mod interrupts;
pub mod port;

pub fn halt_loop() -> ! {
    cpu::halt_loop()
}
