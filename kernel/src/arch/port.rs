// kernel/src/arch/port.rs
//
// PortBus over the real I/O space.

use x86_64::instructions::port::Port;

use crate::interrupts::PortBus;

pub struct HardwarePorts;

impl PortBus for HardwarePorts {
    fn read_u8(&mut self, port: u16) -> u8 {
        unsafe { Port::<u8>::new(port).read() }
    }

    fn write_u8(&mut self, port: u16, value: u8) {
        unsafe { Port::<u8>::new(port).write(value) }
    }
}
