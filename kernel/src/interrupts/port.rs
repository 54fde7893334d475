// kernel/src/interrupts/port.rs
//
// Port I/O seam. The PIC and keyboard code talk to hardware only through
// PortBus, so the dispatcher's acknowledge discipline can be checked
// against a recording bus off hardware. arch::port has the real one.

/// Unused POST diagnostic port; a write there takes roughly 1µs.
pub const POST_PORT: u16 = 0x80;

pub trait PortBus {
    fn read_u8(&mut self, port: u16) -> u8;
    fn write_u8(&mut self, port: u16, value: u8);

    /// Gives an old 8259 time to latch the previous command.
    fn io_wait(&mut self) {
        self.write_u8(POST_PORT, 0);
    }
}
