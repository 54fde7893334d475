// kernel/src/logging/serial.rs
//
// Minimal COM1 output.
// - init(): 115200 baud, 8N1, FIFO on
// - write_str() / write_line(): busy-wait on the transmit-empty bit
//
// Called with the logger lock held, so no lock of its own.

use core::fmt;
use core::sync::atomic::{AtomicBool, Ordering};

use x86_64::instructions::port::Port;

use crate::mem::layout::SERIAL_PORT_BASE;

static SERIAL_INITIALIZED: AtomicBool = AtomicBool::new(false);

pub fn init() {
    if SERIAL_INITIALIZED.swap(true, Ordering::AcqRel) {
        return;
    }

    unsafe {
        let mut int_enable = Port::<u8>::new(SERIAL_PORT_BASE + 1);
        let mut line_ctrl = Port::<u8>::new(SERIAL_PORT_BASE + 3);
        let mut div_low = Port::<u8>::new(SERIAL_PORT_BASE);
        let mut div_high = Port::<u8>::new(SERIAL_PORT_BASE + 1);
        let mut fifo_ctrl = Port::<u8>::new(SERIAL_PORT_BASE + 2);
        let mut modem_ctrl = Port::<u8>::new(SERIAL_PORT_BASE + 4);

        int_enable.write(0x00);

        // DLAB on, divisor 1 => 115200
        line_ctrl.write(0x80);
        div_low.write(0x01);
        div_high.write(0x00);

        line_ctrl.write(0x03);
        fifo_ctrl.write(0xC7);
        modem_ctrl.write(0x0B);
    }
}

fn write_byte(byte: u8) {
    unsafe {
        let mut line_status = Port::<u8>::new(SERIAL_PORT_BASE + 5);
        let mut data = Port::<u8>::new(SERIAL_PORT_BASE);

        while (line_status.read() & 0x20) == 0 {}

        data.write(byte);
    }
}

pub fn write_str(s: &str) {
    for b in s.bytes() {
        write_byte(b);
    }
}

pub fn write_line(s: &str) {
    write_str(s);
    write_str("\r\n");
}

pub struct SerialWriter;

impl fmt::Write for SerialWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        write_str(s);
        Ok(())
    }
}
