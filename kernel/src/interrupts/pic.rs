// kernel/src/interrupts/pic.rs
//
// Legacy 8259 pair (master + cascaded slave).
//
// - remap(): ICW1..ICW4 so IRQ 0-7 land at master_offset.. and IRQ 8-15 at
//   slave_offset.., clear of the CPU's exception vectors 0-31
// - end_of_interrupt(): slave first (if the vector came from it), then
//   master. Skipping this leaves the line's priority level in service and
//   every equal or lower IRQ stalls.
// - acknowledge(): EOI for a delivered line, except a spurious IRQ 7/15
//   (request withdrawn before INTA, in-service bit clear). Spurious 15
//   still owes the master its cascade EOI; spurious 7 owes nothing.

use super::port::PortBus;

pub const MASTER_COMMAND: u16 = 0x20;
pub const MASTER_DATA: u16 = 0x21;
pub const SLAVE_COMMAND: u16 = 0xA0;
pub const SLAVE_DATA: u16 = 0xA1;

pub const MASTER_OFFSET: u8 = 0x20;
pub const SLAVE_OFFSET: u8 = 0x28;

/// IRQ0 timer, IRQ1 keyboard, IRQ2 cascade unmasked; everything else off.
pub const DEFAULT_MASTER_MASK: u8 = 0xF8;
pub const DEFAULT_SLAVE_MASK: u8 = 0xFF;

const ICW1_INIT: u8 = 0x10;
const ICW1_ICW4: u8 = 0x01;
const ICW4_8086: u8 = 0x01;
const CASCADE_IRQ: u8 = 2;
const OCW2_EOI: u8 = 0x20;
const OCW3_READ_ISR: u8 = 0x0B;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PicConfig {
    pub master_offset: u8,
    pub slave_offset: u8,
    pub master_mask: u8,
    pub slave_mask: u8,
}

impl PicConfig {
    pub const DEFAULT: PicConfig = PicConfig {
        master_offset: MASTER_OFFSET,
        slave_offset: SLAVE_OFFSET,
        master_mask: DEFAULT_MASTER_MASK,
        slave_mask: DEFAULT_SLAVE_MASK,
    };
}

pub struct ChainedPics {
    master_offset: u8,
    slave_offset: u8,
    masks: [u8; 2],
}

impl ChainedPics {
    pub const fn new(config: PicConfig) -> Self {
        ChainedPics {
            master_offset: config.master_offset,
            slave_offset: config.slave_offset,
            masks: [config.master_mask, config.slave_mask],
        }
    }

    pub fn remap(&mut self, bus: &mut impl PortBus) {
        // ICW1: edge triggered, cascade, ICW4 follows
        bus.write_u8(MASTER_COMMAND, ICW1_INIT | ICW1_ICW4);
        bus.io_wait();
        bus.write_u8(SLAVE_COMMAND, ICW1_INIT | ICW1_ICW4);
        bus.io_wait();

        // ICW2: vector offsets
        bus.write_u8(MASTER_DATA, self.master_offset);
        bus.io_wait();
        bus.write_u8(SLAVE_DATA, self.slave_offset);
        bus.io_wait();

        // ICW3: slave on master's IRQ2 (bitmask), slave's cascade identity
        bus.write_u8(MASTER_DATA, 1 << CASCADE_IRQ);
        bus.io_wait();
        bus.write_u8(SLAVE_DATA, CASCADE_IRQ);
        bus.io_wait();

        // ICW4: 8086 mode
        bus.write_u8(MASTER_DATA, ICW4_8086);
        bus.io_wait();
        bus.write_u8(SLAVE_DATA, ICW4_8086);
        bus.io_wait();

        self.write_masks(bus);
    }

    fn write_masks(&self, bus: &mut impl PortBus) {
        bus.write_u8(MASTER_DATA, self.masks[0]);
        bus.write_u8(SLAVE_DATA, self.masks[1]);
    }

    pub fn masks(&self) -> (u8, u8) {
        (self.masks[0], self.masks[1])
    }

    /// Masks or unmasks one IRQ line (0-15).
    pub fn set_masked(&mut self, bus: &mut impl PortBus, irq: u8, masked: bool) {
        if irq >= 16 {
            return;
        }
        let (chip, bit) = ((irq / 8) as usize, irq % 8);
        if masked {
            self.masks[chip] |= 1 << bit;
        } else {
            self.masks[chip] &= !(1 << bit);
        }
        let port = if chip == 0 { MASTER_DATA } else { SLAVE_DATA };
        bus.write_u8(port, self.masks[chip]);
    }

    pub fn is_masked(&self, irq: u8) -> bool {
        irq < 16 && self.masks[(irq / 8) as usize] & (1 << (irq % 8)) != 0
    }

    /// IRQ line for a vector, if either chip owns it.
    pub fn irq_of(&self, vector: u8) -> Option<u8> {
        if (self.master_offset..self.master_offset.saturating_add(8)).contains(&vector) {
            Some(vector - self.master_offset)
        } else if (self.slave_offset..self.slave_offset.saturating_add(8)).contains(&vector) {
            Some(vector - self.slave_offset + 8)
        } else {
            None
        }
    }

    pub fn handles(&self, vector: u8) -> bool {
        self.irq_of(vector).is_some()
    }

    pub fn vector_of(&self, irq: u8) -> u8 {
        if irq < 8 {
            self.master_offset + irq
        } else {
            self.slave_offset + (irq - 8)
        }
    }

    pub fn end_of_interrupt(&self, bus: &mut impl PortBus, vector: u8) {
        if let Some(irq) = self.irq_of(vector) {
            if irq >= 8 {
                bus.write_u8(SLAVE_COMMAND, OCW2_EOI);
            }
            bus.write_u8(MASTER_COMMAND, OCW2_EOI);
        }
    }

    /// Acknowledge on both chips; used when the source is unknown.
    pub fn end_of_interrupt_all(&self, bus: &mut impl PortBus) {
        bus.write_u8(SLAVE_COMMAND, OCW2_EOI);
        bus.write_u8(MASTER_COMMAND, OCW2_EOI);
    }

    /// In-service register of both chips, slave in the high byte.
    pub fn read_in_service(&self, bus: &mut impl PortBus) -> u16 {
        bus.write_u8(MASTER_COMMAND, OCW3_READ_ISR);
        bus.write_u8(SLAVE_COMMAND, OCW3_READ_ISR);
        let master = bus.read_u8(MASTER_COMMAND) as u16;
        let slave = bus.read_u8(SLAVE_COMMAND) as u16;
        (slave << 8) | master
    }

    /// IRQ 7 or 15 raised with nothing in service behind it.
    pub fn is_spurious(&self, bus: &mut impl PortBus, irq: u8) -> bool {
        if irq != 7 && irq != 15 {
            return false;
        }
        self.read_in_service(bus) & (1 << irq) == 0
    }

    /// EOI for a delivered PIC vector. Returns false if the line was
    /// spurious.
    pub fn acknowledge(&self, bus: &mut impl PortBus, vector: u8) -> bool {
        let Some(irq) = self.irq_of(vector) else {
            return false;
        };
        if self.is_spurious(bus, irq) {
            if irq >= 8 {
                bus.write_u8(MASTER_COMMAND, OCW2_EOI);
            }
            return false;
        }
        self.end_of_interrupt(bus, vector);
        true
    }
}
