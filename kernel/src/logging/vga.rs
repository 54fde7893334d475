// kernel/src/logging/vga.rs
//
// VGA text mode sink at the fixed video base.
// - one record per line; fills top-down, then scrolls
// - level tag in the level's colour, subsystem name dimmed, message in the
//   level's colour
// - anything outside printable ASCII shows as a CP437 block

use spin::Mutex;
use volatile::Volatile;

use super::{Level, Subsystem};
use crate::mem::layout::{VGA_TEXT_BUFFER, VGA_TEXT_HEIGHT, VGA_TEXT_WIDTH};

const SUBSTITUTE: u8 = 0xFE;

/// Attribute byte: foreground | background << 4.
#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
struct Attribute(u8);

impl Attribute {
    const DIM: Attribute = Attribute(0x08);

    const fn for_level(level: Level) -> Attribute {
        Attribute(match level {
            Level::Trace => 0x08,
            Level::Debug => 0x07,
            Level::Info => 0x0F,
            Level::Warn => 0x0E,
            Level::Error => 0x0C,
            Level::Fatal => 0x4F,
        })
    }
}

#[repr(C)]
#[derive(Clone, Copy)]
struct Cell {
    glyph: u8,
    attribute: Attribute,
}

#[repr(transparent)]
struct Screen {
    cells: [[Volatile<Cell>; VGA_TEXT_WIDTH]; VGA_TEXT_HEIGHT],
}

struct RecordWriter {
    row: usize,
    col: usize,
    screen: &'static mut Screen,
}

impl RecordWriter {
    fn record(&mut self, level: Level, subsystem: Subsystem, msg: &str) {
        let colour = Attribute::for_level(level);
        self.text(level.prefix(), colour);
        self.text(subsystem.name(), Attribute::DIM);
        self.text(": ", Attribute::DIM);
        self.text(msg, colour);
        self.end_line();
    }

    fn text(&mut self, s: &str, attribute: Attribute) {
        for b in s.bytes() {
            match b {
                b'\n' => self.end_line(),
                0x20..=0x7E => self.put(b, attribute),
                _ => self.put(SUBSTITUTE, attribute),
            }
        }
    }

    fn put(&mut self, glyph: u8, attribute: Attribute) {
        if self.col == VGA_TEXT_WIDTH {
            self.end_line();
        }
        self.screen.cells[self.row][self.col].write(Cell { glyph, attribute });
        self.col += 1;
    }

    fn end_line(&mut self) {
        self.col = 0;
        if self.row + 1 < VGA_TEXT_HEIGHT {
            self.row += 1;
            return;
        }
        for row in 1..VGA_TEXT_HEIGHT {
            for col in 0..VGA_TEXT_WIDTH {
                let cell = self.screen.cells[row][col].read();
                self.screen.cells[row - 1][col].write(cell);
            }
        }
        self.blank(VGA_TEXT_HEIGHT - 1);
    }

    fn blank(&mut self, row: usize) {
        let empty = Cell {
            glyph: b' ',
            attribute: Attribute::for_level(Level::Info),
        };
        for cell in self.screen.cells[row].iter_mut() {
            cell.write(empty);
        }
    }
}

static WRITER: Mutex<Option<RecordWriter>> = Mutex::new(None);

/// Clears the screen and starts writing at the top row.
#[cfg_attr(test, allow(dead_code))]
pub fn init() {
    // Safety: the text buffer is identity-mapped and this is its only writer.
    let screen = unsafe { &mut *(VGA_TEXT_BUFFER as *mut Screen) };
    let mut writer = RecordWriter { row: 0, col: 0, screen };
    for row in 0..VGA_TEXT_HEIGHT {
        writer.blank(row);
    }
    *WRITER.lock() = Some(writer);
}

#[cfg_attr(test, allow(dead_code))]
pub fn write_record(level: Level, subsystem: Subsystem, msg: &str) {
    if let Some(w) = WRITER.lock().as_mut() {
        w.record(level, subsystem, msg);
    }
}
