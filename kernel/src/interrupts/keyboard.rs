// kernel/src/interrupts/keyboard.rs
//
// PS/2 scancode set 1 -> char, plus the fixed input queue the shell drains.
//
// - releases (bit 7) produce nothing, except to drop a shift
// - 0xE0 prefixes are swallowed; extended keys have no char mapping
// - the queue drops new input when full and counts it

pub const DATA_PORT: u16 = 0x60;
pub const INPUT_QUEUE_CAP: usize = 64;

const RELEASE_BIT: u8 = 0x80;
const EXTENDED_PREFIX: u8 = 0xE0;
const LEFT_SHIFT: u8 = 0x2A;
const RIGHT_SHIFT: u8 = 0x36;

#[rustfmt::skip]
const UNSHIFTED: [u8; 58] = [
    0, 0, b'1', b'2', b'3', b'4', b'5', b'6', b'7', b'8', b'9', b'0', b'-', b'=', 0x08,
    b'\t', b'q', b'w', b'e', b'r', b't', b'y', b'u', b'i', b'o', b'p', b'[', b']', b'\n',
    0, b'a', b's', b'd', b'f', b'g', b'h', b'j', b'k', b'l', b';', b'\'', b'`',
    0, b'\\', b'z', b'x', b'c', b'v', b'b', b'n', b'm', b',', b'.', b'/', 0,
    b'*', 0, b' ',
];

#[rustfmt::skip]
const SHIFTED: [u8; 58] = [
    0, 0, b'!', b'@', b'#', b'$', b'%', b'^', b'&', b'*', b'(', b')', b'_', b'+', 0x08,
    b'\t', b'Q', b'W', b'E', b'R', b'T', b'Y', b'U', b'I', b'O', b'P', b'{', b'}', b'\n',
    0, b'A', b'S', b'D', b'F', b'G', b'H', b'J', b'K', b'L', b':', b'"', b'~',
    0, b'|', b'Z', b'X', b'C', b'V', b'B', b'N', b'M', b'<', b'>', b'?', 0,
    b'*', 0, b' ',
];

pub struct ScancodeDecoder {
    shift: bool,
    extended: bool,
}

impl ScancodeDecoder {
    pub const fn new() -> Self {
        ScancodeDecoder {
            shift: false,
            extended: false,
        }
    }

    pub fn shift_held(&self) -> bool {
        self.shift
    }

    pub fn decode(&mut self, scancode: u8) -> Option<char> {
        if scancode == EXTENDED_PREFIX {
            self.extended = true;
            return None;
        }
        let extended = core::mem::replace(&mut self.extended, false);

        let released = scancode & RELEASE_BIT != 0;
        let code = scancode & !RELEASE_BIT;

        if !extended && (code == LEFT_SHIFT || code == RIGHT_SHIFT) {
            self.shift = !released;
            return None;
        }
        if released || extended {
            return None;
        }

        let table = if self.shift { &SHIFTED } else { &UNSHIFTED };
        match table.get(code as usize) {
            Some(&b) if b != 0 => Some(b as char),
            _ => None,
        }
    }
}

impl Default for ScancodeDecoder {
    fn default() -> Self {
        Self::new()
    }
}

pub struct InputQueue {
    buf: [char; INPUT_QUEUE_CAP],
    head: usize,
    len: usize,
    dropped: u64,
}

impl InputQueue {
    pub const fn new() -> Self {
        InputQueue {
            buf: ['\0'; INPUT_QUEUE_CAP],
            head: 0,
            len: 0,
            dropped: 0,
        }
    }

    /// Returns false (and counts a drop) when full.
    pub fn push(&mut self, c: char) -> bool {
        if self.len == INPUT_QUEUE_CAP {
            self.dropped += 1;
            return false;
        }
        self.buf[(self.head + self.len) % INPUT_QUEUE_CAP] = c;
        self.len += 1;
        true
    }

    pub fn pop(&mut self) -> Option<char> {
        if self.len == 0 {
            return None;
        }
        let c = self.buf[self.head];
        self.head = (self.head + 1) % INPUT_QUEUE_CAP;
        self.len -= 1;
        Some(c)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl Default for InputQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn type_codes(d: &mut ScancodeDecoder, codes: &[u8]) -> String {
        codes.iter().filter_map(|&c| d.decode(c)).collect()
    }

    #[test]
    fn presses_map_through_the_table_releases_do_not() {
        let mut d = ScancodeDecoder::new();
        // h, i, release i, enter
        assert_eq!(type_codes(&mut d, &[0x23, 0x17, 0x97, 0x1C]), "hi\n");
        assert_eq!(d.decode(0x01), None); // escape has no mapping
        assert_eq!(d.decode(0x3A), None); // past the table
    }

    #[test]
    fn shift_is_tracked_across_press_and_release() {
        let mut d = ScancodeDecoder::new();
        let s = type_codes(&mut d, &[LEFT_SHIFT, 0x23, 0x02, LEFT_SHIFT | RELEASE_BIT, 0x23]);
        assert_eq!(s, "H!h");
        assert!(!d.shift_held());
    }

    #[test]
    fn extended_keys_are_swallowed() {
        let mut d = ScancodeDecoder::new();
        // right arrow make/break, then 'a'
        assert_eq!(type_codes(&mut d, &[0xE0, 0x4D, 0xE0, 0xCD, 0x1E]), "a");
        // E0 2A is a fake shift, not a real one
        d.decode(0xE0);
        d.decode(LEFT_SHIFT);
        assert!(!d.shift_held());
    }

    #[test]
    fn queue_is_fifo_and_drops_when_full() {
        let mut q = InputQueue::new();
        for i in 0..INPUT_QUEUE_CAP {
            assert!(q.push(char::from(b'a' + (i % 26) as u8)));
        }
        assert!(!q.push('x'));
        assert_eq!(q.dropped(), 1);
        assert_eq!(q.pop(), Some('a'));
        assert!(q.push('z'));
        assert_eq!(q.len(), INPUT_QUEUE_CAP);

        let drained: Vec<char> = core::iter::from_fn(|| q.pop()).collect();
        assert_eq!(drained.last(), Some(&'z'));
        assert!(q.is_empty());
    }
}
