// kernel/src/logging/buffer.rs
//
// In-memory log target.
// - LogBuffer: fixed ring of LogRecord, filled in order; once full, new
//   records are dropped and counted (the oldest diagnostics are kept)
// - FixedStr: heap-free message storage, truncates on a char boundary
//
// Host tests observe logging through this buffer.

use core::fmt;

use super::{Level, Subsystem};

pub const MESSAGE_CAP: usize = 96;
pub const LOG_BUFFER_CAP: usize = 128;

/// Fixed-capacity UTF-8 string. Writes past the capacity are cut off at the
/// last char boundary that still fits.
#[derive(Clone, Copy)]
pub struct FixedStr<const N: usize> {
    bytes: [u8; N],
    len: usize,
    truncated: bool,
}

impl<const N: usize> FixedStr<N> {
    pub const fn new() -> Self {
        FixedStr {
            bytes: [0; N],
            len: 0,
            truncated: false,
        }
    }

    pub fn from_str(s: &str) -> Self {
        let mut out = Self::new();
        out.push_str(s);
        out
    }

    pub fn push_str(&mut self, s: &str) {
        let room = N - self.len;
        let mut take = s.len().min(room);
        while take > 0 && !s.is_char_boundary(take) {
            take -= 1;
        }
        if take < s.len() {
            self.truncated = true;
        }
        self.bytes[self.len..self.len + take].copy_from_slice(&s.as_bytes()[..take]);
        self.len += take;
    }

    pub fn as_str(&self) -> &str {
        // push_str only ever copies whole chars
        core::str::from_utf8(&self.bytes[..self.len]).unwrap_or("")
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    pub fn clear(&mut self) {
        self.len = 0;
        self.truncated = false;
    }
}

impl<const N: usize> Default for FixedStr<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> fmt::Write for FixedStr<N> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.push_str(s);
        Ok(())
    }
}

impl<const N: usize> fmt::Debug for FixedStr<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct LogRecord {
    pub sequence: u64,
    pub level: Level,
    pub subsystem: Subsystem,
    pub message: FixedStr<MESSAGE_CAP>,
}

impl LogRecord {
    const EMPTY: LogRecord = LogRecord {
        sequence: 0,
        level: Level::Trace,
        subsystem: Subsystem::Kernel,
        message: FixedStr::new(),
    };
}

pub struct LogBuffer {
    entries: [LogRecord; LOG_BUFFER_CAP],
    head: usize,
    len: usize,
    dropped: u64,
}

impl LogBuffer {
    pub const fn new() -> Self {
        LogBuffer {
            entries: [LogRecord::EMPTY; LOG_BUFFER_CAP],
            head: 0,
            len: 0,
            dropped: 0,
        }
    }

    /// Returns false when the buffer is full and the record was dropped.
    pub fn push(&mut self, record: LogRecord) -> bool {
        if self.len == LOG_BUFFER_CAP {
            self.dropped += 1;
            return false;
        }
        let tail = (self.head + self.len) % LOG_BUFFER_CAP;
        self.entries[tail] = record;
        self.len += 1;
        true
    }

    /// Removes and returns the oldest record.
    pub fn pop(&mut self) -> Option<LogRecord> {
        if self.len == 0 {
            return None;
        }
        let record = self.entries[self.head];
        self.head = (self.head + 1) % LOG_BUFFER_CAP;
        self.len -= 1;
        Some(record)
    }

    pub fn iter(&self) -> impl Iterator<Item = &LogRecord> + '_ {
        (0..self.len).map(move |i| &self.entries[(self.head + i) % LOG_BUFFER_CAP])
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

    pub fn clear(&mut self) {
        self.head = 0;
        self.len = 0;
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::fmt::Write;

    fn record(seq: u64, msg: &str) -> LogRecord {
        LogRecord {
            sequence: seq,
            level: Level::Info,
            subsystem: Subsystem::Kernel,
            message: FixedStr::from_str(msg),
        }
    }

    #[test]
    fn fixed_str_truncates_on_char_boundary() {
        let mut s: FixedStr<5> = FixedStr::new();
        s.push_str("abcé");
        assert_eq!(s.as_str(), "abcé");
        s.push_str("x");
        assert_eq!(s.as_str(), "abcé");
        assert!(s.is_truncated());

        let mut t: FixedStr<4> = FixedStr::new();
        write!(t, "ab{}", "é!").unwrap();
        assert_eq!(t.as_str(), "abé");
    }

    #[test]
    fn full_buffer_drops_newest_and_counts() {
        let mut buf = LogBuffer::new();
        for i in 0..LOG_BUFFER_CAP as u64 {
            assert!(buf.push(record(i, "fill")));
        }
        assert!(!buf.push(record(999, "late")));
        assert_eq!(buf.dropped(), 1);
        assert_eq!(buf.len(), LOG_BUFFER_CAP);
        assert_eq!(buf.iter().last().map(|r| r.sequence), Some(LOG_BUFFER_CAP as u64 - 1));
    }

    #[test]
    fn pop_returns_oldest_first_across_wrap() {
        let mut buf = LogBuffer::new();
        for i in 0..LOG_BUFFER_CAP as u64 {
            buf.push(record(i, "x"));
        }
        assert_eq!(buf.pop().map(|r| r.sequence), Some(0));
        assert_eq!(buf.pop().map(|r| r.sequence), Some(1));
        assert!(buf.push(record(500, "wrapped")));
        let seqs: Vec<u64> = buf.iter().map(|r| r.sequence).collect();
        assert_eq!(seqs.len(), LOG_BUFFER_CAP - 1);
        assert_eq!(seqs[0], 2);
        assert_eq!(&seqs[seqs.len() - 2..], &[LOG_BUFFER_CAP as u64 - 1, 500]);
    }
}
