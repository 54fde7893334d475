// kernel/src/mem/heap.rs
//
// Block heap over one fixed arena.
//
// Role:
// - allocate / release for the kernel and every collaborator
// - contain corruption instead of escalating it (no protection hardware
//   stands behind the arena)
//
// Layout:
// - every block is [header | payload]; the header is HEADER_SIZE bytes
//   stored in-band: size (u32), tag (u32), prev (u32), next (u32)
// - prev/next are arena offsets of neighbouring headers, NIL at the ends
// - the first header always sits at offset 0
//
// [Invariants]
// 1. Blocks cover the arena gap-free and in address order:
//    next == self + HEADER_SIZE + size, the last block ends at arena end,
//    so sum(size) + blocks * HEADER_SIZE == arena length.
// 2. prev/next links are mutually consistent.
// 3. Every tag is TAG_ALLOCATED or TAG_FREE.
// 4. No two neighbouring blocks are both free.
// check_invariants() verifies all four.
//
// Doesn't:
// - defragment beyond neighbour coalescing. First-fit can fragment.
// - hand out raw pointers. Callers hold HeapPtr (payload offset) handles.

use core::fmt;

use crate::logging::{self, Subsystem};

pub const HEADER_SIZE: usize = 16;
pub const ALIGN: usize = 8;
/// Smallest payload worth splitting off as its own free block.
pub const MIN_GRANULE: usize = 8;

pub const TAG_ALLOCATED: u32 = 0xDEAD_BEEF;
pub const TAG_FREE: u32 = 0xFEED_FACE;

const NIL: u32 = u32::MAX;

// header field offsets
const F_SIZE: usize = 0;
const F_TAG: usize = 4;
const F_PREV: usize = 8;
const F_NEXT: usize = 12;

/// Handle to an allocation: arena offset of its payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct HeapPtr(usize);

impl HeapPtr {
    pub const fn from_offset(offset: usize) -> Self {
        HeapPtr(offset)
    }

    pub const fn offset(self) -> usize {
        self.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CorruptionKind {
    OutOfBounds,
    Misaligned,
    BadTag,
    DoubleFree,
    BrokenLinks,
}

impl CorruptionKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            CorruptionKind::OutOfBounds => "pointer outside arena",
            CorruptionKind::Misaligned => "pointer not on a block boundary",
            CorruptionKind::BadTag => "header tag is not a heap sentinel",
            CorruptionKind::DoubleFree => "block already free",
            CorruptionKind::BrokenLinks => "block links inconsistent",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeapError {
    ZeroSize,
    OutOfMemory { requested: usize },
    SizeOverflow,
    InvalidArena,
    Corruption(CorruptionKind),
}

impl fmt::Display for HeapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeapError::ZeroSize => write!(f, "zero-byte allocation"),
            HeapError::OutOfMemory { requested } => {
                write!(f, "out of memory ({} bytes requested)", requested)
            }
            HeapError::SizeOverflow => write!(f, "allocation size overflows"),
            HeapError::InvalidArena => write!(f, "arena too small or too large"),
            HeapError::Corruption(kind) => write!(f, "heap corruption: {}", kind.as_str()),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HeapStats {
    pub total_size: usize,
    pub used_bytes: usize,
    pub free_bytes: usize,
    pub allocated_blocks: usize,
    pub free_blocks: usize,
    pub largest_free: usize,
    pub corruption_count: u64,
    pub allocations: u64,
    pub releases: u64,
    pub failed_allocations: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockInfo {
    /// Arena offset of the header.
    pub offset: usize,
    /// Payload bytes.
    pub size: usize,
    pub free: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Header {
    size: u32,
    tag: u32,
    prev: u32,
    next: u32,
}

pub struct Heap<'a> {
    arena: &'a mut [u8],
    corruption_count: u64,
    allocations: u64,
    releases: u64,
    failed_allocations: u64,
}

#[inline]
const fn align_up(n: usize) -> Option<usize> {
    match n.checked_add(ALIGN - 1) {
        Some(v) => Some(v & !(ALIGN - 1)),
        None => None,
    }
}

#[inline]
fn link(v: u32) -> Option<usize> {
    if v == NIL {
        None
    } else {
        Some(v as usize)
    }
}

#[inline]
fn unlink(v: Option<usize>) -> u32 {
    match v {
        Some(o) => o as u32,
        None => NIL,
    }
}

impl<'a> Heap<'a> {
    /// One free block spanning the whole arena. The arena length is trimmed
    /// down to a multiple of ALIGN.
    pub fn new(arena: &'a mut [u8]) -> Result<Self, HeapError> {
        let usable = arena.len() & !(ALIGN - 1);
        if usable < HEADER_SIZE + MIN_GRANULE || usable > NIL as usize {
            return Err(HeapError::InvalidArena);
        }
        let arena = &mut arena[..usable];

        let mut heap = Heap {
            arena,
            corruption_count: 0,
            allocations: 0,
            releases: 0,
            failed_allocations: 0,
        };
        heap.write_header(
            0,
            Header {
                size: (usable - HEADER_SIZE) as u32,
                tag: TAG_FREE,
                prev: NIL,
                next: NIL,
            },
        );
        Ok(heap)
    }

    pub fn arena_len(&self) -> usize {
        self.arena.len()
    }

    /// Physical/virtual address of a payload, for collaborators that need
    /// real memory (process stacks).
    pub fn address_of(&self, ptr: HeapPtr) -> u64 {
        self.arena.as_ptr() as u64 + ptr.0 as u64
    }

    pub fn corruption_count(&self) -> u64 {
        self.corruption_count
    }

    // ─────────────────────────────────────────────
    // header access
    // ─────────────────────────────────────────────

    fn read_u32(&self, at: usize) -> u32 {
        let mut b = [0u8; 4];
        b.copy_from_slice(&self.arena[at..at + 4]);
        u32::from_le_bytes(b)
    }

    fn write_u32(&mut self, at: usize, v: u32) {
        self.arena[at..at + 4].copy_from_slice(&v.to_le_bytes());
    }

    fn read_header(&self, h: usize) -> Header {
        Header {
            size: self.read_u32(h + F_SIZE),
            tag: self.read_u32(h + F_TAG),
            prev: self.read_u32(h + F_PREV),
            next: self.read_u32(h + F_NEXT),
        }
    }

    fn write_header(&mut self, h: usize, hdr: Header) {
        self.write_u32(h + F_SIZE, hdr.size);
        self.write_u32(h + F_TAG, hdr.tag);
        self.write_u32(h + F_PREV, hdr.prev);
        self.write_u32(h + F_NEXT, hdr.next);
    }

    /// Raw arena access for tests that need to damage metadata.
    #[cfg(test)]
    pub(crate) fn arena_bytes_mut(&mut self) -> &mut [u8] {
        &mut *self.arena
    }

    fn set_prev(&mut self, h: usize, prev: Option<usize>) {
        self.write_u32(h + F_PREV, unlink(prev));
    }

    fn set_next(&mut self, h: usize, next: Option<usize>) {
        self.write_u32(h + F_NEXT, unlink(next));
    }

    fn set_tag(&mut self, h: usize, tag: u32) {
        self.write_u32(h + F_TAG, tag);
    }

    fn set_size(&mut self, h: usize, size: usize) {
        self.write_u32(h + F_SIZE, size as u32);
    }

    /// Upper bound on blocks, so a damaged list can never loop forever.
    fn max_blocks(&self) -> usize {
        self.arena.len() / (HEADER_SIZE + MIN_GRANULE) + 1
    }

    // ─────────────────────────────────────────────
    // allocate
    // ─────────────────────────────────────────────

    pub fn allocate(&mut self, size: usize) -> Result<HeapPtr, HeapError> {
        if size == 0 {
            return Err(HeapError::ZeroSize);
        }
        let req = match align_up(size) {
            Some(r) if r <= self.arena.len() => r,
            Some(_) => return Err(self.fail_allocation(size)),
            None => return Err(HeapError::SizeOverflow),
        };

        let mut cursor = Some(0usize);
        let mut steps = 0;
        while let Some(h) = cursor {
            if h + HEADER_SIZE > self.arena.len() || steps > self.max_blocks() {
                return Err(self.corruption(CorruptionKind::BrokenLinks));
            }
            steps += 1;

            let hdr = self.read_header(h);
            match hdr.tag {
                TAG_FREE if hdr.size as usize >= req => {
                    self.split(h, req);
                    self.set_tag(h, TAG_ALLOCATED);
                    self.allocations += 1;
                    return Ok(HeapPtr(h + HEADER_SIZE));
                }
                TAG_FREE | TAG_ALLOCATED => cursor = link(hdr.next),
                _ => return Err(self.corruption(CorruptionKind::BadTag)),
            }
        }

        Err(self.fail_allocation(size))
    }

    /// calloc: count * size bytes, zero-filled.
    pub fn allocate_zeroed(&mut self, count: usize, size: usize) -> Result<HeapPtr, HeapError> {
        let total = count.checked_mul(size).ok_or(HeapError::SizeOverflow)?;
        let ptr = self.allocate(total)?;
        if let Some(bytes) = self.payload_mut(ptr) {
            bytes.fill(0);
        }
        Ok(ptr)
    }

    fn fail_allocation(&mut self, requested: usize) -> HeapError {
        self.failed_allocations += 1;
        logging::warn(Subsystem::Memory, "heap: out of memory");
        HeapError::OutOfMemory { requested }
    }

    /// Shrinks block `h` to `req` payload bytes if the remainder can hold a
    /// header plus at least one granule; the remainder becomes a free block.
    fn split(&mut self, h: usize, req: usize) {
        let hdr = self.read_header(h);
        let size = hdr.size as usize;
        if size - req <= HEADER_SIZE + MIN_GRANULE {
            return;
        }

        let tail = h + HEADER_SIZE + req;
        self.write_header(
            tail,
            Header {
                size: (size - req - HEADER_SIZE) as u32,
                tag: TAG_FREE,
                prev: h as u32,
                next: hdr.next,
            },
        );
        if let Some(n) = link(hdr.next) {
            self.set_prev(n, Some(tail));
        }
        self.set_size(h, req);
        self.set_next(h, Some(tail));

        self.coalesce_forward(tail);
    }

    // ─────────────────────────────────────────────
    // release
    // ─────────────────────────────────────────────

    /// Frees `ptr`. A pointer that does not name a live allocation is counted
    /// as corruption and otherwise ignored.
    pub fn release(&mut self, ptr: HeapPtr) -> Result<(), HeapError> {
        let h = match self.validate(ptr) {
            Ok(h) => h,
            Err(kind) => return Err(self.corruption(kind)),
        };

        self.set_tag(h, TAG_FREE);
        self.releases += 1;

        self.coalesce_forward(h);
        if let Some(prev) = link(self.read_header(h).prev) {
            if self.read_header(prev).tag == TAG_FREE {
                self.coalesce_forward(prev);
            }
        }
        Ok(())
    }

    /// Header offset of a live allocation, or why `ptr` is not one.
    fn validate(&self, ptr: HeapPtr) -> Result<usize, CorruptionKind> {
        let off = ptr.0;
        if off < HEADER_SIZE || off > self.arena.len() {
            return Err(CorruptionKind::OutOfBounds);
        }
        let h = off - HEADER_SIZE;
        if h % ALIGN != 0 {
            return Err(CorruptionKind::Misaligned);
        }

        let hdr = self.read_header(h);
        match hdr.tag {
            TAG_ALLOCATED => {}
            TAG_FREE => return Err(CorruptionKind::DoubleFree),
            _ => return Err(CorruptionKind::BadTag),
        }

        let end = h + HEADER_SIZE + hdr.size as usize;
        if end > self.arena.len() {
            return Err(CorruptionKind::BrokenLinks);
        }

        match link(hdr.next) {
            Some(n) => {
                // a header claiming the last bytes of the arena may still
                // name a successor past the end
                if n != end || n + HEADER_SIZE > self.arena.len() {
                    return Err(CorruptionKind::BrokenLinks);
                }
                if self.read_header(n).prev != h as u32 {
                    return Err(CorruptionKind::BrokenLinks);
                }
            }
            None => {
                if end != self.arena.len() {
                    return Err(CorruptionKind::BrokenLinks);
                }
            }
        }

        match link(hdr.prev) {
            Some(p) => {
                if p >= h || self.read_header(p).next != h as u32 {
                    return Err(CorruptionKind::BrokenLinks);
                }
            }
            None => {
                if h != 0 {
                    return Err(CorruptionKind::BrokenLinks);
                }
            }
        }

        Ok(h)
    }

    /// Absorbs the following block into `h` if it is free. The absorbed
    /// header's tag is scrubbed so a stale pointer to it reads as corruption.
    fn coalesce_forward(&mut self, h: usize) {
        let hdr = self.read_header(h);
        let Some(n) = link(hdr.next) else {
            return;
        };
        let next = self.read_header(n);
        if next.tag != TAG_FREE {
            return;
        }

        self.set_size(h, hdr.size as usize + HEADER_SIZE + next.size as usize);
        self.set_next(h, link(next.next));
        if let Some(nn) = link(next.next) {
            self.set_prev(nn, Some(h));
        }
        self.set_tag(n, 0);
    }

    fn corruption(&mut self, kind: CorruptionKind) -> HeapError {
        self.corruption_count += 1;
        logging::warn(Subsystem::Memory, kind.as_str());
        HeapError::Corruption(kind)
    }

    // ─────────────────────────────────────────────
    // reallocate
    // ─────────────────────────────────────────────

    /// Resizes an allocation, in place when the block (plus a free
    /// neighbour) is big enough, otherwise by move. On failure the original
    /// allocation is untouched.
    pub fn reallocate(&mut self, ptr: HeapPtr, size: usize) -> Result<HeapPtr, HeapError> {
        if size == 0 {
            return Err(HeapError::ZeroSize);
        }
        let h = match self.validate(ptr) {
            Ok(h) => h,
            Err(kind) => return Err(self.corruption(kind)),
        };
        let req = align_up(size).ok_or(HeapError::SizeOverflow)?;
        let hdr = self.read_header(h);
        let current = hdr.size as usize;

        if req <= current {
            self.split(h, req);
            return Ok(ptr);
        }

        if let Some(n) = link(hdr.next) {
            let next = self.read_header(n);
            if next.tag == TAG_FREE && current + HEADER_SIZE + next.size as usize >= req {
                self.coalesce_forward(h);
                self.split(h, req);
                return Ok(ptr);
            }
        }

        let new_ptr = self.allocate(size)?;
        let src = ptr.0;
        let dst = new_ptr.0;
        self.arena.copy_within(src..src + current, dst);
        self.release(ptr)?;
        Ok(new_ptr)
    }

    // ─────────────────────────────────────────────
    // payload access
    // ─────────────────────────────────────────────

    pub fn size_of(&self, ptr: HeapPtr) -> Option<usize> {
        let h = self.validate(ptr).ok()?;
        Some(self.read_header(h).size as usize)
    }

    pub fn payload(&self, ptr: HeapPtr) -> Option<&[u8]> {
        let size = self.size_of(ptr)?;
        Some(&self.arena[ptr.0..ptr.0 + size])
    }

    pub fn payload_mut(&mut self, ptr: HeapPtr) -> Option<&mut [u8]> {
        let size = self.size_of(ptr)?;
        Some(&mut self.arena[ptr.0..ptr.0 + size])
    }

    // ─────────────────────────────────────────────
    // diagnostics
    // ─────────────────────────────────────────────

    /// Walks the block list front to back. Stops early on a damaged link.
    pub fn blocks(&self) -> Blocks<'_, 'a> {
        Blocks {
            heap: self,
            cursor: Some(0),
            remaining: self.max_blocks(),
        }
    }

    pub fn stats(&self) -> HeapStats {
        let mut s = HeapStats {
            total_size: self.arena.len(),
            corruption_count: self.corruption_count,
            allocations: self.allocations,
            releases: self.releases,
            failed_allocations: self.failed_allocations,
            ..HeapStats::default()
        };
        for b in self.blocks() {
            if b.free {
                s.free_blocks += 1;
                s.free_bytes += b.size;
                s.largest_free = s.largest_free.max(b.size);
            } else {
                s.allocated_blocks += 1;
                s.used_bytes += b.size;
            }
        }
        s
    }

    pub fn check_invariants(&self) -> Result<(), &'static str> {
        let len = self.arena.len();
        let mut expected_prev: Option<usize> = None;
        let mut expected_at = 0usize;
        let mut prev_free = false;
        let mut covered = 0usize;
        let mut cursor = Some(0usize);
        let mut steps = 0;

        while let Some(h) = cursor {
            steps += 1;
            if steps > self.max_blocks() {
                return Err("block list does not terminate");
            }
            if h != expected_at {
                return Err("gap or overlap between blocks");
            }
            if h + HEADER_SIZE > len {
                return Err("header past arena end");
            }
            let hdr = self.read_header(h);
            if link(hdr.prev) != expected_prev {
                return Err("prev link mismatch");
            }
            let free = match hdr.tag {
                TAG_FREE => true,
                TAG_ALLOCATED => false,
                _ => return Err("invalid tag"),
            };
            if free && prev_free {
                return Err("adjacent free blocks");
            }
            if hdr.size as usize % ALIGN != 0 {
                return Err("unaligned block size");
            }

            covered += HEADER_SIZE + hdr.size as usize;
            expected_at = h + HEADER_SIZE + hdr.size as usize;
            expected_prev = Some(h);
            prev_free = free;
            cursor = link(hdr.next);
        }

        if expected_at != len || covered != len {
            return Err("blocks do not cover the arena");
        }
        Ok(())
    }
}

pub struct Blocks<'h, 'a> {
    heap: &'h Heap<'a>,
    cursor: Option<usize>,
    remaining: usize,
}

impl<'h, 'a> Iterator for Blocks<'h, 'a> {
    type Item = BlockInfo;

    fn next(&mut self) -> Option<BlockInfo> {
        let h = self.cursor?;
        if self.remaining == 0 || h + HEADER_SIZE > self.heap.arena.len() {
            self.cursor = None;
            return None;
        }
        self.remaining -= 1;

        let hdr = self.heap.read_header(h);
        self.cursor = link(hdr.next);
        Some(BlockInfo {
            offset: h,
            size: hdr.size as usize,
            free: hdr.tag == TAG_FREE,
        })
    }
}
