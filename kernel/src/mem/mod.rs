// kernel/src/mem/mod.rs
//
// Memory manager.
// - layout: fixed physical layout shared with the boot stages
// - heap:   block allocator over the kernel arena
//
// The arena itself is a static, 16-byte aligned buffer in .bss. It can be
// handed out exactly once.

pub mod heap;
pub mod layout;

use core::ptr::addr_of_mut;
use core::sync::atomic::{AtomicBool, Ordering};

pub use heap::{BlockInfo, CorruptionKind, Heap, HeapError, HeapPtr, HeapStats};

pub const KERNEL_ARENA_SIZE: usize = layout::HEAP_INITIAL_SIZE;

/// `#[repr(align(N))]` has to sit on a type, not on the static.
#[repr(align(16))]
struct AlignedArena<const N: usize> {
    buf: [u8; N],
}

static mut KERNEL_ARENA: AlignedArena<KERNEL_ARENA_SIZE> = AlignedArena {
    buf: [0; KERNEL_ARENA_SIZE],
};
static ARENA_TAKEN: AtomicBool = AtomicBool::new(false);

/// The kernel heap arena. `None` after the first call.
pub fn take_kernel_arena() -> Option<&'static mut [u8]> {
    if ARENA_TAKEN.swap(true, Ordering::AcqRel) {
        return None;
    }
    // Safety: ARENA_TAKEN guarantees a single &mut to the buffer exists.
    Some(unsafe { &mut (&mut (*addr_of_mut!(KERNEL_ARENA)).buf)[..] })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernel_arena_is_handed_out_once() {
        let arena = take_kernel_arena().expect("first take");
        assert_eq!(arena.len(), KERNEL_ARENA_SIZE);
        assert_eq!(arena.as_ptr() as usize % 16, 0);
        assert!(take_kernel_arena().is_none());
    }
}
