// kernel/src/kernel/state_ref.rs
//
// The single way interrupt stubs (arch) reach KernelState.
//
// - entry registers the KernelState it owns; it lives on a stack frame
//   that never returns
// - with_kernel_state() hands out &mut for the duration of a closure,
//   with interrupts off, and refuses a nested borrow (returns None)
//
// Doesn't:
// - own KernelState or move it

use core::ptr;
use core::sync::atomic::{AtomicBool, AtomicPtr, Ordering};

use super::KernelState;

static KERNEL_STATE: AtomicPtr<KernelState> = AtomicPtr::new(ptr::null_mut());
static BORROWED: AtomicBool = AtomicBool::new(false);

/// Safety: `ks` must stay valid and unmoved until unregister_kernel_state().
pub unsafe fn register_kernel_state(ks: &mut KernelState) {
    KERNEL_STATE.store(ks as *mut KernelState, Ordering::SeqCst);
}

pub fn unregister_kernel_state() {
    KERNEL_STATE.store(ptr::null_mut(), Ordering::SeqCst);
}

pub fn is_registered() -> bool {
    !KERNEL_STATE.load(Ordering::SeqCst).is_null()
}

pub fn with_kernel_state<R>(f: impl FnOnce(&mut KernelState) -> R) -> Option<R> {
    #[cfg(target_os = "none")]
    {
        x86_64::instructions::interrupts::without_interrupts(|| borrow(f))
    }
    #[cfg(not(target_os = "none"))]
    {
        borrow(f)
    }
}

fn borrow<R>(f: impl FnOnce(&mut KernelState) -> R) -> Option<R> {
    let p = KERNEL_STATE.load(Ordering::SeqCst);
    if p.is_null() {
        return None;
    }
    if BORROWED.swap(true, Ordering::AcqRel) {
        return None;
    }
    // Safety: registration guarantees validity; BORROWED guarantees this
    // is the only live &mut.
    let r = f(unsafe { &mut *p });
    BORROWED.store(false, Ordering::Release);
    Some(r)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KernelConfig;

    #[test]
    fn register_borrow_and_refuse_nesting() {
        assert!(with_kernel_state(|_| ()).is_none());

        let arena = Box::leak(vec![0u8; 4096].into_boxed_slice());
        let config = KernelConfig { heap_size: 4096, ..KernelConfig::DEFAULT };
        let mut ks = KernelState::new(config, arena).unwrap();
        unsafe { register_kernel_state(&mut ks) };
        assert!(is_registered());

        let len = with_kernel_state(|k| k.heap().arena_len());
        assert_eq!(len, Some(4096));

        let nested = with_kernel_state(|_| with_kernel_state(|_| ()));
        assert_eq!(nested, Some(None));

        unregister_kernel_state();
        assert!(with_kernel_state(|_| ()).is_none());
    }
}
