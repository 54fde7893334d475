// kernel/src/error.rs
//
// Kernel-wide error umbrella. Each subsystem keeps its own enum; this one
// only joins them and classifies how bad a failure is.
//
//   Fatal       boot media, unsupported CPU, unhandled exception
//   Recoverable returned to the caller (out of memory, bad pid, ...)
//   Degraded    logged and counted, kernel keeps going (heap corruption)

use core::fmt;

use crate::boot::BootError;
use crate::interrupts::{DispatchError, FaultKind};
use crate::mem::HeapError;
use crate::sched::ProcessError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Fatal,
    Recoverable,
    Degraded,
}

impl Severity {
    pub const fn as_str(self) -> &'static str {
        match self {
            Severity::Fatal => "fatal",
            Severity::Recoverable => "recoverable",
            Severity::Degraded => "degraded",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KernelError {
    Boot(BootError),
    Heap(HeapError),
    Process(ProcessError),
    Dispatch(DispatchError),
    UnhandledException(FaultKind),
    /// KernelState was used before bootstrap() or after a halt.
    NotRunning,
    /// A self-check found broken kernel bookkeeping.
    Invariant(&'static str),
}

impl KernelError {
    pub fn severity(&self) -> Severity {
        match self {
            KernelError::Boot(_) | KernelError::UnhandledException(_) => Severity::Fatal,
            KernelError::Invariant(_) => Severity::Degraded,
            KernelError::Heap(e) => heap_severity(e),
            KernelError::Process(ProcessError::StackAllocation(e)) => heap_severity(e),
            KernelError::Process(_) | KernelError::Dispatch(_) | KernelError::NotRunning => {
                Severity::Recoverable
            }
        }
    }
}

fn heap_severity(e: &HeapError) -> Severity {
    match e {
        HeapError::Corruption(_) => Severity::Degraded,
        HeapError::InvalidArena => Severity::Fatal,
        HeapError::ZeroSize | HeapError::OutOfMemory { .. } | HeapError::SizeOverflow => {
            Severity::Recoverable
        }
    }
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelError::Boot(e) => write!(f, "boot: {}", e),
            KernelError::Heap(e) => write!(f, "heap: {}", e),
            KernelError::Process(e) => write!(f, "process: {}", e),
            KernelError::Dispatch(e) => write!(f, "interrupts: {}", e),
            KernelError::UnhandledException(k) => write!(f, "unhandled exception: {}", k.description()),
            KernelError::NotRunning => f.write_str("kernel is not running"),
            KernelError::Invariant(why) => write!(f, "invariant violated: {}", why),
        }
    }
}

impl From<BootError> for KernelError {
    fn from(e: BootError) -> Self {
        KernelError::Boot(e)
    }
}

impl From<HeapError> for KernelError {
    fn from(e: HeapError) -> Self {
        KernelError::Heap(e)
    }
}

impl From<ProcessError> for KernelError {
    fn from(e: ProcessError) -> Self {
        KernelError::Process(e)
    }
}

impl From<DispatchError> for KernelError {
    fn from(e: DispatchError) -> Self {
        KernelError::Dispatch(e)
    }
}
