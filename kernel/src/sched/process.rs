// kernel/src/sched/process.rs
//
// Process record and the small value types around it.
//
// - parent is a weak link (Pid), children are a fixed set of Pids; no
//   process ever owns another
// - the stack is owned: allocated from the heap at creation, released on
//   termination
// - RegisterSnapshot is only seeded at creation. Switching is CPU-time
//   bookkeeping; nothing captures or restores real registers yet.

use core::fmt;

use crate::logging::FixedStr;
use crate::mem::HeapPtr;

pub const PROCESS_NAME_LEN: usize = 32;
pub const MAX_CHILDREN: usize = 16;

/// RFLAGS for a fresh context: IF set, reserved bit 1 set.
const INITIAL_RFLAGS: u64 = 0x202;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pid(pub u32);

impl Pid {
    pub const KERNEL: Pid = Pid(0);
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pid {}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessState {
    Ready,
    Running,
    Waiting,
    Terminated,
}

impl ProcessState {
    pub const fn as_str(self) -> &'static str {
        match self {
            ProcessState::Ready => "READY",
            ProcessState::Running => "RUNNING",
            ProcessState::Waiting => "WAITING",
            ProcessState::Terminated => "TERMINATED",
        }
    }
}

/// Lower value runs first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Priority {
    Critical = 0,
    High = 1,
    Normal = 2,
    Background = 3,
}

impl Priority {
    pub const COUNT: usize = 4;
    pub const ALL: [Priority; Priority::COUNT] = [
        Priority::Critical,
        Priority::High,
        Priority::Normal,
        Priority::Background,
    ];

    pub const fn value(self) -> u8 {
        self as u8
    }

    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn from_value(v: u8) -> Option<Priority> {
        match v {
            0 => Some(Priority::Critical),
            1 => Some(Priority::High),
            2 => Some(Priority::Normal),
            3 => Some(Priority::Background),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StackRegion {
    pub handle: HeapPtr,
    pub base: u64,
    pub size: usize,
}

impl StackRegion {
    /// Stacks grow down; the initial stack pointer is one past the end.
    pub fn top(&self) -> u64 {
        self.base + self.size as u64
    }

    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.base && addr < self.top()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RegisterSnapshot {
    pub instruction_pointer: u64,
    pub stack_pointer: u64,
    pub rflags: u64,
    pub general: [u64; 15],
}

impl RegisterSnapshot {
    pub fn initial(entry: u64, stack_top: u64) -> Self {
        RegisterSnapshot {
            instruction_pointer: entry,
            // keep the ABI's 16-byte alignment at entry
            stack_pointer: stack_top & !0xF,
            rflags: INITIAL_RFLAGS,
            general: [0; 15],
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChildSet {
    pids: [Option<Pid>; MAX_CHILDREN],
    len: usize,
}

impl ChildSet {
    pub const fn new() -> Self {
        ChildSet {
            pids: [None; MAX_CHILDREN],
            len: 0,
        }
    }

    /// Returns false if the set is full.
    pub fn insert(&mut self, pid: Pid) -> bool {
        if self.contains(pid) {
            return true;
        }
        match self.pids.iter_mut().find(|p| p.is_none()) {
            Some(slot) => {
                *slot = Some(pid);
                self.len += 1;
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, pid: Pid) -> bool {
        match self.pids.iter_mut().find(|p| **p == Some(pid)) {
            Some(slot) => {
                *slot = None;
                self.len -= 1;
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, pid: Pid) -> bool {
        self.pids.iter().any(|p| *p == Some(pid))
    }

    pub fn iter(&self) -> impl Iterator<Item = Pid> + '_ {
        self.pids.iter().filter_map(|p| *p)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Default for ChildSet {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Process {
    pub pid: Pid,
    pub name: FixedStr<PROCESS_NAME_LEN>,
    pub state: ProcessState,
    pub priority: Priority,
    pub entry_point: u64,
    pub stack: Option<StackRegion>,
    pub context: RegisterSnapshot,
    pub parent: Option<Pid>,
    pub children: ChildSet,

    /// Ticks spent RUNNING, settled at every switch away.
    pub cpu_time: u64,
    pub last_scheduled: u64,
    /// Quota in timer ticks.
    pub time_slice: u64,
    pub created_at: u64,
}

impl Process {
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    pub fn is_schedulable(&self) -> bool {
        matches!(self.state, ProcessState::Ready | ProcessState::Running)
    }
}
