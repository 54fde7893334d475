// kernel/src/sched/mod.rs
//
// Cooperative priority scheduler with tick-driven time slices.
//
// Role:
// - fixed slot table of processes, addressed by slot index internally and
//   by Pid from outside
// - ready queue ordered by priority (FIFO within a tier)
// - per-tier quota; the timer vector calls on_timer_tick()
//
// [Invariants] (check_invariants)
// 1. At most one process is RUNNING, and it is `current`.
// 2. A process is in the ready queue iff it is READY.
// 3. Ready queue is sorted ascending by priority.
// 4. Parent/child links agree in both directions.
//
// Doesn't:
// - age priorities. A steady stream of higher-tier work starves lower tiers.
// - save or restore registers. A "switch" settles CPU time and flips state.

pub mod process;
pub mod ready_queue;

use core::fmt;

use crate::logging::{self, FixedStr, Subsystem};
use crate::mem::{Heap, HeapError};

pub use process::{
    ChildSet, Pid, Priority, Process, ProcessState, RegisterSnapshot, StackRegion,
    MAX_CHILDREN, PROCESS_NAME_LEN,
};
use ready_queue::ReadyQueue;

pub const MAX_PROCESSES: usize = 64;

/// Ticks per tier, Critical first.
pub const DEFAULT_QUOTAS: [u64; Priority::COUNT] = [100, 50, 25, 10];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SchedConfig {
    pub quotas: [u64; Priority::COUNT],
    pub stack_size: usize,
}

impl SchedConfig {
    pub const DEFAULT: SchedConfig = SchedConfig {
        quotas: DEFAULT_QUOTAS,
        stack_size: crate::mem::layout::STACK_SIZE as usize,
    };

    pub const fn quota(&self, priority: Priority) -> u64 {
        self.quotas[priority.index()]
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessError {
    TableFull,
    StackAllocation(HeapError),
    NotFound(Pid),
    InvalidState { pid: Pid, state: ProcessState },
    KernelProcess,
    TooManyChildren(Pid),
    AlreadyInitialized,
}

impl fmt::Display for ProcessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessError::TableFull => write!(f, "process table full"),
            ProcessError::StackAllocation(e) => write!(f, "stack allocation failed: {}", e),
            ProcessError::NotFound(pid) => write!(f, "no such process ({})", pid),
            ProcessError::InvalidState { pid, state } => {
                write!(f, "{} is {}", pid, state.as_str())
            }
            ProcessError::KernelProcess => write!(f, "the kernel process cannot be terminated"),
            ProcessError::TooManyChildren(pid) => write!(f, "{} has too many children", pid),
            ProcessError::AlreadyInitialized => write!(f, "kernel process already exists"),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SchedStats {
    pub total_created: u64,
    pub active: usize,
    pub terminated: u64,
    pub context_switches: u64,
    pub total_cpu_time: u64,
    pub preemptions: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Switch {
    pub from: Option<Pid>,
    pub to: Pid,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing is running and nothing is ready.
    Idle,
    Continue,
    /// Quota reached with an empty ready queue: same process, fresh slice.
    SliceRenewed(Pid),
    Preempted(Switch),
    /// Nothing was running; the head of the ready queue was dispatched.
    Dispatched(Switch),
}

pub struct Scheduler {
    config: SchedConfig,
    slots: [Option<Process>; MAX_PROCESSES],
    ready: ReadyQueue<MAX_PROCESSES>,
    current: Option<usize>,
    next_pid: u32,
    now: u64,
    stats: SchedStats,
}

impl Scheduler {
    pub const fn new(config: SchedConfig) -> Self {
        const EMPTY: Option<Process> = None;
        Scheduler {
            config,
            slots: [EMPTY; MAX_PROCESSES],
            ready: ReadyQueue::new(),
            current: None,
            next_pid: 1,
            now: 0,
            stats: SchedStats {
                total_created: 0,
                active: 0,
                terminated: 0,
                context_switches: 0,
                total_cpu_time: 0,
                preemptions: 0,
            },
        }
    }

    pub fn config(&self) -> SchedConfig {
        self.config
    }

    /// Timer ticks since init.
    pub fn now(&self) -> u64 {
        self.now
    }

    pub fn stats(&self) -> SchedStats {
        self.stats
    }

    /// The RUNNING process, if any.
    pub fn current(&self) -> Option<Pid> {
        self.current_process().map(|p| p.pid)
    }

    pub fn current_process(&self) -> Option<&Process> {
        self.current.and_then(|i| self.proc(i))
    }

    /// A terminated pid is not found: its slot is cleared at termination.
    pub fn get(&self, pid: Pid) -> Option<&Process> {
        self.slot_of(pid).and_then(|i| self.proc(i))
    }

    pub fn processes(&self) -> impl Iterator<Item = &Process> + '_ {
        self.slots.iter().filter_map(|s| s.as_ref())
    }

    pub fn ready_order(&self) -> impl Iterator<Item = Pid> + '_ {
        self.ready.iter().filter_map(move |i| self.proc(i).map(|p| p.pid))
    }

    pub fn ready_len(&self) -> usize {
        self.ready.len()
    }

    fn slot_of(&self, pid: Pid) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| matches!(s, Some(p) if p.pid == pid))
    }

    fn proc(&self, slot: usize) -> Option<&Process> {
        self.slots.get(slot).and_then(|s| s.as_ref())
    }

    fn proc_mut(&mut self, slot: usize) -> Option<&mut Process> {
        self.slots.get_mut(slot).and_then(|s| s.as_mut())
    }

    // ─────────────────────────────────────────────
    // lifecycle
    // ─────────────────────────────────────────────

    /// Pid 0: highest tier, runs on the boot stack, never terminated.
    pub fn init_kernel_process(&mut self) -> Result<Pid, ProcessError> {
        if self.slots[0].is_some() {
            return Err(ProcessError::AlreadyInitialized);
        }

        self.slots[0] = Some(Process {
            pid: Pid::KERNEL,
            name: FixedStr::from_str("kernel"),
            state: ProcessState::Running,
            priority: Priority::Critical,
            entry_point: 0,
            stack: None,
            context: RegisterSnapshot::default(),
            parent: None,
            children: ChildSet::new(),
            cpu_time: 0,
            last_scheduled: self.now,
            time_slice: self.config.quota(Priority::Critical),
            created_at: self.now,
        });
        self.current = Some(0);
        self.stats.total_created += 1;
        self.stats.active += 1;

        logging::info(Subsystem::Process, "kernel process created (pid 0)");
        Ok(Pid::KERNEL)
    }

    /// New READY process whose parent is the current process.
    pub fn create(
        &mut self,
        heap: &mut Heap<'_>,
        name: &str,
        entry_point: u64,
        priority: Priority,
    ) -> Result<Pid, ProcessError> {
        // slot 0 is reserved for the kernel process
        let slot = (1..MAX_PROCESSES)
            .find(|&i| self.slots[i].is_none())
            .ok_or(ProcessError::TableFull)?;

        let pid = Pid(self.next_pid);
        let parent_slot = self.current;
        if let Some(parent) = parent_slot.and_then(|ps| self.proc(ps)) {
            if parent.children.len() >= MAX_CHILDREN {
                return Err(ProcessError::TooManyChildren(parent.pid));
            }
        }

        let handle = heap
            .allocate(self.config.stack_size)
            .map_err(ProcessError::StackAllocation)?;
        let stack = StackRegion {
            handle,
            base: heap.address_of(handle),
            size: self.config.stack_size,
        };

        let parent = match parent_slot.and_then(|ps| self.proc_mut(ps)) {
            Some(p) => {
                p.children.insert(pid);
                Some(p.pid)
            }
            None => None,
        };

        self.next_pid += 1;
        self.slots[slot] = Some(Process {
            pid,
            name: FixedStr::from_str(name),
            state: ProcessState::Ready,
            priority,
            entry_point,
            stack: Some(stack),
            context: RegisterSnapshot::initial(entry_point, stack.top()),
            parent,
            children: ChildSet::new(),
            cpu_time: 0,
            last_scheduled: 0,
            time_slice: self.config.quota(priority),
            created_at: self.now,
        });
        self.ready.insert(slot, priority);

        self.stats.total_created += 1;
        self.stats.active += 1;

        logging::logf(
            logging::Level::Info,
            Subsystem::Process,
            format_args!("created {} '{}' priority {}", pid, name, priority.value()),
        );
        Ok(pid)
    }

    /// Frees the stack and clears the slot. Returns the retired record with
    /// state TERMINATED; afterwards the pid is no longer queryable.
    pub fn terminate(&mut self, heap: &mut Heap<'_>, pid: Pid) -> Result<Process, ProcessError> {
        if pid == Pid::KERNEL {
            return Err(ProcessError::KernelProcess);
        }
        let slot = self.slot_of(pid).ok_or(ProcessError::NotFound(pid))?;

        self.ready.remove(slot);
        let was_current = self.current == Some(slot);
        if was_current {
            self.account(slot);
            self.current = None;
        }

        let mut record = self.slots[slot].take().ok_or(ProcessError::NotFound(pid))?;
        record.state = ProcessState::Terminated;

        if let Some(stack) = record.stack.take() {
            if heap.release(stack.handle).is_err() {
                logging::error(Subsystem::Process, "terminate: stack release rejected by heap");
            }
        }

        if let Some(parent) = record.parent.and_then(|pp| self.slot_of(pp)).and_then(|ps| self.proc_mut(ps)) {
            parent.children.remove(pid);
        }
        for child in record.children.iter() {
            if let Some(c) = self.slot_of(child).and_then(|cs| self.proc_mut(cs)) {
                c.parent = None;
            }
        }

        self.stats.active -= 1;
        self.stats.terminated += 1;
        logging::logf(
            logging::Level::Info,
            Subsystem::Process,
            format_args!("terminated {}", pid),
        );

        if was_current {
            self.schedule_next();
        }
        Ok(record)
    }

    // ─────────────────────────────────────────────
    // scheduling
    // ─────────────────────────────────────────────

    /// Settles CPU time for `slot` up to now.
    fn account(&mut self, slot: usize) {
        let now = self.now;
        if let Some(p) = self.proc_mut(slot) {
            let ran = now - p.last_scheduled;
            p.cpu_time += ran;
            p.last_scheduled = now;
            self.stats.total_cpu_time += ran;
        }
    }

    /// Pops the head of the ready queue and makes it RUNNING. The previously
    /// RUNNING process goes back into the queue at its priority.
    /// Empty queue: no switch.
    pub fn schedule_next(&mut self) -> Option<Switch> {
        let next = self.ready.pop_front()?;

        let mut from = None;
        if let Some(cur) = self.current.take() {
            self.account(cur);
            if let Some(p) = self.proc_mut(cur) {
                p.state = ProcessState::Ready;
                from = Some(p.pid);
                let prio = p.priority;
                self.ready.insert(cur, prio);
            }
        }

        let now = self.now;
        let to = match self.proc_mut(next) {
            Some(p) => {
                p.state = ProcessState::Running;
                p.last_scheduled = now;
                p.pid
            }
            None => return None,
        };

        self.current = Some(next);
        self.stats.context_switches += 1;

        #[cfg(feature = "trace_sched")]
        logging::logf(
            logging::Level::Trace,
            Subsystem::Process,
            format_args!("switch {:?} -> {}", from, to),
        );

        Some(Switch { from, to })
    }

    /// Called once per timer interrupt.
    pub fn on_timer_tick(&mut self) -> TickOutcome {
        self.now += 1;

        let Some((cur, pid, last, slice)) = self
            .current
            .and_then(|c| self.proc(c).map(|p| (c, p.pid, p.last_scheduled, p.time_slice)))
        else {
            return match self.schedule_next() {
                Some(sw) => TickOutcome::Dispatched(sw),
                None => TickOutcome::Idle,
            };
        };

        if self.now - last < slice {
            return TickOutcome::Continue;
        }

        match self.schedule_next() {
            Some(sw) => {
                self.stats.preemptions += 1;
                TickOutcome::Preempted(sw)
            }
            None => {
                self.account(cur);
                TickOutcome::SliceRenewed(pid)
            }
        }
    }

    /// Gives up the rest of the slice if anything else is ready.
    pub fn yield_current(&mut self) -> Option<Switch> {
        self.current?;
        self.schedule_next()
    }

    /// READY or RUNNING -> WAITING. Suspending the running process switches
    /// away from it.
    pub fn suspend(&mut self, pid: Pid) -> Result<Option<Switch>, ProcessError> {
        let slot = self.slot_of(pid).ok_or(ProcessError::NotFound(pid))?;
        let state = self.proc(slot).map(|p| p.state).ok_or(ProcessError::NotFound(pid))?;

        match state {
            ProcessState::Ready => {
                self.ready.remove(slot);
                if let Some(p) = self.proc_mut(slot) {
                    p.state = ProcessState::Waiting;
                }
                Ok(None)
            }
            ProcessState::Running => {
                self.account(slot);
                if let Some(p) = self.proc_mut(slot) {
                    p.state = ProcessState::Waiting;
                }
                self.current = None;
                Ok(self.schedule_next().map(|sw| Switch { from: Some(pid), ..sw }))
            }
            _ => Err(ProcessError::InvalidState { pid, state }),
        }
    }

    /// WAITING -> READY.
    pub fn resume(&mut self, pid: Pid) -> Result<(), ProcessError> {
        let slot = self.slot_of(pid).ok_or(ProcessError::NotFound(pid))?;
        let p = self.proc_mut(slot).ok_or(ProcessError::NotFound(pid))?;
        if p.state != ProcessState::Waiting {
            return Err(ProcessError::InvalidState { pid, state: p.state });
        }
        p.state = ProcessState::Ready;
        let prio = p.priority;
        self.ready.insert(slot, prio);
        Ok(())
    }

    // ─────────────────────────────────────────────
    // diagnostics
    // ─────────────────────────────────────────────

    pub fn check_invariants(&self) -> Result<(), &'static str> {
        let mut running = 0;
        for (i, slot) in self.slots.iter().enumerate() {
            let Some(p) = slot else {
                if self.ready.contains(i) {
                    return Err("empty slot in ready queue");
                }
                continue;
            };

            match p.state {
                ProcessState::Running => {
                    running += 1;
                    if self.current != Some(i) {
                        return Err("running process is not current");
                    }
                }
                ProcessState::Terminated => return Err("terminated process left in table"),
                _ => {}
            }
            if (p.state == ProcessState::Ready) != self.ready.contains(i) {
                return Err("ready queue membership does not match state");
            }

            if let Some(pp) = p.parent {
                match self.get(pp) {
                    Some(parent) if parent.children.contains(p.pid) => {}
                    _ => return Err("parent does not list child"),
                }
            }
            for c in p.children.iter() {
                match self.get(c) {
                    Some(child) if child.parent == Some(p.pid) => {}
                    _ => return Err("child does not point back to parent"),
                }
            }
        }
        if running > 1 {
            return Err("more than one process running");
        }
        if (running == 1) != self.current.is_some() {
            return Err("current does not match the running process");
        }

        let mut last = Priority::Critical;
        for i in self.ready.iter() {
            let Some(p) = self.proc(i) else {
                return Err("ready queue names an empty slot");
            };
            if p.priority < last {
                return Err("ready queue out of priority order");
            }
            last = p.priority;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_STACK: usize = 256;

    fn config() -> SchedConfig {
        SchedConfig {
            quotas: DEFAULT_QUOTAS,
            stack_size: TEST_STACK,
        }
    }

    fn arena() -> Vec<u8> {
        vec![0; 64 * 1024]
    }

    fn sound(s: &Scheduler) {
        if let Err(why) = s.check_invariants() {
            panic!("scheduler invariant violated: {why}");
        }
    }

    /// Dispatches, then blocks whatever runs until the queue is drained.
    fn run_order(s: &mut Scheduler) -> Vec<Pid> {
        let mut order = Vec::new();
        s.schedule_next();
        while let Some(pid) = s.current() {
            order.push(pid);
            s.suspend(pid).unwrap();
            sound(s);
        }
        order
    }

    #[test]
    fn distinct_priorities_dequeue_ascending() {
        let mut mem = arena();
        let mut heap = Heap::new(&mut mem).unwrap();
        let mut s = Scheduler::new(config());

        let p3 = s.create(&mut heap, "p3", 0, Priority::Background).unwrap();
        let p1 = s.create(&mut heap, "p1", 0, Priority::High).unwrap();
        let p2 = s.create(&mut heap, "p2", 0, Priority::Normal).unwrap();

        assert_eq!(run_order(&mut s), [p1, p2, p3]);
    }

    #[test]
    fn equal_priority_is_fifo() {
        let mut mem = arena();
        let mut heap = Heap::new(&mut mem).unwrap();
        let mut s = Scheduler::new(config());

        let a = s.create(&mut heap, "A", 0, Priority::Normal).unwrap();
        let b = s.create(&mut heap, "B", 0, Priority::Normal).unwrap();
        assert_eq!(s.schedule_next().map(|sw| sw.to), Some(a));
        s.suspend(a).unwrap();
        assert_eq!(s.current(), Some(b));
    }

    #[test]
    fn a1_b1_c0_runs_c_a_b() {
        let mut mem = arena();
        let mut heap = Heap::new(&mut mem).unwrap();
        let mut s = Scheduler::new(config());

        let a = s.create(&mut heap, "A", 0, Priority::High).unwrap();
        let b = s.create(&mut heap, "B", 0, Priority::High).unwrap();
        let c = s.create(&mut heap, "C", 0, Priority::Critical).unwrap();
        assert_eq!(s.ready_order().collect::<Vec<_>>(), [c, a, b]);

        assert_eq!(run_order(&mut s), [c, a, b]);
    }

    #[test]
    fn repeated_schedule_next_rotates_equal_priorities() {
        let mut mem = arena();
        let mut heap = Heap::new(&mut mem).unwrap();
        let mut s = Scheduler::new(config());

        let a = s.create(&mut heap, "A", 0, Priority::Normal).unwrap();
        let b = s.create(&mut heap, "B", 0, Priority::Normal).unwrap();

        assert_eq!(s.schedule_next(), Some(Switch { from: None, to: a }));
        assert_eq!(s.ready_order().collect::<Vec<_>>(), [b]);

        // the process switched away from rejoins the tail of its tier
        assert_eq!(s.schedule_next(), Some(Switch { from: Some(a), to: b }));
        assert_eq!(s.ready_order().collect::<Vec<_>>(), [a]);
        assert_eq!(s.get(a).unwrap().state, ProcessState::Ready);

        assert_eq!(s.schedule_next(), Some(Switch { from: Some(b), to: a }));
        assert_eq!(s.ready_order().collect::<Vec<_>>(), [b]);
        assert_eq!(s.stats().context_switches, 3);
        sound(&s);
    }

    #[test]
    fn preempted_on_exactly_the_quota_tick() {
        let mut mem = arena();
        let mut heap = Heap::new(&mut mem).unwrap();
        let mut s = Scheduler::new(config());

        let a = s.create(&mut heap, "A", 0, Priority::Background).unwrap();
        let b = s.create(&mut heap, "B", 0, Priority::Background).unwrap();
        s.schedule_next();
        assert_eq!(s.current(), Some(a));
        assert_eq!(s.get(a).unwrap().time_slice, 10);

        for tick in 1..10 {
            assert_eq!(s.on_timer_tick(), TickOutcome::Continue, "tick {tick}");
            assert_eq!(s.get(a).unwrap().state, ProcessState::Running);
        }
        assert_eq!(
            s.on_timer_tick(),
            TickOutcome::Preempted(Switch { from: Some(a), to: b })
        );
        assert_eq!(s.get(a).unwrap().state, ProcessState::Ready);
        assert_eq!(s.get(a).unwrap().cpu_time, 10);
        assert_eq!(s.ready_order().collect::<Vec<_>>(), [a]);
        sound(&s);
    }

    #[test]
    fn quota_with_empty_queue_renews_slice() {
        let mut mem = arena();
        let mut heap = Heap::new(&mut mem).unwrap();
        let mut s = Scheduler::new(config());

        let a = s.create(&mut heap, "A", 0, Priority::Background).unwrap();
        s.schedule_next();
        for _ in 1..10 {
            s.on_timer_tick();
        }
        assert_eq!(s.on_timer_tick(), TickOutcome::SliceRenewed(a));
        assert_eq!(s.get(a).unwrap().last_scheduled, 10);
        for _ in 1..10 {
            assert_eq!(s.on_timer_tick(), TickOutcome::Continue);
        }
        assert_eq!(s.on_timer_tick(), TickOutcome::SliceRenewed(a));
        assert_eq!(s.get(a).unwrap().cpu_time, 20);
    }

    #[test]
    fn tick_dispatches_when_nothing_runs() {
        let mut mem = arena();
        let mut heap = Heap::new(&mut mem).unwrap();
        let mut s = Scheduler::new(config());
        assert_eq!(s.on_timer_tick(), TickOutcome::Idle);

        let a = s.create(&mut heap, "A", 0, Priority::Normal).unwrap();
        assert_eq!(
            s.on_timer_tick(),
            TickOutcome::Dispatched(Switch { from: None, to: a })
        );
    }

    #[test]
    fn kernel_process_is_preempted_by_nothing_lower_but_reinserted() {
        let mut mem = arena();
        let mut heap = Heap::new(&mut mem).unwrap();
        let mut s = Scheduler::new(config());
        s.init_kernel_process().unwrap();
        assert_eq!(s.init_kernel_process(), Err(ProcessError::AlreadyInitialized));

        let shell = s.create(&mut heap, "shell", 0x1000, Priority::Normal).unwrap();
        assert_eq!(s.get(shell).unwrap().parent, Some(Pid::KERNEL));
        assert!(s.get(Pid::KERNEL).unwrap().children.contains(shell));

        // kernel yields: shell runs, kernel goes back to the queue head
        let sw = s.yield_current().unwrap();
        assert_eq!(sw, Switch { from: Some(Pid::KERNEL), to: shell });
        assert_eq!(s.ready_order().collect::<Vec<_>>(), [Pid::KERNEL]);

        // shell's slice ends: Critical kernel process wins again
        for _ in 0..25 {
            s.on_timer_tick();
        }
        assert_eq!(s.current(), Some(Pid::KERNEL));
        assert_eq!(s.get(shell).unwrap().cpu_time, 25);
        sound(&s);
    }

    #[test]
    fn suspend_resume_roundtrip() {
        let mut mem = arena();
        let mut heap = Heap::new(&mut mem).unwrap();
        let mut s = Scheduler::new(config());
        let a = s.create(&mut heap, "A", 0, Priority::Normal).unwrap();

        s.suspend(a).unwrap();
        assert_eq!(s.get(a).unwrap().state, ProcessState::Waiting);
        assert_eq!(s.ready_len(), 0);
        assert_eq!(
            s.suspend(a),
            Err(ProcessError::InvalidState { pid: a, state: ProcessState::Waiting })
        );

        s.resume(a).unwrap();
        assert_eq!(s.get(a).unwrap().state, ProcessState::Ready);
        assert!(s.resume(a).is_err());
        sound(&s);
    }

    #[test]
    fn suspending_running_process_switches_or_idles() {
        let mut mem = arena();
        let mut heap = Heap::new(&mut mem).unwrap();
        let mut s = Scheduler::new(config());
        let a = s.create(&mut heap, "A", 0, Priority::Normal).unwrap();
        s.schedule_next();
        for _ in 0..3 {
            s.on_timer_tick();
        }

        assert_eq!(s.suspend(a), Ok(None));
        assert_eq!(s.get(a).unwrap().cpu_time, 3);
        assert!(s.processes().all(|p| p.state != ProcessState::Running));
        sound(&s);

        s.resume(a).unwrap();
        assert!(matches!(s.on_timer_tick(), TickOutcome::Dispatched(_)));
        assert_eq!(s.current(), Some(a));
    }

    #[test]
    fn terminate_frees_stack_and_slot() {
        let mut mem = arena();
        let mut heap = Heap::new(&mut mem).unwrap();
        let mut s = Scheduler::new(config());
        s.init_kernel_process().unwrap();
        let free_before = heap.stats().free_bytes;

        let a = s.create(&mut heap, "A", 0, Priority::High).unwrap();
        assert!(heap.stats().free_bytes < free_before);

        let record = s.terminate(&mut heap, a).unwrap();
        assert_eq!(record.state, ProcessState::Terminated);
        assert!(s.get(a).is_none());
        assert!(matches!(s.terminate(&mut heap, a), Err(ProcessError::NotFound(p)) if p == a));
        assert_eq!(heap.stats().free_bytes, free_before);
        assert!(!s.get(Pid::KERNEL).unwrap().children.contains(a));
        assert_eq!(s.terminate(&mut heap, Pid::KERNEL).map(|p| p.pid), Err(ProcessError::KernelProcess));
        assert_eq!(s.stats().active, 1);
        sound(&s);
    }

    #[test]
    fn terminating_current_schedules_next_and_orphans_children() {
        let mut mem = arena();
        let mut heap = Heap::new(&mut mem).unwrap();
        let mut s = Scheduler::new(config());

        let parent = s.create(&mut heap, "parent", 0, Priority::High).unwrap();
        s.schedule_next();
        let child = s.create(&mut heap, "child", 0, Priority::Normal).unwrap();
        assert_eq!(s.get(child).unwrap().parent, Some(parent));

        s.terminate(&mut heap, parent).unwrap();
        assert_eq!(s.current(), Some(child));
        assert_eq!(s.get(child).unwrap().parent, None);
        sound(&s);
    }

    #[test]
    fn stack_exhaustion_is_reported() {
        let mut mem = vec![0u8; 1024];
        let mut heap = Heap::new(&mut mem).unwrap();
        let mut s = Scheduler::new(SchedConfig {
            quotas: DEFAULT_QUOTAS,
            stack_size: 2048,
        });
        assert!(matches!(
            s.create(&mut heap, "big", 0, Priority::Normal),
            Err(ProcessError::StackAllocation(HeapError::OutOfMemory { .. }))
        ));
        assert_eq!(s.stats().active, 0);
    }

    #[test]
    fn table_fills_up() {
        let mut mem = vec![0u8; 256 * 1024];
        let mut heap = Heap::new(&mut mem).unwrap();
        let mut s = Scheduler::new(config());
        for i in 1..MAX_PROCESSES {
            s.create(&mut heap, "worker", i as u64, Priority::Background).unwrap();
        }
        assert_eq!(
            s.create(&mut heap, "one too many", 0, Priority::Background),
            Err(ProcessError::TableFull)
        );
        sound(&s);
    }

    #[test]
    fn long_names_are_truncated() {
        let mut mem = arena();
        let mut heap = Heap::new(&mut mem).unwrap();
        let mut s = Scheduler::new(config());
        let long = "a-process-name-that-goes-on-well-past-thirty-two-bytes";
        let p = s.create(&mut heap, long, 0, Priority::Normal).unwrap();
        assert_eq!(s.get(p).unwrap().name(), &long[..PROCESS_NAME_LEN]);
    }
}
