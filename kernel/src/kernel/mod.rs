// kernel/src/kernel/mod.rs
//
// KernelState: the one owner of every kernel-resident manager.
//
// - heap:       block allocator over the static arena
// - dispatcher: 8259 pair, interrupt statistics, keyboard input queue
// - scheduler:  process table + ready queue
// - events:     bounded log of abstract scheduling / memory events
//
// Init chain (bootstrap): memory -> interrupts -> processes. Each step
// logs; any failure leaves the status at Initializing.
//
// [Invariants] (check_invariants, run from the timer path)
// 1. Heap block list is address ordered, gap free, and sums to the arena.
// 2. Scheduler invariants hold (one RUNNING, queue == READY set, sorted).
// 3. Every live process other than the kernel process owns a heap block
//    for its stack.
//
// Doesn't:
// - touch hardware directly; ports come in through PortBus
// - recover from faults. A fault is recorded, status goes to Panic, and
//   the caller takes the panic path.

#[cfg(target_os = "none")]
pub mod entry;
pub mod state_ref;

use core::sync::atomic::{AtomicU8, Ordering};

use crate::config::KernelConfig;
use crate::error::KernelError;
use crate::interrupts::{Dispatch, Dispatcher, FaultFrame, FaultKind, PortBus};
use crate::logging::{self, Subsystem};
use crate::mem::{CorruptionKind, Heap, HeapError, HeapPtr, HeapStats};
use crate::sched::{Pid, Priority, Process, ProcessState, Scheduler, Switch, TickOutcome};

pub const EVENT_LOG_CAP: usize = 256;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum KernelStatus {
    Initializing = 0,
    Running = 1,
    ShuttingDown = 2,
    Halted = 3,
    Panic = 4,
}

impl KernelStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            KernelStatus::Initializing => "initializing",
            KernelStatus::Running => "running",
            KernelStatus::ShuttingDown => "shutting down",
            KernelStatus::Halted => "halted",
            KernelStatus::Panic => "panic",
        }
    }

    fn from_u8(v: u8) -> KernelStatus {
        match v {
            1 => KernelStatus::Running,
            2 => KernelStatus::ShuttingDown,
            3 => KernelStatus::Halted,
            4 => KernelStatus::Panic,
            _ => KernelStatus::Initializing,
        }
    }
}

// Lock-free mirror of the status, readable from the panic path.
static STATUS: AtomicU8 = AtomicU8::new(KernelStatus::Initializing as u8);

pub fn status() -> KernelStatus {
    KernelStatus::from_u8(STATUS.load(Ordering::Acquire))
}

pub fn mark_panicked() {
    STATUS.store(KernelStatus::Panic as u8, Ordering::Release);
}

//
// ──────────────────────────────────────────────
// LogEvent
// ──────────────────────────────────────────────
//

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogEvent {
    StatusChanged(KernelStatus),
    ProcessCreated(Pid, Priority),
    ProcessTerminated(Pid),
    ProcessStateChanged(Pid, ProcessState),
    TaskSwitched { from: Option<Pid>, to: Pid },
    QuantumExpired(Pid, u64),
    SliceRenewed(Pid),
    MemAllocated { offset: usize, size: usize },
    MemReleased { offset: usize },
    AllocationFailed(usize),
    HeapCorruption(CorruptionKind),
    KeyPressed(char),
    SpuriousInterrupt(u8),
    FaultRaised(FaultKind),
    InvariantViolation(&'static str),
}

/// Fixed log; once full, further events are only counted.
pub struct EventLog {
    events: [Option<LogEvent>; EVENT_LOG_CAP],
    len: usize,
    dropped: u64,
}

impl EventLog {
    pub const fn new() -> Self {
        EventLog {
            events: [None; EVENT_LOG_CAP],
            len: 0,
            dropped: 0,
        }
    }

    pub fn push(&mut self, ev: LogEvent) {
        if self.len < EVENT_LOG_CAP {
            self.events[self.len] = Some(ev);
            self.len += 1;
        } else {
            self.dropped += 1;
        }
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

    pub fn iter(&self) -> impl Iterator<Item = LogEvent> + '_ {
        self.events[..self.len].iter().filter_map(|e| *e)
    }

    pub fn clear(&mut self) {
        self.events = [None; EVENT_LOG_CAP];
        self.len = 0;
        self.dropped = 0;
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

//
// ──────────────────────────────────────────────
// KernelState
// ──────────────────────────────────────────────
//

pub struct KernelState {
    config: KernelConfig,
    status: KernelStatus,
    heap: Heap<'static>,
    dispatcher: Dispatcher,
    scheduler: Scheduler,
    events: EventLog,
    ticks_since_check: u64,
    invariant_violations: u64,
    /// Tick of the most recent periodic check that failed.
    last_failed_check: Option<u64>,
}

impl KernelState {
    /// Memory manager init: the heap takes `config.heap_size` bytes of
    /// `arena` as one free block.
    pub fn new(config: KernelConfig, arena: &'static mut [u8]) -> Result<Self, KernelError> {
        let size = config.heap_size.min(arena.len());
        let heap = Heap::new(&mut arena[..size])?;
        logging::info_u64(Subsystem::Memory, "heap initialized, bytes", heap.arena_len() as u64);

        Ok(KernelState {
            config,
            status: KernelStatus::Initializing,
            heap,
            dispatcher: Dispatcher::new(config.pics),
            scheduler: Scheduler::new(config.sched),
            events: EventLog::new(),
            ticks_since_check: 0,
            invariant_violations: 0,
            last_failed_check: None,
        })
    }

    /// Interrupt controllers, then the kernel process. Interrupts stay off
    /// at the CPU until the caller enables them.
    pub fn bootstrap(&mut self, bus: &mut impl PortBus) -> Result<(), KernelError> {
        if self.status != KernelStatus::Initializing {
            return Err(KernelError::NotRunning);
        }
        logging::info(Subsystem::Kernel, "KernelState::bootstrap()");

        self.dispatcher.init(bus)?;
        logging::info(Subsystem::Kernel, "interrupt dispatcher initialized");

        let pid = self.scheduler.init_kernel_process()?;
        self.push_event(LogEvent::ProcessCreated(pid, Priority::Critical));
        logging::info(Subsystem::Kernel, "process manager initialized");

        self.set_status(KernelStatus::Running);
        Ok(())
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn status(&self) -> KernelStatus {
        self.status
    }

    pub fn heap(&self) -> &Heap<'static> {
        &self.heap
    }

    pub fn heap_stats(&self) -> HeapStats {
        self.heap.stats()
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn invariant_violations(&self) -> u64 {
        self.invariant_violations
    }

    pub fn last_failed_check(&self) -> Option<u64> {
        self.last_failed_check
    }

    fn set_status(&mut self, status: KernelStatus) {
        if self.status == status {
            return;
        }
        self.status = status;
        STATUS.store(status as u8, Ordering::Release);
        self.push_event(LogEvent::StatusChanged(status));
        logging::logf(
            logging::Level::Info,
            Subsystem::Kernel,
            format_args!("kernel status: {}", status.as_str()),
        );
    }

    fn push_event(&mut self, ev: LogEvent) {
        self.events.push(ev);
    }

    fn ensure_running(&self) -> Result<(), KernelError> {
        if self.status == KernelStatus::Running {
            Ok(())
        } else {
            Err(KernelError::NotRunning)
        }
    }

    fn record_switch(&mut self, sw: Switch) {
        self.push_event(LogEvent::TaskSwitched { from: sw.from, to: sw.to });
    }

    //
    // memory: the allocate/release pair collaborators use
    //

    pub fn allocate(&mut self, size: usize) -> Result<HeapPtr, KernelError> {
        match self.heap.allocate(size) {
            Ok(ptr) => {
                self.push_event(LogEvent::MemAllocated {
                    offset: ptr.offset(),
                    size: self.heap.size_of(ptr).unwrap_or(size),
                });
                Ok(ptr)
            }
            Err(e) => {
                self.push_event(LogEvent::AllocationFailed(size));
                Err(e.into())
            }
        }
    }

    /// Corruption is counted and logged by the heap; the release is
    /// dropped and the kernel carries on.
    pub fn release(&mut self, ptr: HeapPtr) -> Result<(), KernelError> {
        match self.heap.release(ptr) {
            Ok(()) => {
                self.push_event(LogEvent::MemReleased { offset: ptr.offset() });
                Ok(())
            }
            Err(e) => {
                if let HeapError::Corruption(kind) = e {
                    self.push_event(LogEvent::HeapCorruption(kind));
                }
                Err(e.into())
            }
        }
    }

    pub fn payload_mut(&mut self, ptr: HeapPtr) -> Option<&mut [u8]> {
        self.heap.payload_mut(ptr)
    }

    //
    // processes
    //

    pub fn create_process(
        &mut self,
        name: &str,
        entry_point: u64,
        priority: Priority,
    ) -> Result<Pid, KernelError> {
        self.ensure_running()?;
        let pid = self.scheduler.create(&mut self.heap, name, entry_point, priority)?;
        self.push_event(LogEvent::ProcessCreated(pid, priority));
        Ok(pid)
    }

    pub fn terminate_process(&mut self, pid: Pid) -> Result<Process, KernelError> {
        let before = self.scheduler.current();
        let record = self.scheduler.terminate(&mut self.heap, pid)?;
        self.push_event(LogEvent::ProcessTerminated(pid));
        if before == Some(pid) {
            if let Some(to) = self.scheduler.current() {
                self.record_switch(Switch { from: Some(pid), to });
            }
        }
        Ok(record)
    }

    pub fn suspend(&mut self, pid: Pid) -> Result<(), KernelError> {
        let sw = self.scheduler.suspend(pid)?;
        self.push_event(LogEvent::ProcessStateChanged(pid, ProcessState::Waiting));
        if let Some(sw) = sw {
            self.record_switch(sw);
        }
        Ok(())
    }

    pub fn resume(&mut self, pid: Pid) -> Result<(), KernelError> {
        self.scheduler.resume(pid)?;
        self.push_event(LogEvent::ProcessStateChanged(pid, ProcessState::Ready));
        Ok(())
    }

    pub fn yield_now(&mut self) -> Option<Switch> {
        let sw = self.scheduler.yield_current()?;
        self.record_switch(sw);
        Some(sw)
    }

    //
    // interrupts
    //

    /// Entry from every vector stub. A Fault result means the caller must
    /// take the panic path.
    pub fn handle_interrupt(
        &mut self,
        bus: &mut impl PortBus,
        vector: u8,
        frame: FaultFrame,
    ) -> Dispatch {
        let outcome = self.dispatcher.dispatch(bus, vector, frame, &mut self.scheduler);
        match outcome {
            Dispatch::Timer(tick) => self.on_tick(tick),
            Dispatch::Key(Some(c)) => self.push_event(LogEvent::KeyPressed(c)),
            Dispatch::Spurious => self.push_event(LogEvent::SpuriousInterrupt(vector)),
            Dispatch::Fault(report) => {
                self.push_event(LogEvent::FaultRaised(report.kind));
                self.set_status(KernelStatus::Panic);
            }
            Dispatch::Key(None) | Dispatch::Hardware(_) => {}
        }
        outcome
    }

    fn on_tick(&mut self, tick: TickOutcome) {
        match tick {
            TickOutcome::Preempted(sw) => {
                if let Some(from) = sw.from {
                    let used = self.scheduler.get(from).map(|p| p.time_slice).unwrap_or(0);
                    self.push_event(LogEvent::QuantumExpired(from, used));
                }
                self.record_switch(sw);
            }
            TickOutcome::Dispatched(sw) => self.record_switch(sw),
            TickOutcome::SliceRenewed(pid) => self.push_event(LogEvent::SliceRenewed(pid)),
            TickOutcome::Idle | TickOutcome::Continue => {}
        }

        let interval = self.config.self_check_interval;
        if interval == 0 {
            return;
        }
        self.ticks_since_check += 1;
        if self.ticks_since_check < interval {
            return;
        }
        self.ticks_since_check = 0;

        match self.check_invariants() {
            Ok(()) => {}
            Err(e) => {
                let now = self.scheduler.now();
                self.last_failed_check = Some(now);
                logging::logf(
                    logging::Level::Warn,
                    Subsystem::Kernel,
                    format_args!("periodic self-check failed at tick {}: {}", now, e),
                );
            }
        }
    }

    /// Next character typed at the keyboard.
    pub fn read_input(&mut self) -> Option<char> {
        self.dispatcher.read_input()
    }

    //
    // diagnostics
    //

    pub fn check_invariants(&mut self) -> Result<(), KernelError> {
        let result = self
            .heap
            .check_invariants()
            .and_then(|_| self.scheduler.check_invariants())
            .and_then(|_| self.check_stack_ownership());

        match result {
            Ok(()) => Ok(()),
            Err(why) => {
                self.invariant_violations += 1;
                logging::error(Subsystem::Kernel, "INVARIANT VIOLATION");
                logging::error(Subsystem::Kernel, why);
                self.push_event(LogEvent::InvariantViolation(why));
                Err(KernelError::Invariant(why))
            }
        }
    }

    fn check_stack_ownership(&self) -> Result<(), &'static str> {
        for p in self.scheduler.processes() {
            match (p.pid, p.stack) {
                (Pid::KERNEL, _) => {}
                (_, None) => return Err("process has no stack"),
                (_, Some(stack)) => match self.heap.size_of(stack.handle) {
                    Some(n) if n >= stack.size => {}
                    _ => return Err("process stack is not a live heap block"),
                },
            }
        }
        Ok(())
    }

    /// Stops every process except the kernel process and halts.
    pub fn shutdown(&mut self) {
        self.set_status(KernelStatus::ShuttingDown);

        let mut victims = [Pid(0); crate::sched::MAX_PROCESSES];
        let mut n = 0;
        for p in self.scheduler.processes() {
            if p.pid != Pid::KERNEL {
                victims[n] = p.pid;
                n += 1;
            }
        }
        for &pid in &victims[..n] {
            if let Err(e) = self.terminate_process(pid) {
                logging::logf(
                    logging::Level::Warn,
                    Subsystem::Kernel,
                    format_args!("shutdown: {}", e),
                );
            }
        }

        self.set_status(KernelStatus::Halted);
    }

    pub fn should_halt(&self) -> bool {
        matches!(self.status, KernelStatus::Halted | KernelStatus::Panic)
    }

    pub fn dump_events(&self) {
        logging::info(Subsystem::Kernel, "=== KernelState Event Log Dump ===");
        for ev in self.events.iter() {
            log_event(ev);
        }
        if self.events.dropped() > 0 {
            logging::info_u64(Subsystem::Kernel, " events dropped", self.events.dropped());
        }
        logging::info(Subsystem::Kernel, "=== End of Event Log ===");
        logging::info_u64(Subsystem::Kernel, "  invariant_violations", self.invariant_violations);
        if let Some(tick) = self.last_failed_check {
            logging::info_u64(Subsystem::Kernel, "  last_failed_check_tick", tick);
        }

        let ls = logging::stats();
        logging::info(Subsystem::Kernel, "=== Log ===");
        logging::info_u64(Subsystem::Kernel, "  accepted", ls.accepted);
        logging::info_u64(Subsystem::Kernel, "  filtered", ls.filtered);
        logging::info_u64(Subsystem::Kernel, "  warnings", ls.warnings);
        logging::info_u64(Subsystem::Kernel, "  errors", ls.errors);

        let hs = self.heap.stats();
        logging::info(Subsystem::Memory, "=== Heap ===");
        logging::info_u64(Subsystem::Memory, "  used_bytes", hs.used_bytes as u64);
        logging::info_u64(Subsystem::Memory, "  free_bytes", hs.free_bytes as u64);
        logging::info_u64(Subsystem::Memory, "  allocated_blocks", hs.allocated_blocks as u64);
        logging::info_u64(Subsystem::Memory, "  free_blocks", hs.free_blocks as u64);
        logging::info_u64(Subsystem::Memory, "  corruption_count", hs.corruption_count);

        let ss = self.scheduler.stats();
        logging::info(Subsystem::Process, "=== Processes ===");
        logging::info_u64(Subsystem::Process, "  active", ss.active as u64);
        logging::info_u64(Subsystem::Process, "  context_switches", ss.context_switches);
        logging::info_u64(Subsystem::Process, "  total_cpu_time", ss.total_cpu_time);
        for p in self.scheduler.processes() {
            logging::logf(
                logging::Level::Info,
                Subsystem::Process,
                format_args!(
                    "  {} '{}' {} prio={} cpu={}",
                    p.pid,
                    p.name(),
                    p.state.as_str(),
                    p.priority.value(),
                    p.cpu_time
                ),
            );
        }

        let is = self.dispatcher.stats();
        logging::info(Subsystem::Interrupts, "=== Interrupts ===");
        logging::info_u64(Subsystem::Interrupts, "  total", is.total);
        logging::info_u64(Subsystem::Interrupts, "  exceptions", is.exceptions);
        logging::info_u64(Subsystem::Interrupts, "  hardware", is.hardware);
        logging::info_u64(Subsystem::Interrupts, "  spurious", is.spurious);
        logging::info_u64(Subsystem::Interrupts, "  timer_ticks", is.timer_ticks);
        logging::info_u64(Subsystem::Interrupts, "  keyboard", is.keyboard);
    }
}

// ─────────────────────────────────────────────
// LogEvent -> logger
// ─────────────────────────────────────────────

fn log_event(ev: LogEvent) {
    let k = Subsystem::Kernel;
    match ev {
        LogEvent::StatusChanged(s) => {
            logging::info(k, "EVENT: StatusChanged");
            logging::info(k, s.as_str());
        }
        LogEvent::ProcessCreated(pid, prio) => {
            logging::info(k, "EVENT: ProcessCreated");
            logging::info_u64(k, " pid", pid.0 as u64);
            logging::info_u64(k, " priority", prio.value() as u64);
        }
        LogEvent::ProcessTerminated(pid) => {
            logging::info(k, "EVENT: ProcessTerminated");
            logging::info_u64(k, " pid", pid.0 as u64);
        }
        LogEvent::ProcessStateChanged(pid, state) => {
            logging::info(k, "EVENT: ProcessStateChanged");
            logging::info_u64(k, " pid", pid.0 as u64);
            logging::info(k, state.as_str());
        }
        LogEvent::TaskSwitched { from, to } => {
            logging::info(k, "EVENT: TaskSwitched");
            match from {
                Some(f) => logging::info_u64(k, " from", f.0 as u64),
                None => logging::info(k, " from idle"),
            }
            logging::info_u64(k, " to", to.0 as u64);
        }
        LogEvent::QuantumExpired(pid, quota) => {
            logging::info(k, "EVENT: QuantumExpired");
            logging::info_u64(k, " pid", pid.0 as u64);
            logging::info_u64(k, " quota", quota);
        }
        LogEvent::SliceRenewed(pid) => {
            logging::info(k, "EVENT: SliceRenewed");
            logging::info_u64(k, " pid", pid.0 as u64);
        }
        LogEvent::MemAllocated { offset, size } => {
            logging::info(k, "EVENT: MemAllocated");
            logging::info_u64(k, " offset", offset as u64);
            logging::info_u64(k, " size", size as u64);
        }
        LogEvent::MemReleased { offset } => {
            logging::info(k, "EVENT: MemReleased");
            logging::info_u64(k, " offset", offset as u64);
        }
        LogEvent::AllocationFailed(size) => {
            logging::info(k, "EVENT: AllocationFailed");
            logging::info_u64(k, " size", size as u64);
        }
        LogEvent::HeapCorruption(kind) => {
            logging::info(k, "EVENT: HeapCorruption");
            logging::info(k, kind.as_str());
        }
        LogEvent::KeyPressed(c) => {
            logging::info_u64(k, "EVENT: KeyPressed", c as u64);
        }
        LogEvent::SpuriousInterrupt(v) => {
            logging::info_u64(k, "EVENT: SpuriousInterrupt", v as u64);
        }
        LogEvent::FaultRaised(kind) => {
            logging::info(k, "EVENT: FaultRaised");
            logging::info(k, kind.description());
        }
        LogEvent::InvariantViolation(why) => {
            logging::info(k, "EVENT: InvariantViolation");
            logging::info(k, why);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interrupts::pic::MASTER_COMMAND;
    use crate::interrupts::port::testing::RecordingBus;
    use crate::sched::SchedConfig;

    fn test_config() -> KernelConfig {
        KernelConfig {
            heap_size: 64 * 1024,
            sched: SchedConfig {
                stack_size: 1024,
                ..SchedConfig::DEFAULT
            },
            self_check_interval: 1,
            ..KernelConfig::DEFAULT
        }
    }

    fn leaked_arena(len: usize) -> &'static mut [u8] {
        Box::leak(vec![0u8; len].into_boxed_slice())
    }

    fn running_kernel() -> (KernelState, RecordingBus) {
        let mut bus = RecordingBus::new();
        let mut ks = KernelState::new(test_config(), leaked_arena(64 * 1024)).unwrap();
        ks.bootstrap(&mut bus).unwrap();
        bus.clear();
        (ks, bus)
    }

    fn timer(ks: &mut KernelState, bus: &mut RecordingBus, n: usize) {
        for _ in 0..n {
            ks.handle_interrupt(bus, 32, FaultFrame::default());
        }
    }

    #[test]
    fn bootstrap_runs_the_init_chain_once() {
        let mut bus = RecordingBus::new();
        let mut ks = KernelState::new(test_config(), leaked_arena(64 * 1024)).unwrap();
        assert_eq!(ks.status(), KernelStatus::Initializing);
        assert_eq!(ks.create_process("early", 0, Priority::Normal), Err(KernelError::NotRunning));

        ks.bootstrap(&mut bus).unwrap();
        assert_eq!(ks.status(), KernelStatus::Running);
        assert!(ks.dispatcher().is_initialized());
        assert_eq!(ks.scheduler().current(), Some(Pid::KERNEL));
        assert_eq!(bus.writes_to(MASTER_COMMAND), [0x11]);
        assert_eq!(ks.bootstrap(&mut bus), Err(KernelError::NotRunning));
    }

    #[test]
    fn heap_size_is_capped_by_the_arena() {
        let ks = KernelState::new(
            KernelConfig { heap_size: 1 << 20, ..test_config() },
            leaked_arena(4096),
        )
        .unwrap();
        assert_eq!(ks.heap().arena_len(), 4096);
        assert!(matches!(
            KernelState::new(test_config(), leaked_arena(8)),
            Err(KernelError::Heap(HeapError::InvalidArena))
        ));
    }

    #[test]
    fn allocate_release_pair_records_events() {
        let (mut ks, _) = running_kernel();
        let p = ks.allocate(100).unwrap();
        ks.release(p).unwrap();

        let err = ks.release(p).unwrap_err();
        assert_eq!(err, KernelError::Heap(HeapError::Corruption(CorruptionKind::DoubleFree)));
        assert_eq!(err.severity(), crate::error::Severity::Degraded);
        assert_eq!(ks.heap_stats().corruption_count, 1);

        assert!(matches!(ks.allocate(1 << 20), Err(KernelError::Heap(HeapError::OutOfMemory { .. }))));

        let evs: Vec<LogEvent> = ks.events().iter().collect();
        assert!(evs.contains(&LogEvent::MemAllocated { offset: p.offset(), size: 104 }));
        assert!(evs.contains(&LogEvent::MemReleased { offset: p.offset() }));
        assert!(evs.contains(&LogEvent::HeapCorruption(CorruptionKind::DoubleFree)));
        assert!(evs.contains(&LogEvent::AllocationFailed(1 << 20)));
        assert!(ks.check_invariants().is_ok());
    }

    #[test]
    fn timer_interrupts_drive_scheduling_and_self_check() {
        let (mut ks, mut bus) = running_kernel();
        let shell = ks.create_process("shell", 0x1000, Priority::Normal).unwrap();
        assert_eq!(ks.yield_now().map(|sw| sw.to), Some(shell));

        // Normal quota is 25 ticks; the kernel process takes over again
        timer(&mut ks, &mut bus, 25);
        assert_eq!(ks.scheduler().current(), Some(Pid::KERNEL));
        assert!(ks
            .events()
            .iter()
            .any(|e| e == LogEvent::QuantumExpired(shell, 25)));
        assert_eq!(ks.invariant_violations(), 0);
        assert_eq!(ks.dispatcher().stats().timer_ticks, 25);
        assert_eq!(bus.writes_to(MASTER_COMMAND).len(), 25);
    }

    #[test]
    fn periodic_self_check_reports_heap_damage() {
        let mut bus = RecordingBus::new();
        let config = KernelConfig {
            self_check_interval: 4,
            ..test_config()
        };
        let mut ks = KernelState::new(config, leaked_arena(64 * 1024)).unwrap();
        ks.bootstrap(&mut bus).unwrap();

        timer(&mut ks, &mut bus, 4);
        assert_eq!(ks.invariant_violations(), 0);
        assert_eq!(ks.last_failed_check(), None);

        // overwrite the tag of a live block's header
        let p = ks.allocate(64).unwrap();
        let tag_at = p.offset() - 16 + 4;
        ks.heap.arena_bytes_mut()[tag_at..tag_at + 4].copy_from_slice(&0x1234_5678u32.to_le_bytes());

        // not due yet
        timer(&mut ks, &mut bus, 3);
        assert_eq!(ks.invariant_violations(), 0);

        timer(&mut ks, &mut bus, 1);
        assert_eq!(ks.invariant_violations(), 1);
        assert_eq!(ks.last_failed_check(), Some(8));
        assert!(ks
            .events()
            .iter()
            .any(|e| matches!(e, LogEvent::InvariantViolation(_))));
        assert_eq!(ks.status(), KernelStatus::Running);
    }

    #[test]
    fn keyboard_input_reaches_read_input() {
        let (mut ks, mut bus) = running_kernel();
        bus.queue_read(0x60, 0x1E);
        ks.handle_interrupt(&mut bus, 33, FaultFrame::default());
        assert_eq!(ks.read_input(), Some('a'));
        assert_eq!(ks.read_input(), None);
        assert!(ks.events().iter().any(|e| e == LogEvent::KeyPressed('a')));
    }

    #[test]
    fn fault_moves_status_to_panic() {
        let (mut ks, mut bus) = running_kernel();
        let out = ks.handle_interrupt(&mut bus, 13, FaultFrame { instruction_pointer: 0x1000, error_code: Some(0) });
        assert!(matches!(out, Dispatch::Fault(r) if r.kind == FaultKind::GeneralProtection));
        assert_eq!(ks.status(), KernelStatus::Panic);
        assert!(ks.should_halt());
        assert!(bus.writes.is_empty());
    }

    #[test]
    fn process_lifecycle_through_kernel_state() {
        let (mut ks, _) = running_kernel();
        let used_before = ks.heap_stats().used_bytes;
        let a = ks.create_process("a", 0, Priority::High).unwrap();
        let b = ks.create_process("b", 0, Priority::Background).unwrap();

        ks.suspend(b).unwrap();
        ks.resume(b).unwrap();
        let record = ks.terminate_process(a).unwrap();
        assert_eq!(record.state, ProcessState::Terminated);
        assert!(ks.terminate_process(a).is_err());

        ks.shutdown();
        assert_eq!(ks.status(), KernelStatus::Halted);
        assert!(ks.scheduler().get(b).is_none());
        assert_eq!(ks.heap_stats().used_bytes, used_before);
        assert!(ks.check_invariants().is_ok());
    }

    #[test]
    fn event_log_is_bounded() {
        let mut log = EventLog::new();
        for i in 0..EVENT_LOG_CAP + 5 {
            log.push(LogEvent::SpuriousInterrupt(i as u8));
        }
        assert_eq!(log.len(), EVENT_LOG_CAP);
        assert_eq!(log.dropped(), 5);
        assert_eq!(log.iter().next(), Some(LogEvent::SpuriousInterrupt(0)));
        log.clear();
        assert!(log.is_empty());
    }
}
