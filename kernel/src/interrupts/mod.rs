// kernel/src/interrupts/mod.rs
//
// Interrupt dispatcher.
//
// Role:
// - own the 8259 pair, the keyboard decoder and the shell input queue
// - classify a delivered vector and route it:
//     fault            -> FaultReport for the panic path (no recovery)
//     timer            -> Scheduler::on_timer_tick
//     keyboard         -> scancode from port 0x60 -> InputQueue
//     other PIC line   -> counted, acknowledged; IRQ 7/15 with no
//                         in-service bit is spurious instead
//     anything else    -> spurious: counted, both chips acknowledged
//
// [Invariants]
// - every non-spurious hardware dispatch ends with EOI; the EOI write is the
//   last port access of the dispatch
// - faults never touch the PICs or the scheduler
//
// idt builds the descriptor table; arch::interrupts loads it and supplies
// the hardware entry path.

pub mod idt;
pub mod keyboard;
pub mod pic;
pub mod port;
pub mod vectors;

use core::fmt;

use crate::logging::{self, Subsystem};
use crate::sched::{Scheduler, TickOutcome};

pub use keyboard::{InputQueue, ScancodeDecoder};
pub use pic::{ChainedPics, PicConfig};
pub use port::PortBus;
pub use idt::VectorSink;
pub use vectors::{FaultKind, VectorKind};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchError {
    NotInitialized,
    AlreadyInitialized,
    InvalidIrq(u8),
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::NotInitialized => write!(f, "interrupt controllers not initialized"),
            DispatchError::AlreadyInitialized => write!(f, "interrupt controllers already initialized"),
            DispatchError::InvalidIrq(irq) => write!(f, "no such IRQ line: {}", irq),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InterruptStats {
    pub total: u64,
    pub exceptions: u64,
    pub hardware: u64,
    pub spurious: u64,
    pub timer_ticks: u64,
    pub keyboard: u64,
}

/// What the CPU pushed for a fault.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FaultFrame {
    pub instruction_pointer: u64,
    pub error_code: Option<u64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FaultReport {
    pub kind: FaultKind,
    pub frame: FaultFrame,
}

impl FaultReport {
    pub fn description(&self) -> &'static str {
        self.kind.description()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dispatch {
    Fault(FaultReport),
    Timer(TickOutcome),
    Key(Option<char>),
    /// Unmasked PIC line with no driver.
    Hardware(u8),
    Spurious,
}

pub struct Dispatcher {
    pics: ChainedPics,
    initialized: bool,
    stats: InterruptStats,
    decoder: ScancodeDecoder,
    input: InputQueue,
}

impl Dispatcher {
    pub const fn new(config: PicConfig) -> Self {
        Dispatcher {
            pics: ChainedPics::new(config),
            initialized: false,
            stats: InterruptStats {
                total: 0,
                exceptions: 0,
                hardware: 0,
                spurious: 0,
                timer_ticks: 0,
                keyboard: 0,
            },
            decoder: ScancodeDecoder::new(),
            input: InputQueue::new(),
        }
    }

    /// Remaps the controllers and applies the configured masks.
    pub fn init(&mut self, bus: &mut impl PortBus) -> Result<(), DispatchError> {
        if self.initialized {
            return Err(DispatchError::AlreadyInitialized);
        }
        self.pics.remap(bus);
        self.initialized = true;

        let (master, slave) = self.pics.masks();
        logging::logf(
            logging::Level::Info,
            Subsystem::Interrupts,
            format_args!("8259 remapped, masks {:#04x}/{:#04x}", master, slave),
        );
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn stats(&self) -> InterruptStats {
        self.stats
    }

    pub fn pics(&self) -> &ChainedPics {
        &self.pics
    }

    pub fn set_irq_masked(
        &mut self,
        bus: &mut impl PortBus,
        irq: u8,
        masked: bool,
    ) -> Result<(), DispatchError> {
        if !self.initialized {
            return Err(DispatchError::NotInitialized);
        }
        if irq >= 16 {
            return Err(DispatchError::InvalidIrq(irq));
        }
        self.pics.set_masked(bus, irq, masked);
        Ok(())
    }

    /// Next character typed, oldest first.
    pub fn read_input(&mut self) -> Option<char> {
        self.input.pop()
    }

    pub fn input(&self) -> &InputQueue {
        &self.input
    }

    /// Single entry for every vector.
    pub fn dispatch(
        &mut self,
        bus: &mut impl PortBus,
        vector: u8,
        frame: FaultFrame,
        sched: &mut Scheduler,
    ) -> Dispatch {
        self.stats.total += 1;

        match VectorKind::of(vector) {
            VectorKind::Fault(kind) => {
                self.stats.exceptions += 1;
                Dispatch::Fault(FaultReport { kind, frame })
            }
            VectorKind::Timer => {
                self.stats.hardware += 1;
                self.stats.timer_ticks += 1;
                let outcome = sched.on_timer_tick();
                self.pics.end_of_interrupt(bus, vector);
                Dispatch::Timer(outcome)
            }
            VectorKind::Keyboard => {
                self.stats.hardware += 1;
                self.stats.keyboard += 1;
                let scancode = bus.read_u8(keyboard::DATA_PORT);
                let key = self.decoder.decode(scancode);
                if let Some(c) = key {
                    self.input.push(c);
                }
                self.pics.end_of_interrupt(bus, vector);
                Dispatch::Key(key)
            }
            VectorKind::Unassigned => match self.pics.irq_of(vector) {
                Some(irq) => {
                    if self.pics.acknowledge(bus, vector) {
                        self.stats.hardware += 1;
                        Dispatch::Hardware(irq)
                    } else {
                        self.stats.spurious += 1;
                        logging::logf(
                            logging::Level::Debug,
                            Subsystem::Interrupts,
                            format_args!("spurious IRQ {}", irq),
                        );
                        Dispatch::Spurious
                    }
                }
                None => {
                    self.stats.spurious += 1;
                    self.pics.end_of_interrupt_all(bus);
                    Dispatch::Spurious
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::pic::{MASTER_COMMAND, SLAVE_COMMAND};
    use super::port::testing::RecordingBus;
    use super::*;
    use crate::mem::Heap;
    use crate::panic::{PanicEntry, PanicLatch};
    use crate::sched::{Priority, SchedConfig};

    const EOI: u8 = 0x20;

    fn ready_dispatcher(bus: &mut RecordingBus) -> Dispatcher {
        let mut d = Dispatcher::new(PicConfig::DEFAULT);
        d.init(bus).unwrap();
        bus.clear();
        d
    }

    fn frame() -> FaultFrame {
        FaultFrame::default()
    }

    #[test]
    fn init_once() {
        let mut bus = RecordingBus::new();
        let mut d = Dispatcher::new(PicConfig::DEFAULT);
        assert_eq!(
            d.set_irq_masked(&mut bus, 3, false),
            Err(DispatchError::NotInitialized)
        );
        d.init(&mut bus).unwrap();
        assert_eq!(d.init(&mut bus), Err(DispatchError::AlreadyInitialized));
        assert_eq!(
            d.set_irq_masked(&mut bus, 16, false),
            Err(DispatchError::InvalidIrq(16))
        );
    }

    #[test]
    fn timer_ticks_scheduler_then_acknowledges() {
        let mut bus = RecordingBus::new();
        let mut d = ready_dispatcher(&mut bus);
        let mut sched = Scheduler::new(SchedConfig::DEFAULT);

        let out = d.dispatch(&mut bus, 32, frame(), &mut sched);
        assert_eq!(out, Dispatch::Timer(TickOutcome::Idle));
        assert_eq!(sched.now(), 1);
        assert_eq!(bus.writes.last(), Some(&(MASTER_COMMAND, EOI)));
        assert!(bus.writes_to(SLAVE_COMMAND).is_empty());
        assert_eq!(d.stats().timer_ticks, 1);
    }

    #[test]
    fn timer_drives_preemption() {
        let mut mem = vec![0u8; 16 * 1024];
        let mut heap = Heap::new(&mut mem).unwrap();
        let mut sched = Scheduler::new(SchedConfig {
            stack_size: 512,
            ..SchedConfig::DEFAULT
        });
        let a = sched.create(&mut heap, "a", 0, Priority::Background).unwrap();
        let b = sched.create(&mut heap, "b", 0, Priority::Background).unwrap();

        let mut bus = RecordingBus::new();
        let mut d = ready_dispatcher(&mut bus);
        let mut outcomes = Vec::new();
        for _ in 0..11 {
            outcomes.push(d.dispatch(&mut bus, 32, frame(), &mut sched));
        }
        assert!(matches!(outcomes[0], Dispatch::Timer(TickOutcome::Dispatched(sw)) if sw.to == a));
        assert!(matches!(outcomes[10], Dispatch::Timer(TickOutcome::Preempted(sw)) if sw.to == b));
        assert_eq!(bus.writes_to(MASTER_COMMAND).len(), 11);
    }

    #[test]
    fn keyboard_decodes_into_input_queue() {
        let mut bus = RecordingBus::new();
        let mut d = ready_dispatcher(&mut bus);
        let mut sched = Scheduler::new(SchedConfig::DEFAULT);

        for code in [0x23, 0xA3, 0x17, 0x97] {
            bus.queue_read(keyboard::DATA_PORT, code);
            d.dispatch(&mut bus, 33, frame(), &mut sched);
            assert_eq!(bus.writes.last(), Some(&(MASTER_COMMAND, EOI)));
        }
        assert_eq!(d.read_input(), Some('h'));
        assert_eq!(d.read_input(), Some('i'));
        assert_eq!(d.read_input(), None);
        assert_eq!(d.stats().keyboard, 4);
    }

    #[test]
    fn slave_line_acknowledges_both_chips() {
        let mut bus = RecordingBus::new();
        let mut d = ready_dispatcher(&mut bus);
        let mut sched = Scheduler::new(SchedConfig::DEFAULT);

        assert_eq!(d.dispatch(&mut bus, 44, frame(), &mut sched), Dispatch::Hardware(12));
        assert_eq!(bus.writes, [(SLAVE_COMMAND, EOI), (MASTER_COMMAND, EOI)]);
    }

    #[test]
    fn each_pic_line_dispatches_as_itself() {
        let mut bus = RecordingBus::new();
        let mut d = ready_dispatcher(&mut bus);
        let mut sched = Scheduler::new(SchedConfig::DEFAULT);

        for irq in [3u8, 4, 8, 12, 14] {
            let vector = d.pics().vector_of(irq);
            assert_eq!(d.dispatch(&mut bus, vector, frame(), &mut sched), Dispatch::Hardware(irq));
        }
        assert_eq!(d.stats().hardware, 5);
        assert_eq!(d.stats().spurious, 0);
    }

    #[test]
    fn spurious_irq7_and_irq15_are_not_acknowledged_as_real() {
        let mut bus = RecordingBus::new();
        let mut d = ready_dispatcher(&mut bus);
        let mut sched = Scheduler::new(SchedConfig::DEFAULT);

        assert_eq!(d.dispatch(&mut bus, 39, frame(), &mut sched), Dispatch::Spurious);
        assert!(!bus.writes_to(MASTER_COMMAND).contains(&EOI));
        assert!(bus.writes_to(SLAVE_COMMAND).iter().all(|&v| v != EOI));

        bus.clear();
        assert_eq!(d.dispatch(&mut bus, 47, frame(), &mut sched), Dispatch::Spurious);
        assert_eq!(bus.writes.last(), Some(&(MASTER_COMMAND, EOI)));
        assert!(!bus.writes_to(SLAVE_COMMAND).contains(&EOI));

        // a real IRQ 7 shows its in-service bit
        bus.clear();
        bus.queue_read(MASTER_COMMAND, 0x80);
        assert_eq!(d.dispatch(&mut bus, 39, frame(), &mut sched), Dispatch::Hardware(7));
        assert_eq!(bus.writes.last(), Some(&(MASTER_COMMAND, EOI)));

        assert_eq!(d.stats().spurious, 2);
        assert_eq!(d.stats().hardware, 1);
    }

    #[test]
    fn unassigned_vector_is_spurious_and_acknowledged() {
        let mut bus = RecordingBus::new();
        let mut d = ready_dispatcher(&mut bus);
        let mut sched = Scheduler::new(SchedConfig::DEFAULT);

        for v in [9u8, 15, 0x80, 255] {
            bus.clear();
            assert_eq!(d.dispatch(&mut bus, v, frame(), &mut sched), Dispatch::Spurious);
            assert_eq!(bus.writes, [(SLAVE_COMMAND, EOI), (MASTER_COMMAND, EOI)]);
        }
        assert_eq!(d.stats().spurious, 4);
        assert_eq!(sched.now(), 0);
    }

    #[test]
    fn every_fault_reaches_the_panic_path_once() {
        let mut sched = Scheduler::new(SchedConfig::DEFAULT);

        for kind in FaultKind::ALL {
            let mut bus = RecordingBus::new();
            let mut d = ready_dispatcher(&mut bus);
            let latch = PanicLatch::new();
            let f = FaultFrame {
                instruction_pointer: 0x1234,
                error_code: kind.has_error_code().then_some(0),
            };

            let Dispatch::Fault(report) = d.dispatch(&mut bus, kind.vector(), f, &mut sched) else {
                panic!("vector {} did not fault", kind.vector());
            };
            assert_eq!(report.kind, kind);
            assert!(!report.description().is_empty());
            assert!(bus.writes.is_empty(), "fault touched the PICs");

            assert_eq!(latch.enter(), PanicEntry::First);
            // a second fault while halting never gets a second report out
            assert_eq!(latch.enter(), PanicEntry::Reentered);
            assert_eq!(d.stats().exceptions, 1);
        }
        assert_eq!(sched.now(), 0);
    }
}
