// kernel/src/interrupts/vectors.rs
//
// Vector classification.
//
// - 0-8, 10-14, 16-19: processor faults
// - 9 (coprocessor overrun) and 15: reserved, treated as unassigned
// - first two remapped PIC lines: timer, keyboard
// - everything else: unassigned

/// Vector of the first remapped hardware line.
pub const TIMER_VECTOR: u8 = super::pic::MASTER_OFFSET;
pub const KEYBOARD_VECTOR: u8 = super::pic::MASTER_OFFSET + 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum FaultKind {
    DivideError = 0,
    Debug = 1,
    NonMaskableInterrupt = 2,
    Breakpoint = 3,
    Overflow = 4,
    BoundRangeExceeded = 5,
    InvalidOpcode = 6,
    DeviceNotAvailable = 7,
    DoubleFault = 8,
    InvalidTss = 10,
    SegmentNotPresent = 11,
    StackSegmentFault = 12,
    GeneralProtection = 13,
    PageFault = 14,
    X87FloatingPoint = 16,
    AlignmentCheck = 17,
    MachineCheck = 18,
    SimdFloatingPoint = 19,
}

impl FaultKind {
    pub const ALL: [FaultKind; 18] = [
        FaultKind::DivideError,
        FaultKind::Debug,
        FaultKind::NonMaskableInterrupt,
        FaultKind::Breakpoint,
        FaultKind::Overflow,
        FaultKind::BoundRangeExceeded,
        FaultKind::InvalidOpcode,
        FaultKind::DeviceNotAvailable,
        FaultKind::DoubleFault,
        FaultKind::InvalidTss,
        FaultKind::SegmentNotPresent,
        FaultKind::StackSegmentFault,
        FaultKind::GeneralProtection,
        FaultKind::PageFault,
        FaultKind::X87FloatingPoint,
        FaultKind::AlignmentCheck,
        FaultKind::MachineCheck,
        FaultKind::SimdFloatingPoint,
    ];

    pub const fn vector(self) -> u8 {
        self as u8
    }

    pub fn from_vector(vector: u8) -> Option<FaultKind> {
        Self::ALL.iter().copied().find(|f| f.vector() == vector)
    }

    pub const fn description(self) -> &'static str {
        match self {
            FaultKind::DivideError => "Divide error (#DE): division by zero or quotient overflow",
            FaultKind::Debug => "Debug exception (#DB)",
            FaultKind::NonMaskableInterrupt => "Non-maskable interrupt: hardware failure signalled",
            FaultKind::Breakpoint => "Breakpoint (#BP)",
            FaultKind::Overflow => "Overflow (#OF): INTO with OF set",
            FaultKind::BoundRangeExceeded => "Bound range exceeded (#BR)",
            FaultKind::InvalidOpcode => "Invalid opcode (#UD)",
            FaultKind::DeviceNotAvailable => "Device not available (#NM): no FPU context",
            FaultKind::DoubleFault => "Double fault (#DF): fault while delivering a fault",
            FaultKind::InvalidTss => "Invalid TSS (#TS)",
            FaultKind::SegmentNotPresent => "Segment not present (#NP)",
            FaultKind::StackSegmentFault => "Stack-segment fault (#SS)",
            FaultKind::GeneralProtection => "General protection fault (#GP)",
            FaultKind::PageFault => "Page fault (#PF)",
            FaultKind::X87FloatingPoint => "x87 floating-point error (#MF)",
            FaultKind::AlignmentCheck => "Alignment check (#AC)",
            FaultKind::MachineCheck => "Machine check (#MC): hardware error",
            FaultKind::SimdFloatingPoint => "SIMD floating-point exception (#XM)",
        }
    }

    /// Whether the CPU pushes an error code for this vector.
    pub const fn has_error_code(self) -> bool {
        matches!(
            self,
            FaultKind::DoubleFault
                | FaultKind::InvalidTss
                | FaultKind::SegmentNotPresent
                | FaultKind::StackSegmentFault
                | FaultKind::GeneralProtection
                | FaultKind::PageFault
                | FaultKind::AlignmentCheck
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VectorKind {
    Fault(FaultKind),
    Timer,
    Keyboard,
    Unassigned,
}

impl VectorKind {
    pub fn of(vector: u8) -> VectorKind {
        match vector {
            TIMER_VECTOR => VectorKind::Timer,
            KEYBOARD_VECTOR => VectorKind::Keyboard,
            v => match FaultKind::from_vector(v) {
                Some(f) => VectorKind::Fault(f),
                None => VectorKind::Unassigned,
            },
        }
    }
}
