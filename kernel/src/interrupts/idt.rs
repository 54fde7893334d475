// kernel/src/interrupts/idt.rs
//
// Fills an x86_64 InterruptDescriptorTable.
//
// Slots:
// - typed exception fields: one stub per fault; NMI keeps IF cleared, the
//   other faults are trap gates
// - 32..=47 (the remapped PIC lines): one stub per line, so the dispatcher
//   sees the vector that was actually raised
// - 48..=255 and the unused exception fields: the default stub, which
//   dispatches as DEFAULT_VECTOR
// - 15, 22-27 and 31 are reserved by the CPU and stay not present
//
// Every stub is generic over a VectorSink, so the table can be built and
// inspected off-target. arch::interrupts supplies the hardware sink and
// loads the result.

use x86_64::structures::idt::{InterruptDescriptorTable, InterruptStackFrame, PageFaultErrorCode};

use super::pic::{MASTER_OFFSET, SLAVE_OFFSET};
use super::{FaultFrame, FaultKind, FaultReport};

/// What the default stub reports; classifies as spurious.
pub const DEFAULT_VECTOR: u8 = 0xFF;

/// First vector past the PIC lines.
pub const FIRST_FREE_VECTOR: u8 = SLAVE_OFFSET + 8;

const _: () = assert!(MASTER_OFFSET == 32 && SLAVE_OFFSET == 40);

/// Where the stubs deliver.
pub trait VectorSink {
    fn hardware(vector: u8);
    fn fault(report: FaultReport) -> !;
}

fn report(kind: FaultKind, frame: &InterruptStackFrame, error_code: Option<u64>) -> FaultReport {
    FaultReport {
        kind,
        frame: FaultFrame {
            instruction_pointer: frame.instruction_pointer.as_u64(),
            error_code,
        },
    }
}

// ─────────────────────────────────────────────
// stubs
// ─────────────────────────────────────────────

macro_rules! fault_stubs {
    ($( $name:ident => $kind:ident $(, $code:ident)? ;)*) => {
        $( fault_stubs!(@one $name, $kind $(, $code)?); )*
    };
    (@one $name:ident, $kind:ident) => {
        extern "x86-interrupt" fn $name<S: VectorSink>(frame: InterruptStackFrame) {
            S::fault(report(FaultKind::$kind, &frame, None))
        }
    };
    (@one $name:ident, $kind:ident, error_code) => {
        extern "x86-interrupt" fn $name<S: VectorSink>(frame: InterruptStackFrame, code: u64) {
            S::fault(report(FaultKind::$kind, &frame, Some(code)))
        }
    };
}

fault_stubs! {
    divide_error => DivideError;
    debug => Debug;
    nmi => NonMaskableInterrupt;
    breakpoint => Breakpoint;
    overflow => Overflow;
    bound_range => BoundRangeExceeded;
    invalid_opcode => InvalidOpcode;
    device_not_available => DeviceNotAvailable;
    invalid_tss => InvalidTss, error_code;
    segment_not_present => SegmentNotPresent, error_code;
    stack_segment => StackSegmentFault, error_code;
    general_protection => GeneralProtection, error_code;
    x87_floating_point => X87FloatingPoint;
    alignment_check => AlignmentCheck, error_code;
    simd_floating_point => SimdFloatingPoint;
}

extern "x86-interrupt" fn double_fault<S: VectorSink>(frame: InterruptStackFrame, code: u64) -> ! {
    S::fault(report(FaultKind::DoubleFault, &frame, Some(code)))
}

extern "x86-interrupt" fn page_fault<S: VectorSink>(
    frame: InterruptStackFrame,
    code: PageFaultErrorCode,
) {
    S::fault(report(FaultKind::PageFault, &frame, Some(code.bits())))
}

extern "x86-interrupt" fn machine_check<S: VectorSink>(frame: InterruptStackFrame) -> ! {
    S::fault(report(FaultKind::MachineCheck, &frame, None))
}

extern "x86-interrupt" fn irq_line<S: VectorSink, const VECTOR: u8>(_frame: InterruptStackFrame) {
    S::hardware(VECTOR)
}

extern "x86-interrupt" fn default_entry<S: VectorSink>(_frame: InterruptStackFrame) {
    S::hardware(DEFAULT_VECTOR)
}

extern "x86-interrupt" fn default_entry_with_code<S: VectorSink>(
    _frame: InterruptStackFrame,
    _code: u64,
) {
    S::hardware(DEFAULT_VECTOR)
}

macro_rules! irq_lines {
    ($idt:ident, $sink:ident; $($v:literal)*) => {
        $( $idt[$v].set_handler_fn(irq_line::<$sink, $v>); )*
    };
}

// ─────────────────────────────────────────────
// table
// ─────────────────────────────────────────────

/// Builds a table with every usable slot present.
pub fn build<S: VectorSink>() -> InterruptDescriptorTable {
    let mut idt = InterruptDescriptorTable::new();

    idt.divide_error.set_handler_fn(divide_error::<S>).disable_interrupts(false);
    idt.debug.set_handler_fn(debug::<S>).disable_interrupts(false);
    idt.non_maskable_interrupt.set_handler_fn(nmi::<S>);
    idt.breakpoint.set_handler_fn(breakpoint::<S>).disable_interrupts(false);
    idt.overflow.set_handler_fn(overflow::<S>).disable_interrupts(false);
    idt.bound_range_exceeded.set_handler_fn(bound_range::<S>).disable_interrupts(false);
    idt.invalid_opcode.set_handler_fn(invalid_opcode::<S>).disable_interrupts(false);
    idt.device_not_available
        .set_handler_fn(device_not_available::<S>)
        .disable_interrupts(false);
    idt.double_fault.set_handler_fn(double_fault::<S>).disable_interrupts(false);
    idt.invalid_tss.set_handler_fn(invalid_tss::<S>).disable_interrupts(false);
    idt.segment_not_present
        .set_handler_fn(segment_not_present::<S>)
        .disable_interrupts(false);
    idt.stack_segment_fault.set_handler_fn(stack_segment::<S>).disable_interrupts(false);
    idt.general_protection_fault
        .set_handler_fn(general_protection::<S>)
        .disable_interrupts(false);
    idt.page_fault.set_handler_fn(page_fault::<S>).disable_interrupts(false);
    idt.x87_floating_point.set_handler_fn(x87_floating_point::<S>).disable_interrupts(false);
    idt.alignment_check.set_handler_fn(alignment_check::<S>).disable_interrupts(false);
    idt.machine_check.set_handler_fn(machine_check::<S>).disable_interrupts(false);
    idt.simd_floating_point
        .set_handler_fn(simd_floating_point::<S>)
        .disable_interrupts(false);

    // exception slots this kernel has no use for
    idt[9].set_handler_fn(default_entry::<S>);
    idt.virtualization.set_handler_fn(default_entry::<S>);
    idt.hv_injection_exception.set_handler_fn(default_entry::<S>);
    idt.cp_protection_exception.set_handler_fn(default_entry_with_code::<S>);
    idt.vmm_communication_exception.set_handler_fn(default_entry_with_code::<S>);
    idt.security_exception.set_handler_fn(default_entry_with_code::<S>);

    irq_lines!(idt, S; 32 33 34 35 36 37 38 39 40 41 42 43 44 45 46 47);

    for entry in idt.slice_mut(FIRST_FREE_VECTOR..=255) {
        entry.set_handler_fn(default_entry::<S>);
    }
    idt
}

#[cfg(test)]
mod tests {
    use super::*;
    use x86_64::VirtAddr;

    struct Inert;

    impl VectorSink for Inert {
        fn hardware(_vector: u8) {}
        fn fault(report: FaultReport) -> ! {
            panic!("unexpected fault: {:?}", report.kind)
        }
    }

    fn fault_slots(idt: &InterruptDescriptorTable) -> [VirtAddr; 18] {
        [
            idt.divide_error.handler_addr(),
            idt.debug.handler_addr(),
            idt.non_maskable_interrupt.handler_addr(),
            idt.breakpoint.handler_addr(),
            idt.overflow.handler_addr(),
            idt.bound_range_exceeded.handler_addr(),
            idt.invalid_opcode.handler_addr(),
            idt.device_not_available.handler_addr(),
            idt.double_fault.handler_addr(),
            idt.invalid_tss.handler_addr(),
            idt.segment_not_present.handler_addr(),
            idt.stack_segment_fault.handler_addr(),
            idt.general_protection_fault.handler_addr(),
            idt.page_fault.handler_addr(),
            idt.x87_floating_point.handler_addr(),
            idt.alignment_check.handler_addr(),
            idt.machine_check.handler_addr(),
            idt.simd_floating_point.handler_addr(),
        ]
    }

    #[test]
    fn every_fault_has_its_own_stub() {
        let idt = build::<Inert>();
        let slots = fault_slots(&idt);
        let default = idt[FIRST_FREE_VECTOR].handler_addr();

        for (i, addr) in slots.iter().enumerate() {
            assert_ne!(addr.as_u64(), 0, "fault {:?} missing", FaultKind::ALL[i]);
            assert_ne!(*addr, default);
            assert!(slots[..i].iter().all(|other| other != addr));
        }
        assert_eq!(
            idt.page_fault.handler_addr(),
            VirtAddr::new(page_fault::<Inert> as usize as u64)
        );
    }

    #[test]
    fn each_pic_line_gets_a_distinct_stub() {
        let idt = build::<Inert>();
        let lines: Vec<VirtAddr> = (MASTER_OFFSET..FIRST_FREE_VECTOR)
            .map(|v| idt[v].handler_addr())
            .collect();

        assert_eq!(lines.len(), 16);
        for (i, addr) in lines.iter().enumerate() {
            assert_ne!(addr.as_u64(), 0);
            assert!(lines[..i].iter().all(|other| other != addr), "line {i} shares a stub");
        }
        assert_eq!(
            idt[32].handler_addr(),
            VirtAddr::new(irq_line::<Inert, 32> as usize as u64)
        );
        assert_eq!(
            idt[47].handler_addr(),
            VirtAddr::new(irq_line::<Inert, 47> as usize as u64)
        );
    }

    #[test]
    fn remaining_vectors_share_the_default_stub() {
        let idt = build::<Inert>();
        let default = VirtAddr::new(default_entry::<Inert> as usize as u64);

        for v in FIRST_FREE_VECTOR..=255 {
            assert_eq!(idt[v].handler_addr(), default, "vector {v}");
        }
        assert_eq!(idt[9].handler_addr(), default);
        assert_eq!(idt[20].handler_addr(), default);
        assert_ne!(idt.security_exception.handler_addr().as_u64(), 0);
    }
}
