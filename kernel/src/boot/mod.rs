// kernel/src/boot/mod.rs
//
// Boot transition protocol: firmware hand-off -> 64-bit kernel entry.
//
//   Stage1RealMode -> Stage2RealMode -> CapabilityCheck -> PagingBootstrap
//     -> ModeSwitch -> LongModeEntry
//   CapabilityCheck -> HaltUnsupported
//
// [Invariants]
// - transitions only move forward, one step at a time
// - HaltUnsupported is reachable only from CapabilityCheck
// - a media error stops the sequence where it happened; no retry, no
//   later transition
// - nothing is written to the page-table region before the capability
//   check has passed
// - PG and PE are set in a single CR0 write, then the far jump follows
//
// Every hardware effect goes through BootHal.

pub mod gdt;
pub mod hal;
pub mod handoff;
pub mod paging;
pub mod sector;

use core::fmt;

use x86_64::registers::control::{Cr0Flags, Cr4Flags};
use x86_64::registers::model_specific::EferFlags;

use crate::logging::{self, Subsystem};
use crate::mem::layout::{
    CODE_SEG, KERNEL_LOAD_ADDR, KERNEL_SECTORS, KERNEL_START_LBA, REAL_MODE_SEGMENT,
    STAGE2_LOAD_ADDR, STAGE2_SECTORS, STAGE2_START_LBA,
};

pub use gdt::FlatGdt;
pub use hal::{BootHal, HaltReason, MediaFault};
pub use handoff::{HandoffError, HandoffRegisters};
pub use sector::{BootSector, Chs, ChsRead, ChsReads, SectorError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum BootStage {
    Stage1RealMode,
    Stage2RealMode,
    CapabilityCheck,
    PagingBootstrap,
    ModeSwitch,
    LongModeEntry,
    HaltUnsupported,
}

impl BootStage {
    pub const fn as_str(self) -> &'static str {
        match self {
            BootStage::Stage1RealMode => "STAGE1_REAL_MODE",
            BootStage::Stage2RealMode => "STAGE2_REAL_MODE",
            BootStage::CapabilityCheck => "CAPABILITY_CHECK",
            BootStage::PagingBootstrap => "PAGING_BOOTSTRAP",
            BootStage::ModeSwitch => "MODE_SWITCH",
            BootStage::LongModeEntry => "LONG_MODE_ENTRY",
            BootStage::HaltUnsupported => "HALT_UNSUPPORTED",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, BootStage::LongModeEntry | BootStage::HaltUnsupported)
    }

    pub fn can_advance_to(self, next: BootStage) -> bool {
        use BootStage::*;
        matches!(
            (self, next),
            (Stage1RealMode, Stage2RealMode)
                | (Stage2RealMode, CapabilityCheck)
                | (CapabilityCheck, PagingBootstrap)
                | (CapabilityCheck, HaltUnsupported)
                | (PagingBootstrap, ModeSwitch)
                | (ModeSwitch, LongModeEntry)
        )
    }
}

impl fmt::Display for BootStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BootError {
    Media { stage: BootStage, fault: MediaFault },
    Layout(SectorError),
    UnsupportedCpu,
    InvalidTransition { from: BootStage, to: BootStage },
    /// The sequence already stopped on an earlier fatal error.
    Halted(BootStage),
    Handoff(HandoffError),
}

impl fmt::Display for BootError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BootError::Media { stage, fault } => {
                write!(f, "disk read failed in {} (status {:#04x})", stage, fault.status)
            }
            BootError::Layout(e) => write!(f, "load plan: {}", e),
            BootError::UnsupportedCpu => f.write_str(HaltReason::UnsupportedCpu.message()),
            BootError::InvalidTransition { from, to } => {
                write!(f, "illegal boot transition {} -> {}", from, to)
            }
            BootError::Halted(stage) => write!(f, "boot halted in {}", stage),
            BootError::Handoff(e) => write!(f, "long-mode hand-off: {}", e),
        }
    }
}

impl From<SectorError> for BootError {
    fn from(e: SectorError) -> Self {
        BootError::Layout(e)
    }
}

impl From<HandoffError> for BootError {
    fn from(e: HandoffError) -> Self {
        BootError::Handoff(e)
    }
}

/// A contiguous LBA range and where it lands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoadSegment {
    pub start_lba: u32,
    pub sectors: u16,
    pub dest: u64,
}

impl LoadSegment {
    pub fn reads(&self) -> Result<ChsReads, SectorError> {
        ChsReads::new(self.start_lba, self.sectors as u32, self.dest)
    }
}

/// What each real-mode stage reads. Both stages must agree on these.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoadPlan {
    pub stage2: LoadSegment,
    pub kernel: LoadSegment,
}

impl LoadPlan {
    pub const DEFAULT: LoadPlan = LoadPlan {
        stage2: LoadSegment {
            start_lba: STAGE2_START_LBA,
            sectors: STAGE2_SECTORS,
            dest: STAGE2_LOAD_ADDR,
        },
        kernel: LoadSegment {
            start_lba: KERNEL_START_LBA,
            sectors: KERNEL_SECTORS,
            dest: KERNEL_LOAD_ADDR,
        },
    };
}

pub struct BootSequence<H: BootHal> {
    hal: H,
    drive: u8,
    plan: LoadPlan,
    stage: BootStage,
    fatal: Option<BootError>,
}

impl<H: BootHal> BootSequence<H> {
    /// `drive` is the firmware boot device id (DL at entry).
    pub fn new(hal: H, drive: u8) -> Self {
        Self::with_plan(hal, drive, LoadPlan::DEFAULT)
    }

    pub fn with_plan(hal: H, drive: u8, plan: LoadPlan) -> Self {
        BootSequence {
            hal,
            drive,
            plan,
            stage: BootStage::Stage1RealMode,
            fatal: None,
        }
    }

    pub fn stage(&self) -> BootStage {
        self.stage
    }

    pub fn drive(&self) -> u8 {
        self.drive
    }

    pub fn fatal_error(&self) -> Option<BootError> {
        self.fatal
    }

    pub fn hal(&self) -> &H {
        &self.hal
    }

    pub fn into_hal(self) -> H {
        self.hal
    }

    fn expect(&self, stage: BootStage) -> Result<(), BootError> {
        if self.fatal.is_some() {
            return Err(BootError::Halted(self.stage));
        }
        if self.stage != stage {
            return Err(BootError::InvalidTransition { from: self.stage, to: stage });
        }
        Ok(())
    }

    fn advance(&mut self, next: BootStage) -> Result<(), BootError> {
        if !self.stage.can_advance_to(next) {
            return Err(BootError::InvalidTransition { from: self.stage, to: next });
        }
        logging::logf(
            logging::Level::Info,
            Subsystem::Boot,
            format_args!("{} -> {}", self.stage, next),
        );
        self.stage = next;
        Ok(())
    }

    fn fail(&mut self, error: BootError, reason: HaltReason) -> BootError {
        logging::fatal(Subsystem::Boot, reason.message());
        self.hal.halt(reason);
        self.fatal = Some(error);
        error
    }

    fn load(&mut self, segment: LoadSegment) -> Result<(), BootError> {
        let reads = match segment.reads() {
            Ok(r) => r,
            Err(e) => return Err(self.fail(e.into(), HaltReason::MediaError)),
        };
        for read in reads {
            if let Err(fault) = self.hal.read_sectors(self.drive, &read) {
                let err = BootError::Media { stage: self.stage, fault };
                return Err(self.fail(err, HaltReason::MediaError));
            }
        }
        Ok(())
    }

    /// Stage 1: read stage 2 and hand control to it.
    pub fn load_stage2(&mut self) -> Result<(), BootError> {
        self.expect(BootStage::Stage1RealMode)?;
        self.load(self.plan.stage2)?;
        self.hal.far_jump(REAL_MODE_SEGMENT, self.plan.stage2.dest);
        self.advance(BootStage::Stage2RealMode)
    }

    /// Stage 2: read the kernel image.
    pub fn load_kernel(&mut self) -> Result<(), BootError> {
        self.expect(BootStage::Stage2RealMode)?;
        self.load(self.plan.kernel)?;
        self.advance(BootStage::CapabilityCheck)
    }

    pub fn check_capabilities(&mut self) -> Result<(), BootError> {
        self.expect(BootStage::CapabilityCheck)?;
        if !self.hal.cpu_supports_long_mode() {
            self.advance(BootStage::HaltUnsupported)?;
            return Err(self.fail(BootError::UnsupportedCpu, HaltReason::UnsupportedCpu));
        }
        self.advance(BootStage::PagingBootstrap)
    }

    /// Identity map, CR4.PAE|PGE, CR3, EFER.LME, flat GDT.
    pub fn bootstrap_paging(&mut self) -> Result<(), BootError> {
        self.expect(BootStage::PagingBootstrap)?;

        let pml4 = paging::build_identity_map(&mut self.hal);

        let cr4 = self.hal.read_cr4();
        self.hal
            .write_cr4(cr4 | Cr4Flags::PHYSICAL_ADDRESS_EXTENSION | Cr4Flags::PAGE_GLOBAL);
        self.hal.write_cr3(pml4);

        let efer = self.hal.read_efer();
        self.hal.write_efer(efer | EferFlags::LONG_MODE_ENABLE);

        self.hal.load_gdt(&FlatGdt::new());
        self.advance(BootStage::ModeSwitch)
    }

    /// One-way: PG|PE in one CR0 write, then the far jump that reloads CS.
    pub fn switch_mode(&mut self) -> Result<(), BootError> {
        self.expect(BootStage::ModeSwitch)?;

        let cr0 = self.hal.read_cr0();
        self.hal
            .write_cr0(cr0 | Cr0Flags::PAGING | Cr0Flags::PROTECTED_MODE_ENABLE);
        self.hal.far_jump(CODE_SEG, self.plan.kernel.dest);
        self.advance(BootStage::LongModeEntry)
    }

    /// Runs every remaining step; stops at the first error.
    pub fn run(&mut self) -> Result<BootStage, BootError> {
        while !self.stage.is_terminal() {
            match self.stage {
                BootStage::Stage1RealMode => self.load_stage2()?,
                BootStage::Stage2RealMode => self.load_kernel()?,
                BootStage::CapabilityCheck => self.check_capabilities()?,
                BootStage::PagingBootstrap => self.bootstrap_paging()?,
                BootStage::ModeSwitch => self.switch_mode()?,
                BootStage::LongModeEntry | BootStage::HaltUnsupported => break,
            }
        }
        Ok(self.stage)
    }
}
