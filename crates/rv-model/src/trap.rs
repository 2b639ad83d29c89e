use driver_core::{HpmError, ModelError, Privilege};
use thiserror::Error;

/// Synchronous exceptions raised by execution, with their `mcause` codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
#[repr(u8)]
pub enum Exception {
    /// Jump or branch target not suitably aligned.
    #[error("instruction address misaligned")]
    InstructionAddressMisaligned = 0,
    /// Fetch from unmapped memory.
    #[error("instruction access fault")]
    InstructionAccessFault = 1,
    /// Undecodable or unprivileged encoding.
    #[error("illegal instruction")]
    IllegalInstruction = 2,
    /// `ebreak`.
    #[error("breakpoint")]
    Breakpoint = 3,
    /// Misaligned load with misaligned access disabled.
    #[error("load address misaligned")]
    LoadAddressMisaligned = 4,
    /// Load from unmapped memory.
    #[error("load access fault")]
    LoadAccessFault = 5,
    /// Misaligned store with misaligned access disabled.
    #[error("store address misaligned")]
    StoreAddressMisaligned = 6,
    /// Store to unmapped or read-only memory.
    #[error("store access fault")]
    StoreAccessFault = 7,
    /// `ecall` from user mode.
    #[error("environment call from U-mode")]
    UserEcall = 8,
    /// `ecall` from supervisor mode.
    #[error("environment call from S-mode")]
    SupervisorEcall = 9,
    /// `ecall` from machine mode.
    #[error("environment call from M-mode")]
    MachineEcall = 11,
}

impl Exception {
    /// `mcause`/`scause` exception code.
    #[must_use]
    pub const fn code(self) -> u64 {
        self as u64
    }

    /// Environment call from `privilege`.
    #[must_use]
    pub const fn ecall_from(privilege: Privilege) -> Self {
        match privilege {
            Privilege::User => Self::UserEcall,
            Privilege::Supervisor => Self::SupervisorEcall,
            Privilege::Machine => Self::MachineEcall,
        }
    }
}

/// Exception together with its trap value (`mtval`/`stval`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Trap {
    /// Cause.
    pub exception: Exception,
    /// Faulting address or instruction bits.
    pub tval: u64,
}

impl Trap {
    /// Trap with a zero trap value.
    #[must_use]
    pub const fn new(exception: Exception) -> Self {
        Self {
            exception,
            tval: 0,
        }
    }

    /// Trap carrying `tval`.
    #[must_use]
    pub const fn with_tval(exception: Exception, tval: u64) -> Self {
        Self { exception, tval }
    }
}

/// Why a step did not complete normally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Fault {
    /// Architectural trap; the hart redirects to its handler.
    Trap(Trap),
    /// The model itself is inconsistent; the run stops.
    Model(ModelError),
}

impl From<Trap> for Fault {
    fn from(trap: Trap) -> Self {
        Self::Trap(trap)
    }
}

impl From<Exception> for Fault {
    fn from(exception: Exception) -> Self {
        Self::Trap(Trap::new(exception))
    }
}

impl From<ModelError> for Fault {
    fn from(err: ModelError) -> Self {
        Self::Model(err)
    }
}

impl From<HpmError> for Fault {
    fn from(err: HpmError) -> Self {
        Self::Model(err.into())
    }
}

/// Machine timer interrupt cause (with the interrupt bit set).
pub const MACHINE_TIMER_INTERRUPT: u64 = (1 << 63) | 7;
/// `mip`/`mie` bit of the machine timer interrupt.
pub const MTIP: u64 = 1 << 7;
