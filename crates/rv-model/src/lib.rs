//! Minimal RV64I + Zicsr hart used as both the primary and the tandem
//! reference model of the simulation driver.

/// Trap causes and interrupt constants.
pub mod trap;
pub use trap::{Exception, Trap, MACHINE_TIMER_INTERRUPT, MTIP};

/// Physical memory map: boot ROM, CLINT, RAM.
pub mod memory;
pub use memory::{Bus, Clint, ImageError, Width, CLINT_BASE, CLINT_SIZE, ROM_BASE};

/// Boot ROM reset vector.
pub mod boot;
pub use boot::{reset_vector, DTB_ADDRESS, ROM_SIZE};

/// Host-target interface completion port.
pub mod htif;
pub use htif::{Htif, HtifRequest, DEFAULT_TOHOST};

/// HPM events raised by the model.
pub mod events;
pub use events::{event_multiplexer, platform_events, ModelEvent};

/// RV64I + Zicsr instruction decoder.
pub mod decode;
pub use decode::{decode, AluOp, BranchKind, CsrOp, CsrSource, Instruction};

/// CSR access checks and legalisation.
pub mod csr;
pub use csr::{CsrPolicy, MSTATUS_RESET, MSTATUS_WRITABLE};

/// The hart and its [`driver_core::Model`] implementation.
pub mod hart;
pub use hart::Rv64Core;

mod execute;

/// Tandem reference wrapper.
pub mod reference;
pub use reference::Rv64Reference;

#[cfg(test)]
use proptest as _;
