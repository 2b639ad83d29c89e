//! Architectural simulation state primitives.

/// Control/status register identifiers and storage.
pub mod csr;
/// Privilege levels and their two numbering schemes.
pub mod privilege;
/// Register file and whole-run simulation state.
pub mod registers;

pub use csr::{Csr, CsrBank, SSTATUS_MASK};
pub use privilege::Privilege;
pub use registers::{Gpr, SimulationState, GPR_COUNT};
