//! Contracts the scheduler expects from the primary and reference models.

use thiserror::Error;

use crate::{Csr, EventMultiplexer, ExecutionFrame, Gpr, HpmError, HpmRegisterFile, SimulationState};

/// Model-internal exception: the model's own state is inconsistent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    /// An internal privilege value outside the defined levels was reached.
    #[error("invalid privilege level {0}")]
    InvalidPrivilege(u8),
    /// HPM selector bookkeeping failed during a CSR write.
    #[error(transparent)]
    Hpm(#[from] HpmError),
    /// Any other internal invariant violation.
    #[error("internal model error: {0}")]
    Internal(String),
}

/// Result of one step attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepOutcome {
    /// An instruction retired, including one that trapped while executing.
    Retired,
    /// No instruction retired: an interrupt or fetch fault only redirected
    /// the pc, or the hart stalled.
    NotRetired,
}

/// Per-step inputs handed to [`Model::step`].
#[derive(Debug)]
pub struct StepContext<'a> {
    /// Index of this step among retired steps so far.
    pub step_index: u64,
    /// Encoding to execute in place of the fetched instruction.
    pub injected: Option<u32>,
    /// Multiplexer receiving HPM events raised during the step.
    pub events: &'a mut EventMultiplexer,
}

/// Byte-level view of model memory, used for signature dumps.
pub trait MemoryReader {
    /// Reads one byte; unmapped addresses read as zero.
    fn read_byte(&self, addr: u64) -> u8;
}

/// Primary CPU model driven by the scheduler.
pub trait Model: MemoryReader {
    /// Executes one instruction.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError`] when the model detects an internal inconsistency;
    /// the run cannot continue.
    fn step(&mut self, ctx: &mut StepContext<'_>) -> Result<StepOutcome, ModelError>;

    /// Architectural state after the last step.
    fn state(&self) -> &SimulationState;

    /// Counter, selector and inhibit registers drained on each tick.
    fn hpm_registers(&mut self) -> &mut HpmRegisterFile;

    /// Advances the model's clock and platform devices by one tick.
    fn tick(&mut self);

    /// Execution trace of the last step for the remote protocol.
    fn execution_frame(&self) -> ExecutionFrame;

    /// Returns the model to its initial state.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError`] when the initial state cannot be rebuilt.
    fn reset(&mut self) -> Result<(), ModelError>;
}

/// Reference platform settings that must match the driver's before a tandem run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferencePlatform {
    /// Hardware dirty-bit update.
    pub dirty_update: bool,
    /// Misaligned accesses complete instead of trapping.
    pub misaligned: bool,
    /// RAM size in bytes.
    pub ram_size: u64,
}

/// Independent implementation the primary model is checked against.
///
/// Only read-back is exposed: the comparator never mutates reference state.
pub trait ReferenceModel {
    /// `false` for the stand-in used when tandem mode is off.
    fn is_active(&self) -> bool {
        true
    }

    /// Executes the step corresponding to the primary's last step.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError`] when the reference cannot advance.
    fn step(&mut self) -> Result<(), ModelError>;

    /// `true` once the reference program has completed.
    fn is_done(&self) -> bool;

    /// Architectural privilege encoding (`3` for machine mode).
    fn privilege(&self) -> u8;

    /// Program counter.
    fn pc(&self) -> u64;

    /// Integer register.
    fn gpr(&self, reg: Gpr) -> u64;

    /// Control/status register.
    fn csr(&self, csr: Csr) -> u64;

    /// Advances the reference clock and IO by one tick.
    fn tick(&mut self);

    /// Tick length the reference was built with, if it dictates one.
    fn insns_per_tick(&self) -> Option<u64> {
        None
    }

    /// Platform settings for the setup consistency check, if reported.
    fn platform(&self) -> Option<ReferencePlatform> {
        None
    }
}

/// Inactive reference used when tandem mode is off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NullReference;

impl ReferenceModel for NullReference {
    fn is_active(&self) -> bool {
        false
    }

    fn step(&mut self) -> Result<(), ModelError> {
        Ok(())
    }

    fn is_done(&self) -> bool {
        false
    }

    fn privilege(&self) -> u8 {
        0
    }

    fn pc(&self) -> u64 {
        0
    }

    fn gpr(&self, _reg: Gpr) -> u64 {
        0
    }

    fn csr(&self, _csr: Csr) -> u64 {
        0
    }

    fn tick(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::{ModelError, NullReference, ReferenceModel};
    use crate::HpmError;

    #[test]
    fn null_reference_is_inactive() {
        let mut reference = NullReference;
        assert!(!reference.is_active());
        assert_eq!(reference.step(), Ok(()));
        assert_eq!(reference.insns_per_tick(), None);
        assert_eq!(reference.platform(), None);
    }

    #[test]
    fn hpm_errors_convert_into_model_errors() {
        let err: ModelError = HpmError::CounterIndexOutOfRange(40).into();
        assert_eq!(err.to_string(), "hpm counter index 40 out of range");
    }
}
