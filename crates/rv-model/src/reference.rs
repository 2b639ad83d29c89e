//! Second core instance exposed as a tandem reference.

use driver_core::{
    Csr, EventMultiplexer, Gpr, Model, ModelError, ReferenceModel, ReferencePlatform, StepContext,
    StepOutcome,
};

use crate::hart::Rv64Core;
use crate::events::event_multiplexer;
use crate::memory::ImageError;

/// Independent [`Rv64Core`] stepped in lock-step with the primary.
///
/// It owns its own event multiplexer so HPM bookkeeping never leaks between
/// the two models.
#[derive(Debug, Clone)]
pub struct Rv64Reference {
    core: Rv64Core,
    events: EventMultiplexer,
    retired: u64,
    insns_per_tick: Option<u64>,
}

impl Rv64Reference {
    /// Wraps `core`.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Hpm`] if the event table is rejected.
    pub fn new(core: Rv64Core) -> Result<Self, ModelError> {
        Ok(Self {
            core,
            events: event_multiplexer()?,
            retired: 0,
            insns_per_tick: None,
        })
    }

    /// Makes the reference dictate the tick length.
    #[must_use]
    pub fn with_insns_per_tick(mut self, insns_per_tick: u64) -> Self {
        self.insns_per_tick = Some(insns_per_tick);
        self
    }

    /// Loads an image into the reference's RAM.
    ///
    /// # Errors
    ///
    /// Returns [`ImageError`] when the image does not fit.
    pub fn load_image(&mut self, addr: u64, image: &[u8]) -> Result<(), ImageError> {
        self.core.load_image(addr, image)
    }

    /// Wrapped core.
    #[must_use]
    pub const fn core(&self) -> &Rv64Core {
        &self.core
    }
}

impl ReferenceModel for Rv64Reference {
    fn step(&mut self) -> Result<(), ModelError> {
        let outcome = self.core.step(&mut StepContext {
            step_index: self.retired,
            injected: None,
            events: &mut self.events,
        })?;
        if outcome == StepOutcome::Retired {
            self.retired += 1;
        }
        Ok(())
    }

    fn is_done(&self) -> bool {
        self.core.state().halted()
    }

    fn privilege(&self) -> u8 {
        self.core.state().privilege().encoding()
    }

    fn pc(&self) -> u64 {
        self.core.state().pc()
    }

    fn gpr(&self, reg: Gpr) -> u64 {
        self.core.state().gpr(reg)
    }

    fn csr(&self, csr: Csr) -> u64 {
        self.core.state().csr.read(csr)
    }

    fn tick(&mut self) {
        self.core.tick();
        self.events.process_pending(self.core.hpm_registers());
    }

    fn insns_per_tick(&self) -> Option<u64> {
        self.insns_per_tick
    }

    fn platform(&self) -> Option<ReferencePlatform> {
        let platform = self.core.platform();
        Some(ReferencePlatform {
            dirty_update: platform.enable_dirty_update,
            misaligned: platform.enable_misaligned,
            ram_size: platform.ram_size,
        })
    }
}
