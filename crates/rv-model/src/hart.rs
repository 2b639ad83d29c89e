//! Single-hart RV64 core driven by the scheduler through [`Model`].

use driver_core::{
    EventMultiplexer, ExecutionFrame, HpmRegisterFile, MemoryReader, Model, ModelError,
    PlatformConfig, SimulationState, StepContext, StepOutcome, TraceCategory,
};

use crate::boot::reset_vector;
use crate::csr::{CsrPolicy, MSTATUS_RESET};
use crate::events::ModelEvent;
use crate::htif::Htif;
use crate::memory::{Bus, ImageError, ROM_BASE};
use crate::trap::{Fault, Trap, MTIP};

pub(crate) const INSTR: &str = TraceCategory::Instr.target();
pub(crate) const REG: &str = TraceCategory::Reg.target();
pub(crate) const MEM: &str = TraceCategory::Mem.target();
pub(crate) const PLATFORM: &str = TraceCategory::Platform.target();

/// RV64I + Zicsr hart with its bus, HTIF port and trace capture.
#[derive(Debug, Clone)]
pub struct Rv64Core {
    pub(crate) platform: PlatformConfig,
    pub(crate) policy: CsrPolicy,
    pub(crate) bus: Bus,
    pub(crate) state: SimulationState,
    pub(crate) tohost: Option<u64>,
    pub(crate) htif: Htif,
    pub(crate) frame: ExecutionFrame,
    pub(crate) interrupt_taken: bool,
    images: Vec<(u64, Vec<u8>)>,
}

impl Rv64Core {
    /// Builds a core for `platform`. With a boot ROM the hart starts in the
    /// reset vector, which jumps to the RAM base; otherwise it starts at the
    /// RAM base directly.
    #[must_use]
    pub fn new(platform: &PlatformConfig) -> Self {
        let rom = platform.boot_rom.then(|| reset_vector(platform.ram_base));
        let policy = CsrPolicy::from_platform(platform);
        let mut core = Self {
            platform: platform.clone(),
            policy,
            bus: Bus::new(platform, rom),
            state: SimulationState::default(),
            tohost: None,
            htif: Htif::default(),
            frame: ExecutionFrame::default(),
            interrupt_taken: false,
            images: Vec::new(),
        };
        core.state = core.initial_state();
        core
    }

    fn initial_state(&self) -> SimulationState {
        let pc = if self.platform.boot_rom {
            ROM_BASE
        } else {
            self.platform.ram_base
        };
        let mut state = SimulationState::new(pc);
        state.csr.mstatus = MSTATUS_RESET;
        state.csr.misa = self.policy.reset_misa();
        state
    }

    /// Platform the core was built for.
    #[must_use]
    pub const fn platform(&self) -> &PlatformConfig {
        &self.platform
    }

    /// Copies `image` into RAM at `addr`. Loaded images are restored on
    /// [`Model::reset`].
    ///
    /// # Errors
    ///
    /// Returns [`ImageError`] when the image does not fit in RAM.
    pub fn load_image(&mut self, addr: u64, image: &[u8]) -> Result<(), ImageError> {
        self.bus.load_image(addr, image)?;
        self.images.push((addr, image.to_vec()));
        Ok(())
    }

    /// Sets the HTIF `tohost` address; `None` disables the port.
    pub const fn set_tohost(&mut self, tohost: Option<u64>) {
        self.tohost = tohost;
    }

    /// HTIF `tohost` address, if any.
    #[must_use]
    pub const fn tohost(&self) -> Option<u64> {
        self.tohost
    }

    /// HTIF console output collected so far.
    #[must_use]
    pub fn console(&self) -> &[u8] {
        self.htif.console()
    }

    /// Removes and returns the HTIF console output collected so far.
    pub fn take_console(&mut self) -> Vec<u8> {
        self.htif.take_console()
    }

    /// Current `mtime`, or `0` without a CLINT.
    #[must_use]
    pub fn mtime(&self) -> u64 {
        self.bus.clint().map_or(0, |clint| clint.mtime)
    }

    /// Mutable architectural state, for harnesses that preset registers.
    pub const fn state_mut(&mut self) -> &mut SimulationState {
        &mut self.state
    }

    fn finish_step(
        &mut self,
        result: Result<u64, Fault>,
        pc: u64,
        events: &mut EventMultiplexer,
    ) -> Result<(), ModelError> {
        match result {
            Ok(next_pc) => {
                self.state.set_pc(next_pc);
                if self.state.csr.hpm.inhibit() & 0b100 == 0 {
                    self.state.csr.minstret = self.state.csr.minstret.wrapping_add(1);
                }
            }
            Err(Fault::Trap(trap)) => {
                tracing::debug!(target: INSTR, pc, "trap: {}", trap.exception);
                events.signal(ModelEvent::Exception.kind());
                self.take_trap(trap, pc);
                self.frame.trap = 1;
            }
            Err(Fault::Model(err)) => return Err(err),
        }
        Ok(())
    }
}

impl MemoryReader for Rv64Core {
    fn read_byte(&self, addr: u64) -> u8 {
        self.bus.read_byte(addr)
    }
}

impl Model for Rv64Core {
    fn step(&mut self, ctx: &mut StepContext<'_>) -> Result<StepOutcome, ModelError> {
        self.frame = ExecutionFrame {
            order: ctx.step_index,
            intr: u8::from(std::mem::take(&mut self.interrupt_taken)),
            ..ExecutionFrame::default()
        };
        if self.state.csr.hpm.inhibit() & 0b1 == 0 {
            self.state.csr.mcycle = self.state.csr.mcycle.wrapping_add(1);
        }

        if self.take_pending_interrupt() {
            return Ok(StepOutcome::NotRetired);
        }

        let pc = self.state.pc();
        self.frame.pc_rdata = pc;
        let fetched = match ctx.injected {
            Some(word) => Ok(word),
            None => self.bus.fetch(pc),
        };
        let word = match fetched {
            Ok(word) => word,
            Err(exception) => {
                // Nothing was fetched, so nothing retires: only the trap
                // redirection happens.
                let trap = Trap::with_tval(exception, pc);
                self.finish_step(Err(Fault::Trap(trap)), pc, ctx.events)?;
                self.frame.pc_wdata = self.state.pc();
                return Ok(StepOutcome::NotRetired);
            }
        };
        self.frame.insn = u64::from(word);
        let result = self.execute(word, pc, ctx.events);
        self.finish_step(result, pc, ctx.events)?;
        self.frame.pc_wdata = self.state.pc();
        self.state.retire();
        Ok(StepOutcome::Retired)
    }

    fn state(&self) -> &SimulationState {
        &self.state
    }

    fn hpm_registers(&mut self) -> &mut HpmRegisterFile {
        &mut self.state.csr.hpm
    }

    fn tick(&mut self) {
        self.bus.tick_timer();
        if let Some(clint) = self.bus.clint() {
            let pending = clint.timer_pending();
            if pending {
                self.state.csr.mip |= MTIP;
            } else {
                self.state.csr.mip &= !MTIP;
            }
            tracing::trace!(target: PLATFORM, mtime = clint.mtime, pending, "timer");
        }
    }

    fn execution_frame(&self) -> ExecutionFrame {
        self.frame
    }

    fn reset(&mut self) -> Result<(), ModelError> {
        self.bus.clear();
        for (addr, image) in &self.images {
            self.bus
                .load_image(*addr, image)
                .map_err(|err| ModelError::Internal(format!("restoring image: {err}")))?;
        }
        self.state = self.initial_state();
        self.frame = ExecutionFrame::default();
        self.interrupt_taken = false;
        Ok(())
    }
}
