//! Scripted collaborators for driving the scheduler without a real CPU model.

#![allow(dead_code)]

use driver_core::{
    Csr, EventKind, EventMultiplexer, ExecutionFrame, Gpr, HpmRegisterFile, MemoryReader, Model,
    ModelError, ReferenceModel, ReferencePlatform, SimulationState, StepContext, StepOutcome,
};

pub const START_PC: u64 = 0x8000_0000;

/// Behaviour of one scripted step; unscripted steps retire an `addi`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Retire,
    Stall,
    Halt(u64),
    Fail,
    Signal(usize),
    /// Retire and write `x<reg> = value`.
    Write(u8, u64),
}

/// Model that follows a fixed script: pc advances by 4 per retirement and
/// `x5` holds the retirement count.
#[derive(Debug, Clone)]
pub struct ScriptedModel {
    pub state: SimulationState,
    pub script: Vec<Action>,
    pub cursor: usize,
    pub step_indices: Vec<u64>,
    pub injected: Vec<Option<u32>>,
    pub ticks: u64,
    pub resets: u64,
    last: ExecutionFrame,
}

impl ScriptedModel {
    pub fn new(script: Vec<Action>) -> Self {
        Self {
            state: SimulationState::new(START_PC),
            script,
            cursor: 0,
            step_indices: Vec::new(),
            injected: Vec::new(),
            ticks: 0,
            resets: 0,
            last: ExecutionFrame::default(),
        }
    }

    fn retire(&mut self, ctx: &StepContext<'_>) {
        let pc = self.state.pc();
        self.state.set_pc(pc + 4);
        self.state.retire();
        let count = self.state.instructions();
        self.state.set_gpr(Gpr::from_u5(5), count);
        self.last = ExecutionFrame {
            order: ctx.step_index,
            pc_rdata: pc,
            pc_wdata: pc + 4,
            insn: u64::from(ctx.injected.unwrap_or(0x13)),
            rd_addr: 5,
            rd_wdata: count,
            ..ExecutionFrame::default()
        };
    }
}

impl MemoryReader for ScriptedModel {
    fn read_byte(&self, _addr: u64) -> u8 {
        0
    }
}

impl Model for ScriptedModel {
    fn step(&mut self, ctx: &mut StepContext<'_>) -> Result<StepOutcome, ModelError> {
        self.step_indices.push(ctx.step_index);
        self.injected.push(ctx.injected);
        let action = self.script.get(self.cursor).copied().unwrap_or(Action::Retire);
        self.cursor += 1;
        match action {
            Action::Retire => self.retire(ctx),
            Action::Stall => {
                self.last = ExecutionFrame::default();
                return Ok(StepOutcome::NotRetired);
            }
            Action::Halt(code) => {
                self.retire(ctx);
                self.state.halt(code);
            }
            Action::Fail => return Err(ModelError::Internal("scripted failure".to_string())),
            Action::Signal(kind) => {
                self.retire(ctx);
                ctx.events
                    .signal(EventKind::new(kind).expect("scripted kind in range"));
            }
            Action::Write(reg, value) => {
                self.retire(ctx);
                self.state.set_gpr(Gpr::from_u5(u32::from(reg)), value);
            }
        }
        Ok(StepOutcome::Retired)
    }

    fn state(&self) -> &SimulationState {
        &self.state
    }

    fn hpm_registers(&mut self) -> &mut HpmRegisterFile {
        &mut self.state.csr.hpm
    }

    fn tick(&mut self) {
        self.ticks += 1;
    }

    fn execution_frame(&self) -> ExecutionFrame {
        self.last
    }

    fn reset(&mut self) -> Result<(), ModelError> {
        let script = std::mem::take(&mut self.script);
        let resets = self.resets + 1;
        *self = Self::new(script);
        self.resets = resets;
        Ok(())
    }
}

/// Reference that runs its own copy of a script.
#[derive(Debug, Clone)]
pub struct ScriptedReference {
    pub inner: ScriptedModel,
    pub insns_per_tick: Option<u64>,
    pub platform: Option<ReferencePlatform>,
    pub ticks: u64,
    events: EventMultiplexer,
    step_index: u64,
}

impl ScriptedReference {
    pub fn new(script: Vec<Action>) -> Self {
        Self {
            inner: ScriptedModel::new(script),
            insns_per_tick: None,
            platform: None,
            ticks: 0,
            events: EventMultiplexer::default(),
            step_index: 0,
        }
    }
}

impl ReferenceModel for ScriptedReference {
    fn step(&mut self) -> Result<(), ModelError> {
        let mut ctx = StepContext {
            step_index: self.step_index,
            injected: None,
            events: &mut self.events,
        };
        if self.inner.step(&mut ctx)? == StepOutcome::Retired {
            self.step_index += 1;
        }
        Ok(())
    }

    fn is_done(&self) -> bool {
        self.inner.state.halted()
    }

    fn privilege(&self) -> u8 {
        self.inner.state.privilege().encoding()
    }

    fn pc(&self) -> u64 {
        self.inner.state.pc()
    }

    fn gpr(&self, reg: Gpr) -> u64 {
        self.inner.state.gpr(reg)
    }

    fn csr(&self, csr: Csr) -> u64 {
        self.inner.state.csr.read(csr)
    }

    fn tick(&mut self) {
        self.ticks += 1;
    }

    fn insns_per_tick(&self) -> Option<u64> {
        self.insns_per_tick
    }

    fn platform(&self) -> Option<ReferencePlatform> {
        self.platform
    }
}
