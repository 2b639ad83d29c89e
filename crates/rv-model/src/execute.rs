//! Instruction semantics, trap entry and privileged returns.

#![allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap, clippy::cast_sign_loss)]

use driver_core::{EventMultiplexer, Gpr, ModelError, Privilege};

use crate::hart::{Rv64Core, INSTR, MEM, PLATFORM, REG};
use crate::csr::{self, compressed_enabled, mstatus};
use crate::decode::{decode, CsrOp, CsrSource, Instruction};
use crate::events::ModelEvent;
use crate::memory::Width;
use crate::trap::{Exception, Fault, Trap, MACHINE_TIMER_INTERRUPT, MTIP};

const fn sign_extend(raw: u64, width: Width) -> u64 {
    match width {
        Width::Byte => raw as u8 as i8 as i64 as u64,
        Width::Half => raw as u16 as i16 as i64 as u64,
        Width::Word => raw as u32 as i32 as i64 as u64,
        Width::Double => raw,
    }
}

impl Rv64Core {
    /// Executes `word` fetched (or injected) at `pc` and returns the next pc.
    pub(crate) fn execute(
        &mut self,
        word: u32,
        pc: u64,
        events: &mut EventMultiplexer,
    ) -> Result<u64, Fault> {
        let result = match decode(word) {
            Some(instruction) => {
                tracing::trace!(target: INSTR, "{pc:#018x} ({word:#010x}) {instruction:?}");
                self.execute_decoded(instruction, pc, events)
            }
            None => Err(Exception::IllegalInstruction.into()),
        };
        match result {
            Err(Fault::Trap(mut trap))
                if trap.exception == Exception::IllegalInstruction
                    && self.platform.mtval_has_illegal_inst_bits =>
            {
                trap.tval = u64::from(word);
                Err(Fault::Trap(trap))
            }
            other => other,
        }
    }

    fn execute_decoded(
        &mut self,
        instruction: Instruction,
        pc: u64,
        events: &mut EventMultiplexer,
    ) -> Result<u64, Fault> {
        let (rs1, rs2) = instruction.sources();
        if let Some(reg) = rs1 {
            self.frame.rs1_addr = reg.number();
            self.frame.rs1_data = self.state.gpr(reg);
        }
        if let Some(reg) = rs2 {
            self.frame.rs2_addr = reg.number();
            self.frame.rs2_data = self.state.gpr(reg);
        }

        let next = pc.wrapping_add(4);
        match instruction {
            Instruction::Lui { rd, imm } => {
                self.write_rd(rd, imm as u64);
                Ok(next)
            }
            Instruction::Auipc { rd, imm } => {
                self.write_rd(rd, pc.wrapping_add_signed(imm));
                Ok(next)
            }
            Instruction::Jal { rd, offset } => {
                events.signal(ModelEvent::Jump.kind());
                let target = pc.wrapping_add_signed(offset);
                self.check_target(target)?;
                self.write_rd(rd, next);
                Ok(target)
            }
            Instruction::Jalr { rd, rs1, offset } => {
                events.signal(ModelEvent::Jump.kind());
                let target = self.state.gpr(rs1).wrapping_add_signed(offset) & !1;
                self.check_target(target)?;
                self.write_rd(rd, next);
                Ok(target)
            }
            Instruction::Branch {
                kind,
                rs1,
                rs2,
                offset,
            } => {
                events.signal(ModelEvent::Branch.kind());
                if !kind.taken(self.state.gpr(rs1), self.state.gpr(rs2)) {
                    return Ok(next);
                }
                events.signal(ModelEvent::BranchTaken.kind());
                let target = pc.wrapping_add_signed(offset);
                self.check_target(target)?;
                Ok(target)
            }
            Instruction::Load {
                rd,
                rs1,
                offset,
                width,
                unsigned,
            } => {
                let addr = self.state.gpr(rs1).wrapping_add_signed(offset);
                events.signal(ModelEvent::Load.kind());
                let raw = self
                    .bus
                    .load(addr, width)
                    .map_err(|exception| Trap::with_tval(exception, addr))?;
                tracing::trace!(target: MEM, "load {addr:#x} -> {raw:#x}");
                self.frame.mem_addr = addr;
                self.frame.mem_rmask = width.mask();
                self.frame.mem_rdata = raw;
                let value = if unsigned { raw } else { sign_extend(raw, width) };
                self.write_rd(rd, value);
                Ok(next)
            }
            Instruction::Store {
                rs1,
                rs2,
                offset,
                width,
            } => {
                let addr = self.state.gpr(rs1).wrapping_add_signed(offset);
                let value = self.state.gpr(rs2) & width.value_mask();
                events.signal(ModelEvent::Store.kind());
                self.bus
                    .store(addr, width, value)
                    .map_err(|exception| Trap::with_tval(exception, addr))?;
                tracing::trace!(target: MEM, "store {addr:#x} <- {value:#x}");
                self.frame.mem_addr = addr;
                self.frame.mem_wmask = width.mask();
                self.frame.mem_wdata = value;
                self.tohost_write(addr, value);
                Ok(next)
            }
            Instruction::OpImm { op, rd, rs1, imm } => {
                self.write_rd(rd, op.apply(self.state.gpr(rs1), imm as u64));
                Ok(next)
            }
            Instruction::OpImm32 { op, rd, rs1, imm } => {
                self.write_rd(rd, op.apply_word(self.state.gpr(rs1), imm as u64));
                Ok(next)
            }
            Instruction::Op { op, rd, rs1, rs2 } => {
                self.write_rd(rd, op.apply(self.state.gpr(rs1), self.state.gpr(rs2)));
                Ok(next)
            }
            Instruction::Op32 { op, rd, rs1, rs2 } => {
                self.write_rd(rd, op.apply_word(self.state.gpr(rs1), self.state.gpr(rs2)));
                Ok(next)
            }
            Instruction::Fence => Ok(next),
            Instruction::Ecall => {
                events.signal(ModelEvent::EnvironmentCall.kind());
                Err(Exception::ecall_from(self.state.privilege()).into())
            }
            Instruction::Ebreak => Err(Trap::with_tval(Exception::Breakpoint, pc).into()),
            Instruction::Mret => self.mret(),
            Instruction::Sret => self.sret(),
            Instruction::Wfi => {
                let privilege = self.state.privilege();
                let trapped = privilege == Privilege::User
                    || (privilege == Privilege::Supervisor
                        && self.state.csr.mstatus & mstatus::TW != 0);
                if trapped {
                    return Err(Exception::IllegalInstruction.into());
                }
                Ok(next)
            }
            Instruction::Csr {
                op,
                rd,
                source,
                csr,
            } => {
                events.signal(ModelEvent::CsrAccess.kind());
                self.csr_instruction(op, rd, source, csr, events)?;
                Ok(next)
            }
        }
    }

    fn write_rd(&mut self, rd: Gpr, value: u64) {
        if rd == Gpr::ZERO {
            return;
        }
        self.state.set_gpr(rd, value);
        self.frame.rd_addr = rd.number();
        self.frame.rd_wdata = value;
        tracing::trace!(target: REG, "{} <- {value:#018x}", rd.name());
    }

    fn check_target(&self, target: u64) -> Result<(), Trap> {
        let mask = if compressed_enabled(&self.state) { 0b1 } else { 0b11 };
        if target & mask != 0 {
            return Err(Trap::with_tval(
                Exception::InstructionAddressMisaligned,
                target,
            ));
        }
        Ok(())
    }

    fn tohost_write(&mut self, addr: u64, value: u64) {
        if self.tohost != Some(addr) {
            return;
        }
        if let Some(code) = self.htif.handle(value) {
            self.state.halt(code);
        }
    }

    fn csr_instruction(
        &mut self,
        op: CsrOp,
        rd: Gpr,
        source: CsrSource,
        address: u16,
        events: &mut EventMultiplexer,
    ) -> Result<(), Fault> {
        let (operand, zero_source) = match source {
            CsrSource::Register(reg) => (self.state.gpr(reg), reg == Gpr::ZERO),
            CsrSource::Immediate(value) => (value, value == 0),
        };
        let writes = op == CsrOp::ReadWrite || !zero_source;
        let reads = op != CsrOp::ReadWrite || rd != Gpr::ZERO;
        let old = if reads {
            csr::read(&self.state, &self.policy, self.mtime(), address)?
        } else {
            0
        };
        if writes {
            let new = match op {
                CsrOp::ReadWrite => operand,
                CsrOp::ReadSet => old | operand,
                CsrOp::ReadClear => old & !operand,
            };
            csr::write(&mut self.state, &self.policy, events, address, new)?;
        }
        self.write_rd(rd, old);
        Ok(())
    }

    fn mret(&mut self) -> Result<u64, Fault> {
        if self.state.privilege() != Privilege::Machine {
            return Err(Exception::IllegalInstruction.into());
        }
        let status = self.state.csr.mstatus;
        let mpp = ((status & mstatus::MPP) >> mstatus::MPP_SHIFT) as u8;
        let target = Privilege::from_encoding(mpp).ok_or(ModelError::InvalidPrivilege(mpp))?;
        let mut updated = status & !(mstatus::MIE | mstatus::MPP);
        if status & mstatus::MPIE != 0 {
            updated |= mstatus::MIE;
        }
        updated |= mstatus::MPIE;
        if target != Privilege::Machine {
            updated &= !mstatus::MPRV;
        }
        self.state.csr.mstatus = updated;
        self.state.set_privilege(target);
        Ok(self.state.csr.mepc)
    }

    fn sret(&mut self) -> Result<u64, Fault> {
        let status = self.state.csr.mstatus;
        let trapped = match self.state.privilege() {
            Privilege::User => true,
            Privilege::Supervisor => status & mstatus::TSR != 0,
            Privilege::Machine => false,
        };
        if trapped {
            return Err(Exception::IllegalInstruction.into());
        }
        let target = if status & mstatus::SPP == 0 {
            Privilege::User
        } else {
            Privilege::Supervisor
        };
        let mut updated = status & !(mstatus::SIE | mstatus::SPP | mstatus::MPRV);
        if status & mstatus::SPIE != 0 {
            updated |= mstatus::SIE;
        }
        updated |= mstatus::SPIE;
        self.state.csr.mstatus = updated;
        self.state.set_privilege(target);
        Ok(self.state.csr.sepc)
    }

    /// Redirects to the trap handler, delegating to supervisor mode when
    /// `medeleg` asks for it and the hart is below machine mode.
    pub(crate) fn take_trap(&mut self, trap: Trap, pc: u64) {
        let code = trap.exception.code();
        let privilege = self.state.privilege();
        let delegated =
            privilege != Privilege::Machine && (self.state.csr.medeleg >> code) & 1 == 1;
        if !delegated {
            self.enter_machine(code, trap.tval, pc);
            self.state.set_pc(self.state.csr.mtvec & !0b11);
            return;
        }

        let csr = &mut self.state.csr;
        csr.scause = code;
        csr.sepc = pc;
        csr.stval = trap.tval;
        let status = csr.mstatus;
        let mut updated = status & !(mstatus::SIE | mstatus::SPIE | mstatus::SPP);
        if status & mstatus::SIE != 0 {
            updated |= mstatus::SPIE;
        }
        if privilege == Privilege::Supervisor {
            updated |= mstatus::SPP;
        }
        csr.mstatus = updated;
        let handler = csr.stvec & !0b11;
        self.state.set_privilege(Privilege::Supervisor);
        self.state.set_pc(handler);
    }

    fn enter_machine(&mut self, cause: u64, tval: u64, pc: u64) {
        let privilege = self.state.privilege();
        let csr = &mut self.state.csr;
        csr.mcause = cause;
        csr.mepc = pc;
        csr.mtval = tval;
        let status = csr.mstatus;
        let mut updated = status & !(mstatus::MIE | mstatus::MPIE | mstatus::MPP);
        if status & mstatus::MIE != 0 {
            updated |= mstatus::MPIE;
        }
        updated |= u64::from(privilege.encoding()) << mstatus::MPP_SHIFT;
        csr.mstatus = updated;
        self.state.set_privilege(Privilege::Machine);
    }

    /// Takes a pending, enabled machine timer interrupt; returns `true` when
    /// the hart was redirected and no instruction executed this step.
    pub(crate) fn take_pending_interrupt(&mut self) -> bool {
        let csr = &self.state.csr;
        if csr.mip & csr.mie & MTIP == 0 {
            return false;
        }
        let enabled = self.state.privilege() != Privilege::Machine
            || csr.mstatus & mstatus::MIE != 0;
        if !enabled {
            return false;
        }
        let pc = self.state.pc();
        self.enter_machine(MACHINE_TIMER_INTERRUPT, 0, pc);
        let mtvec = self.state.csr.mtvec;
        let base = mtvec & !0b11;
        let handler = if mtvec & 0b1 == 1 {
            base.wrapping_add(4 * (MACHINE_TIMER_INTERRUPT & 0xFF))
        } else {
            base
        };
        self.state.set_pc(handler);
        self.interrupt_taken = true;
        tracing::debug!(target: PLATFORM, pc, handler, "machine timer interrupt");
        true
    }
}
