//! RV64I + Zicsr decoder.
//!
//! Only 32-bit encodings are recognised; anything else, including compressed
//! and floating-point encodings, decodes to `None` and raises an
//! illegal-instruction trap in the executor.

#![allow(clippy::cast_possible_wrap, clippy::cast_sign_loss, missing_docs)]

use driver_core::Gpr;

use crate::memory::Width;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BranchKind {
    Eq,
    Ne,
    Lt,
    Ge,
    Ltu,
    Geu,
}

impl BranchKind {
    const fn from_funct3(funct3: u32) -> Option<Self> {
        match funct3 {
            0 => Some(Self::Eq),
            1 => Some(Self::Ne),
            4 => Some(Self::Lt),
            5 => Some(Self::Ge),
            6 => Some(Self::Ltu),
            7 => Some(Self::Geu),
            _ => None,
        }
    }

    /// Evaluates the branch condition.
    #[must_use]
    pub const fn taken(self, a: u64, b: u64) -> bool {
        match self {
            Self::Eq => a == b,
            Self::Ne => a != b,
            Self::Lt => (a as i64) < (b as i64),
            Self::Ge => (a as i64) >= (b as i64),
            Self::Ltu => a < b,
            Self::Geu => a >= b,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AluOp {
    Add,
    Sub,
    Sll,
    Slt,
    Sltu,
    Xor,
    Srl,
    Sra,
    Or,
    And,
}

impl AluOp {
    /// 64-bit result.
    #[must_use]
    pub const fn apply(self, a: u64, b: u64) -> u64 {
        let shamt = (b & 0x3F) as u32;
        match self {
            Self::Add => a.wrapping_add(b),
            Self::Sub => a.wrapping_sub(b),
            Self::Sll => a << shamt,
            Self::Slt => ((a as i64) < (b as i64)) as u64,
            Self::Sltu => (a < b) as u64,
            Self::Xor => a ^ b,
            Self::Srl => a >> shamt,
            Self::Sra => ((a as i64) >> shamt) as u64,
            Self::Or => a | b,
            Self::And => a & b,
        }
    }

    /// 32-bit result sign-extended to 64 bits (`*w` forms).
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn apply_word(self, a: u64, b: u64) -> u64 {
        let a32 = a as u32;
        let shamt = (b & 0x1F) as u32;
        let result = match self {
            Self::Add => a32.wrapping_add(b as u32),
            Self::Sub => a32.wrapping_sub(b as u32),
            Self::Sll => a32 << shamt,
            Self::Srl => a32 >> shamt,
            Self::Sra => ((a32 as i32) >> shamt) as u32,
            _ => 0,
        };
        result as i32 as i64 as u64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CsrOp {
    ReadWrite,
    ReadSet,
    ReadClear,
}

/// Second CSR operand: a register or a 5-bit immediate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CsrSource {
    Register(Gpr),
    Immediate(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Instruction {
    Lui { rd: Gpr, imm: i64 },
    Auipc { rd: Gpr, imm: i64 },
    Jal { rd: Gpr, offset: i64 },
    Jalr { rd: Gpr, rs1: Gpr, offset: i64 },
    Branch { kind: BranchKind, rs1: Gpr, rs2: Gpr, offset: i64 },
    Load { rd: Gpr, rs1: Gpr, offset: i64, width: Width, unsigned: bool },
    Store { rs1: Gpr, rs2: Gpr, offset: i64, width: Width },
    OpImm { op: AluOp, rd: Gpr, rs1: Gpr, imm: i64 },
    OpImm32 { op: AluOp, rd: Gpr, rs1: Gpr, imm: i64 },
    Op { op: AluOp, rd: Gpr, rs1: Gpr, rs2: Gpr },
    Op32 { op: AluOp, rd: Gpr, rs1: Gpr, rs2: Gpr },
    Fence,
    Ecall,
    Ebreak,
    Mret,
    Sret,
    Wfi,
    Csr { op: CsrOp, rd: Gpr, source: CsrSource, csr: u16 },
}

impl Instruction {
    /// Source registers read by the instruction, for execution traces.
    #[must_use]
    pub const fn sources(&self) -> (Option<Gpr>, Option<Gpr>) {
        match *self {
            Self::Jalr { rs1, .. }
            | Self::Load { rs1, .. }
            | Self::OpImm { rs1, .. }
            | Self::OpImm32 { rs1, .. }
            | Self::Csr {
                source: CsrSource::Register(rs1),
                ..
            } => (Some(rs1), None),
            Self::Branch { rs1, rs2, .. }
            | Self::Store { rs1, rs2, .. }
            | Self::Op { rs1, rs2, .. }
            | Self::Op32 { rs1, rs2, .. } => (Some(rs1), Some(rs2)),
            _ => (None, None),
        }
    }
}

const fn rd(word: u32) -> Gpr {
    Gpr::from_u5(word >> 7)
}

const fn rs1(word: u32) -> Gpr {
    Gpr::from_u5(word >> 15)
}

const fn rs2(word: u32) -> Gpr {
    Gpr::from_u5(word >> 20)
}

const fn imm_i(word: u32) -> i64 {
    ((word as i32) >> 20) as i64
}

const fn imm_s(word: u32) -> i64 {
    ((((word as i32) >> 25) << 5) | ((word >> 7) & 0x1F) as i32) as i64
}

const fn imm_b(word: u32) -> i64 {
    let sign = ((word as i32) >> 31) << 12;
    let bit11 = ((word >> 7) & 1) << 11;
    let hi = ((word >> 25) & 0x3F) << 5;
    let lo = ((word >> 8) & 0xF) << 1;
    (sign | (bit11 | hi | lo) as i32) as i64
}

const fn imm_u(word: u32) -> i64 {
    (word & 0xFFFF_F000) as i32 as i64
}

const fn imm_j(word: u32) -> i64 {
    let sign = ((word as i32) >> 31) << 20;
    let mid = word & 0x000F_F000;
    let bit11 = ((word >> 20) & 1) << 11;
    let lo = ((word >> 21) & 0x3FF) << 1;
    (sign | (mid | bit11 | lo) as i32) as i64
}

/// Decodes one 32-bit instruction word.
#[must_use]
pub fn decode(word: u32) -> Option<Instruction> {
    if word & 0b11 != 0b11 {
        return None;
    }
    let funct3 = (word >> 12) & 0x7;
    let funct7 = word >> 25;
    let instruction = match word & 0x7F {
        0x37 => Instruction::Lui {
            rd: rd(word),
            imm: imm_u(word),
        },
        0x17 => Instruction::Auipc {
            rd: rd(word),
            imm: imm_u(word),
        },
        0x6F => Instruction::Jal {
            rd: rd(word),
            offset: imm_j(word),
        },
        0x67 if funct3 == 0 => Instruction::Jalr {
            rd: rd(word),
            rs1: rs1(word),
            offset: imm_i(word),
        },
        0x63 => Instruction::Branch {
            kind: BranchKind::from_funct3(funct3)?,
            rs1: rs1(word),
            rs2: rs2(word),
            offset: imm_b(word),
        },
        0x03 => {
            let (width, unsigned) = match funct3 {
                0 => (Width::Byte, false),
                1 => (Width::Half, false),
                2 => (Width::Word, false),
                3 => (Width::Double, false),
                4 => (Width::Byte, true),
                5 => (Width::Half, true),
                6 => (Width::Word, true),
                _ => return None,
            };
            Instruction::Load {
                rd: rd(word),
                rs1: rs1(word),
                offset: imm_i(word),
                width,
                unsigned,
            }
        }
        0x23 => {
            let width = match funct3 {
                0 => Width::Byte,
                1 => Width::Half,
                2 => Width::Word,
                3 => Width::Double,
                _ => return None,
            };
            Instruction::Store {
                rs1: rs1(word),
                rs2: rs2(word),
                offset: imm_s(word),
                width,
            }
        }
        0x13 => {
            let funct6 = word >> 26;
            let op = match funct3 {
                0 => AluOp::Add,
                1 if funct6 == 0 => AluOp::Sll,
                2 => AluOp::Slt,
                3 => AluOp::Sltu,
                4 => AluOp::Xor,
                5 if funct6 == 0 => AluOp::Srl,
                5 if funct6 == 0x10 => AluOp::Sra,
                6 => AluOp::Or,
                7 => AluOp::And,
                _ => return None,
            };
            let imm = if matches!(op, AluOp::Sll | AluOp::Srl | AluOp::Sra) {
                imm_i(word) & 0x3F
            } else {
                imm_i(word)
            };
            Instruction::OpImm {
                op,
                rd: rd(word),
                rs1: rs1(word),
                imm,
            }
        }
        0x1B => {
            let op = match (funct3, funct7) {
                (0, _) => AluOp::Add,
                (1, 0) => AluOp::Sll,
                (5, 0) => AluOp::Srl,
                (5, 0x20) => AluOp::Sra,
                _ => return None,
            };
            let imm = if op == AluOp::Add {
                imm_i(word)
            } else {
                imm_i(word) & 0x1F
            };
            Instruction::OpImm32 {
                op,
                rd: rd(word),
                rs1: rs1(word),
                imm,
            }
        }
        0x33 => {
            let op = match (funct3, funct7) {
                (0, 0) => AluOp::Add,
                (0, 0x20) => AluOp::Sub,
                (1, 0) => AluOp::Sll,
                (2, 0) => AluOp::Slt,
                (3, 0) => AluOp::Sltu,
                (4, 0) => AluOp::Xor,
                (5, 0) => AluOp::Srl,
                (5, 0x20) => AluOp::Sra,
                (6, 0) => AluOp::Or,
                (7, 0) => AluOp::And,
                _ => return None,
            };
            Instruction::Op {
                op,
                rd: rd(word),
                rs1: rs1(word),
                rs2: rs2(word),
            }
        }
        0x3B => {
            let op = match (funct3, funct7) {
                (0, 0) => AluOp::Add,
                (0, 0x20) => AluOp::Sub,
                (1, 0) => AluOp::Sll,
                (5, 0) => AluOp::Srl,
                (5, 0x20) => AluOp::Sra,
                _ => return None,
            };
            Instruction::Op32 {
                op,
                rd: rd(word),
                rs1: rs1(word),
                rs2: rs2(word),
            }
        }
        0x0F if funct3 <= 1 => Instruction::Fence,
        0x73 => decode_system(word, funct3)?,
        _ => return None,
    };
    Some(instruction)
}

fn decode_system(word: u32, funct3: u32) -> Option<Instruction> {
    let csr = (word >> 20) as u16;
    let op = match funct3 {
        0 => {
            return match word {
                0x0000_0073 => Some(Instruction::Ecall),
                0x0010_0073 => Some(Instruction::Ebreak),
                0x3020_0073 => Some(Instruction::Mret),
                0x1020_0073 => Some(Instruction::Sret),
                0x1050_0073 => Some(Instruction::Wfi),
                _ => None,
            }
        }
        1 | 5 => CsrOp::ReadWrite,
        2 | 6 => CsrOp::ReadSet,
        3 | 7 => CsrOp::ReadClear,
        _ => return None,
    };
    let source = if funct3 >= 5 {
        CsrSource::Immediate(u64::from((word >> 15) & 0x1F))
    } else {
        CsrSource::Register(rs1(word))
    };
    Some(Instruction::Csr {
        op,
        rd: rd(word),
        source,
        csr,
    })
}
