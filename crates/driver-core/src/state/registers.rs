use super::{CsrBank, Privilege};

/// Number of integer registers (`x0..x31`).
pub const GPR_COUNT: usize = 32;

const GPR_NAMES: [&str; GPR_COUNT] = [
    "x0", "x1", "x2", "x3", "x4", "x5", "x6", "x7", "x8", "x9", "x10", "x11", "x12", "x13",
    "x14", "x15", "x16", "x17", "x18", "x19", "x20", "x21", "x22", "x23", "x24", "x25", "x26",
    "x27", "x28", "x29", "x30", "x31",
];

/// Integer register identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Gpr(u8);

impl Gpr {
    /// Hard-wired zero register.
    pub const ZERO: Self = Self(0);
    /// Return address (`ra`).
    pub const RA: Self = Self(1);
    /// First argument / return value (`a0`).
    pub const A0: Self = Self(10);
    /// Second argument (`a1`).
    pub const A1: Self = Self(11);

    /// Every register, `x0` first.
    #[allow(clippy::cast_possible_truncation)]
    pub const ALL: [Self; GPR_COUNT] = {
        let mut all = [Self(0); GPR_COUNT];
        let mut i = 0;
        while i < GPR_COUNT {
            all[i] = Self(i as u8);
            i += 1;
        }
        all
    };

    /// Decodes a 5-bit register field; upper bits are ignored.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn from_u5(bits: u32) -> Self {
        Self((bits & 0x1F) as u8)
    }

    /// Array index (`0..=31`).
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Register number as it appears in an encoding.
    #[must_use]
    pub const fn number(self) -> u8 {
        self.0
    }

    /// `xN` name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        GPR_NAMES[self.0 as usize]
    }
}

/// Architectural state of the primary model for one run.
///
/// Mutated only by the model's step; the scheduler and comparator read it.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct SimulationState {
    pc: u64,
    gpr: [u64; GPR_COUNT],
    privilege: Privilege,
    /// Control/status registers.
    pub csr: CsrBank,
    halted: bool,
    exit_code: u64,
    instructions: u64,
}

impl Default for SimulationState {
    fn default() -> Self {
        Self::new(0)
    }
}

impl SimulationState {
    /// Creates a machine-mode reset state starting at `pc`.
    #[must_use]
    pub fn new(pc: u64) -> Self {
        Self {
            pc,
            gpr: [0; GPR_COUNT],
            privilege: Privilege::Machine,
            csr: CsrBank::default(),
            halted: false,
            exit_code: 0,
            instructions: 0,
        }
    }

    /// Program counter.
    #[must_use]
    pub const fn pc(&self) -> u64 {
        self.pc
    }

    /// Sets the program counter.
    pub const fn set_pc(&mut self, pc: u64) {
        self.pc = pc;
    }

    /// Reads an integer register; `x0` always reads zero.
    #[must_use]
    pub const fn gpr(&self, reg: Gpr) -> u64 {
        self.gpr[reg.index()]
    }

    /// Writes an integer register; writes to `x0` are discarded.
    pub const fn set_gpr(&mut self, reg: Gpr, value: u64) {
        if reg.index() != 0 {
            self.gpr[reg.index()] = value;
        }
    }

    /// Current privilege mode.
    #[must_use]
    pub const fn privilege(&self) -> Privilege {
        self.privilege
    }

    /// Changes privilege mode.
    pub const fn set_privilege(&mut self, privilege: Privilege) {
        self.privilege = privilege;
    }

    /// `true` once the program has signalled completion.
    #[must_use]
    pub const fn halted(&self) -> bool {
        self.halted
    }

    /// Exit code reported with completion.
    #[must_use]
    pub const fn exit_code(&self) -> u64 {
        self.exit_code
    }

    /// Marks the run complete with `exit_code`.
    pub const fn halt(&mut self, exit_code: u64) {
        self.halted = true;
        self.exit_code = exit_code;
    }

    /// Retired-instruction count.
    #[must_use]
    pub const fn instructions(&self) -> u64 {
        self.instructions
    }

    /// Counts one retired instruction.
    pub const fn retire(&mut self) {
        self.instructions = self.instructions.wrapping_add(1);
    }
}
