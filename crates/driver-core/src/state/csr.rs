//! Control/status register identifiers and backing storage.
//!
//! Storage only: legality and WARL behaviour belong to the model that owns the
//! bank.

use crate::HpmRegisterFile;

/// Bits of `mstatus` visible through `sstatus` (RV64).
pub const SSTATUS_MASK: u64 = 0x8000_0003_000D_E762;

/// Named control/status registers with their 12-bit addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
#[allow(missing_docs)]
pub enum Csr {
    Sstatus = 0x100,
    Stvec = 0x105,
    Sscratch = 0x140,
    Sepc = 0x141,
    Scause = 0x142,
    Stval = 0x143,
    Satp = 0x180,
    Mstatus = 0x300,
    Misa = 0x301,
    Medeleg = 0x302,
    Mideleg = 0x303,
    Mie = 0x304,
    Mtvec = 0x305,
    Mcountinhibit = 0x320,
    Mscratch = 0x340,
    Mepc = 0x341,
    Mcause = 0x342,
    Mtval = 0x343,
    Mip = 0x344,
    Mcycle = 0xB00,
    Minstret = 0xB02,
    Mhartid = 0xF14,
}

impl Csr {
    /// Every named register.
    pub const ALL: [Self; 22] = [
        Self::Sstatus,
        Self::Stvec,
        Self::Sscratch,
        Self::Sepc,
        Self::Scause,
        Self::Stval,
        Self::Satp,
        Self::Mstatus,
        Self::Misa,
        Self::Medeleg,
        Self::Mideleg,
        Self::Mie,
        Self::Mtvec,
        Self::Mcountinhibit,
        Self::Mscratch,
        Self::Mepc,
        Self::Mcause,
        Self::Mtval,
        Self::Mip,
        Self::Mcycle,
        Self::Minstret,
        Self::Mhartid,
    ];

    /// Returns the 12-bit CSR address.
    #[must_use]
    pub const fn address(self) -> u16 {
        self as u16
    }

    /// Looks up a named register by address.
    #[must_use]
    pub fn from_address(address: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|csr| csr.address() == address)
    }

    /// Lower-case mnemonic.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Sstatus => "sstatus",
            Self::Stvec => "stvec",
            Self::Sscratch => "sscratch",
            Self::Sepc => "sepc",
            Self::Scause => "scause",
            Self::Stval => "stval",
            Self::Satp => "satp",
            Self::Mstatus => "mstatus",
            Self::Misa => "misa",
            Self::Medeleg => "medeleg",
            Self::Mideleg => "mideleg",
            Self::Mie => "mie",
            Self::Mtvec => "mtvec",
            Self::Mcountinhibit => "mcountinhibit",
            Self::Mscratch => "mscratch",
            Self::Mepc => "mepc",
            Self::Mcause => "mcause",
            Self::Mtval => "mtval",
            Self::Mip => "mip",
            Self::Mcycle => "mcycle",
            Self::Minstret => "minstret",
            Self::Mhartid => "mhartid",
        }
    }
}

/// Backing storage for the named CSRs plus the HPM counter/selector file.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[allow(missing_docs)]
pub struct CsrBank {
    pub mstatus: u64,
    pub misa: u64,
    pub medeleg: u64,
    pub mideleg: u64,
    pub mie: u64,
    pub mip: u64,
    pub mtvec: u64,
    pub mscratch: u64,
    pub mepc: u64,
    pub mcause: u64,
    pub mtval: u64,
    pub stvec: u64,
    pub sscratch: u64,
    pub sepc: u64,
    pub scause: u64,
    pub stval: u64,
    pub satp: u64,
    pub mhartid: u64,
    pub mcycle: u64,
    pub minstret: u64,
    /// `mhpmcounter3..31`, `mhpmevent3..31` and `mcountinhibit`.
    pub hpm: HpmRegisterFile,
}

impl CsrBank {
    /// Reads a named register; `sstatus` is the masked view of `mstatus`.
    #[must_use]
    pub const fn read(&self, csr: Csr) -> u64 {
        match csr {
            Csr::Sstatus => self.mstatus & SSTATUS_MASK,
            Csr::Stvec => self.stvec,
            Csr::Sscratch => self.sscratch,
            Csr::Sepc => self.sepc,
            Csr::Scause => self.scause,
            Csr::Stval => self.stval,
            Csr::Satp => self.satp,
            Csr::Mstatus => self.mstatus,
            Csr::Misa => self.misa,
            Csr::Medeleg => self.medeleg,
            Csr::Mideleg => self.mideleg,
            Csr::Mie => self.mie,
            Csr::Mtvec => self.mtvec,
            Csr::Mcountinhibit => self.hpm.inhibit() as u64,
            Csr::Mscratch => self.mscratch,
            Csr::Mepc => self.mepc,
            Csr::Mcause => self.mcause,
            Csr::Mtval => self.mtval,
            Csr::Mip => self.mip,
            Csr::Mcycle => self.mcycle,
            Csr::Minstret => self.minstret,
            Csr::Mhartid => self.mhartid,
        }
    }

    /// Stores a value without legality checks; `sstatus` merges into `mstatus`.
    #[allow(clippy::cast_possible_truncation)]
    pub const fn write(&mut self, csr: Csr, value: u64) {
        match csr {
            Csr::Sstatus => {
                self.mstatus = (self.mstatus & !SSTATUS_MASK) | (value & SSTATUS_MASK);
            }
            Csr::Stvec => self.stvec = value,
            Csr::Sscratch => self.sscratch = value,
            Csr::Sepc => self.sepc = value,
            Csr::Scause => self.scause = value,
            Csr::Stval => self.stval = value,
            Csr::Satp => self.satp = value,
            Csr::Mstatus => self.mstatus = value,
            Csr::Misa => self.misa = value,
            Csr::Medeleg => self.medeleg = value,
            Csr::Mideleg => self.mideleg = value,
            Csr::Mie => self.mie = value,
            Csr::Mtvec => self.mtvec = value,
            Csr::Mcountinhibit => self.hpm.set_inhibit(value as u32),
            Csr::Mscratch => self.mscratch = value,
            Csr::Mepc => self.mepc = value,
            Csr::Mcause => self.mcause = value,
            Csr::Mtval => self.mtval = value,
            Csr::Mip => self.mip = value,
            Csr::Mcycle => self.mcycle = value,
            Csr::Minstret => self.minstret = value,
            Csr::Mhartid => self.mhartid = value,
        }
    }
}
