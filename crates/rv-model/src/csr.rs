//! Zicsr register file: address decoding, access checks and WARL legalisation
//! on top of the architectural [`CsrBank`](driver_core::CsrBank).

use driver_core::{
    Csr, EventMultiplexer, PlatformConfig, Privilege, SimulationState, HPM_COUNTER_COUNT,
    SSTATUS_MASK,
};

use crate::trap::{Exception, Fault};

/// `mstatus` after reset: UXL = SXL = 64-bit.
pub const MSTATUS_RESET: u64 = 0xA_0000_0000;
/// Software-writable `mstatus` bits.
pub const MSTATUS_WRITABLE: u64 = 0x7E_19AA;

/// `mstatus` field positions.
pub mod mstatus {
    #![allow(missing_docs)]
    pub const SIE: u64 = 1 << 1;
    pub const MIE: u64 = 1 << 3;
    pub const SPIE: u64 = 1 << 5;
    pub const MPIE: u64 = 1 << 7;
    pub const SPP: u64 = 1 << 8;
    pub const MPP_SHIFT: u64 = 11;
    pub const MPP: u64 = 0b11 << MPP_SHIFT;
    pub const MPRV: u64 = 1 << 17;
    pub const TW: u64 = 1 << 21;
    pub const TSR: u64 = 1 << 22;
}

const MIE_WRITABLE: u64 = 0xAAA;
const SUPERVISOR_INTERRUPTS: u64 = 0x222;
const MACHINE_ECALL_BIT: u64 = 1 << 11;

const MHPMCOUNTER_BASE: u16 = 0xB03;
const HPMCOUNTER_BASE: u16 = 0xC03;
const MHPMEVENT_BASE: u16 = 0x323;
const CYCLE: u16 = 0xC00;
const TIME: u16 = 0xC01;
const INSTRET: u16 = 0xC02;
const SIE: u16 = 0x104;
const SCOUNTEREN: u16 = 0x106;
const SIP: u16 = 0x144;
const MCOUNTEREN: u16 = 0x306;
const PMP_FIRST: u16 = 0x3A0;
const PMP_LAST: u16 = 0x3EF;
const MVENDORID: u16 = 0xF11;
const MIMPID: u16 = 0xF13;

/// Platform switches that change CSR behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct CsrPolicy {
    /// `misa.C` starts set.
    pub rvc: bool,
    /// `misa` accepts writes to its C bit.
    pub writable_misa: bool,
    /// `misa.F`/`misa.D` are reported.
    pub fdext: bool,
    /// PMP registers exist (read as zero, writes ignored).
    pub pmp: bool,
}

impl CsrPolicy {
    /// Derives the policy from platform switches.
    #[must_use]
    pub const fn from_platform(platform: &PlatformConfig) -> Self {
        Self {
            rvc: platform.enable_rvc,
            writable_misa: platform.enable_writable_misa,
            fdext: platform.enable_fdext,
            pmp: platform.enable_pmp,
        }
    }

    /// Reset value of `misa`: RV64 with I, S, U and the enabled extensions.
    #[must_use]
    pub const fn reset_misa(&self) -> u64 {
        let mut misa = (2 << 62) | misa_bit(b'I') | misa_bit(b'S') | misa_bit(b'U');
        if self.rvc {
            misa |= misa_bit(b'C');
        }
        if self.fdext {
            misa |= misa_bit(b'F') | misa_bit(b'D');
        }
        misa
    }
}

/// `misa` bit of extension `letter`.
#[must_use]
pub const fn misa_bit(letter: u8) -> u64 {
    1 << (letter - b'A')
}

/// `true` when compressed instructions are currently enabled.
#[must_use]
pub const fn compressed_enabled(state: &SimulationState) -> bool {
    state.csr.misa & misa_bit(b'C') != 0
}

fn check_access(privilege: Privilege, address: u16, write: bool) -> Result<(), Exception> {
    if u16::from(privilege.encoding()) < (address >> 8) & 0b11 {
        return Err(Exception::IllegalInstruction);
    }
    if write && (address >> 10) & 0b11 == 0b11 {
        return Err(Exception::IllegalInstruction);
    }
    Ok(())
}

fn hpm_index(address: u16, base: u16) -> Option<usize> {
    let index = usize::from(address.checked_sub(base)?);
    (index < HPM_COUNTER_COUNT).then_some(index)
}

/// Reads CSR `address` as the instruction at the current privilege would.
///
/// # Errors
///
/// Returns [`Exception::IllegalInstruction`] for unknown addresses and
/// insufficient privilege.
pub fn read(
    state: &SimulationState,
    policy: &CsrPolicy,
    mtime: u64,
    address: u16,
) -> Result<u64, Exception> {
    check_access(state.privilege(), address, false)?;
    let bank = &state.csr;
    if let Some(csr) = Csr::from_address(address) {
        return Ok(bank.read(csr));
    }
    if let Some(index) = hpm_index(address, MHPMCOUNTER_BASE)
        .or_else(|| hpm_index(address, HPMCOUNTER_BASE))
    {
        return Ok(bank.hpm.counters()[index]);
    }
    if let Some(index) = hpm_index(address, MHPMEVENT_BASE) {
        return Ok(bank.hpm.selectors()[index]);
    }
    match address {
        CYCLE => Ok(bank.mcycle),
        TIME => Ok(mtime),
        INSTRET => Ok(bank.minstret),
        SIE => Ok(bank.mie & bank.mideleg),
        SIP => Ok(bank.mip & bank.mideleg),
        SCOUNTEREN | MCOUNTEREN | MVENDORID..=MIMPID => Ok(0),
        PMP_FIRST..=PMP_LAST if policy.pmp => Ok(0),
        _ => Err(Exception::IllegalInstruction),
    }
}

/// Writes CSR `address`, legalising WARL fields.
///
/// Selector writes go through the HPM register file so `events` stays in
/// step with the selectors.
///
/// # Errors
///
/// Returns an illegal-instruction trap for unknown, read-only or privileged
/// addresses, and a model fault if selector bookkeeping fails.
pub(crate) fn write(
    state: &mut SimulationState,
    policy: &CsrPolicy,
    events: &mut EventMultiplexer,
    address: u16,
    value: u64,
) -> Result<(), Fault> {
    check_access(state.privilege(), address, true)?;
    if let Some(index) = hpm_index(address, MHPMEVENT_BASE) {
        state.csr.hpm.write_selector(index, value, events)?;
        return Ok(());
    }
    if let Some(index) = hpm_index(address, MHPMCOUNTER_BASE) {
        state.csr.hpm.set_counter(index, value)?;
        return Ok(());
    }
    let bank = &mut state.csr;
    match address {
        SIE => {
            bank.mie = (bank.mie & !bank.mideleg) | (value & bank.mideleg);
            return Ok(());
        }
        SIP => {
            let mask = bank.mideleg & SUPERVISOR_INTERRUPTS;
            bank.mip = (bank.mip & !mask) | (value & mask);
            return Ok(());
        }
        SCOUNTEREN | MCOUNTEREN => return Ok(()),
        PMP_FIRST..=PMP_LAST if policy.pmp => return Ok(()),
        _ => {}
    }
    let csr = Csr::from_address(address).ok_or(Exception::IllegalInstruction)?;
    let legal = match csr {
        Csr::Mstatus => legalize_mstatus(bank.mstatus, value, MSTATUS_WRITABLE),
        Csr::Sstatus => {
            let mask = SSTATUS_MASK & MSTATUS_WRITABLE;
            (bank.mstatus & !mask) | (value & mask)
        }
        Csr::Misa => {
            if !policy.writable_misa {
                return Ok(());
            }
            let c = misa_bit(b'C');
            (bank.misa & !c) | (value & c)
        }
        Csr::Medeleg => value & !MACHINE_ECALL_BIT,
        Csr::Mideleg => value & SUPERVISOR_INTERRUPTS,
        Csr::Mie => value & MIE_WRITABLE,
        Csr::Mip => (bank.mip & !SUPERVISOR_INTERRUPTS) | (value & SUPERVISOR_INTERRUPTS),
        Csr::Mtvec | Csr::Stvec => value & !0b10,
        Csr::Mepc | Csr::Sepc => {
            let align = if policy.rvc { 1 } else { 0b11 };
            value & !align
        }
        Csr::Satp => {
            if value >> 60 != 0 {
                return Ok(());
            }
            value
        }
        _ => value,
    };
    let target = if csr == Csr::Sstatus { Csr::Mstatus } else { csr };
    bank.write(target, legal);
    Ok(())
}

/// Merges `value` into `mstatus` under `mask`; the reserved MPP encoding
/// falls back to user mode.
#[must_use]
pub const fn legalize_mstatus(current: u64, value: u64, mask: u64) -> u64 {
    let mut merged = (current & !mask) | (value & mask);
    if (merged & mstatus::MPP) >> mstatus::MPP_SHIFT == 2 {
        merged &= !mstatus::MPP;
    }
    merged
}
