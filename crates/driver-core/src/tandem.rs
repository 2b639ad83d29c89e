//! Lock-step state comparison between the primary and reference models.
//!
//! The compared registers live in one ordered table, [`COMPARED_FIELDS`], so
//! adding or dropping a register is a one-line change. Every entry is checked
//! on every call and all disagreements are returned, not just the first.

use thiserror::Error;

use crate::{
    Csr, Gpr, PlatformConfig, Privilege, ReferenceModel, SettingMismatch, SetupError,
    SimulationState, GPR_COUNT,
};

/// One-sided completion: the two models disagree on whether the program ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TandemError {
    /// The primary model halted while the reference kept running.
    #[error("primary model completed (exit code {exit_code}) but reference model did not")]
    PrimaryOnlyDone {
        /// Exit code reported by the primary model.
        exit_code: u64,
    },
    /// The reference model completed while the primary kept running.
    #[error("reference model completed but primary model did not")]
    ReferenceOnlyDone,
}

/// How a compared value is read from each side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accessor {
    /// Privilege level; the primary's internal numbering is remapped to the
    /// architectural encoding first.
    Privilege,
    /// Program counter.
    Pc,
    /// Integer register.
    Gpr(Gpr),
    /// Control/status register.
    Csr(Csr),
}

impl Accessor {
    /// Value on the primary side.
    #[must_use]
    #[allow(clippy::cast_lossless)]
    pub const fn primary(self, state: &SimulationState) -> u64 {
        match self {
            Self::Privilege => {
                Privilege::remap_internal(state.privilege().internal_level()) as u64
            }
            Self::Pc => state.pc(),
            Self::Gpr(reg) => state.gpr(reg),
            Self::Csr(csr) => state.csr.read(csr),
        }
    }

    /// Value on the reference side.
    #[must_use]
    pub fn reference(self, reference: &dyn ReferenceModel) -> u64 {
        match self {
            Self::Privilege => u64::from(reference.privilege()),
            Self::Pc => reference.pc(),
            Self::Gpr(reg) => reference.gpr(reg),
            Self::Csr(csr) => reference.csr(csr),
        }
    }
}

/// Named entry of the comparison table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComparedField {
    /// Display name.
    pub name: &'static str,
    /// Read-back on both sides.
    pub accessor: Accessor,
}

const COMPARED_CSRS: [Csr; 8] = [
    Csr::Mcause,
    Csr::Mepc,
    Csr::Mtval,
    Csr::Mstatus,
    Csr::Scause,
    Csr::Sepc,
    Csr::Stval,
    Csr::Sstatus,
];

const COMPARED_FIELD_COUNT: usize = 2 + (GPR_COUNT - 1) + COMPARED_CSRS.len();

/// Compared state in check order: privilege, pc, `x1..x31`, then the machine
/// and supervisor trap CSRs.
pub const COMPARED_FIELDS: [ComparedField; COMPARED_FIELD_COUNT] = compared_fields();

const fn compared_fields() -> [ComparedField; COMPARED_FIELD_COUNT] {
    let mut fields = [ComparedField {
        name: "privilege",
        accessor: Accessor::Privilege,
    }; COMPARED_FIELD_COUNT];
    fields[1] = ComparedField {
        name: "pc",
        accessor: Accessor::Pc,
    };
    let mut next = 2;
    let mut reg = 1;
    while reg < GPR_COUNT {
        let gpr = Gpr::ALL[reg];
        fields[next] = ComparedField {
            name: gpr.name(),
            accessor: Accessor::Gpr(gpr),
        };
        next += 1;
        reg += 1;
    }
    let mut i = 0;
    while i < COMPARED_CSRS.len() {
        let csr = COMPARED_CSRS[i];
        fields[next] = ComparedField {
            name: csr.name(),
            accessor: Accessor::Csr(csr),
        };
        next += 1;
        i += 1;
    }
    fields
}

/// A single disagreeing field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mismatch {
    /// Field name from [`COMPARED_FIELDS`].
    pub field: &'static str,
    /// Primary-side value.
    pub primary: u64,
    /// Reference-side value.
    pub reference: u64,
}

/// Outcome of one comparison.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Comparison {
    /// Every disagreeing field in table order.
    pub mismatches: Vec<Mismatch>,
}

impl Comparison {
    /// `true` when both models agree on every compared field.
    #[must_use]
    pub fn agrees(&self) -> bool {
        self.mismatches.is_empty()
    }
}

/// Compares the primary state with the reference model.
///
/// # Errors
///
/// Returns [`TandemError`] when exactly one side reports completion; that is
/// fatal regardless of register agreement.
pub fn compare(
    primary: &SimulationState,
    reference: &dyn ReferenceModel,
) -> Result<Comparison, TandemError> {
    match (primary.halted(), reference.is_done()) {
        (true, false) => {
            return Err(TandemError::PrimaryOnlyDone {
                exit_code: primary.exit_code(),
            })
        }
        (false, true) => return Err(TandemError::ReferenceOnlyDone),
        _ => {}
    }

    let mismatches = COMPARED_FIELDS
        .iter()
        .filter_map(|field| {
            let primary_value = field.accessor.primary(primary);
            let reference_value = field.accessor.reference(reference);
            (primary_value != reference_value).then_some(Mismatch {
                field: field.name,
                primary: primary_value,
                reference: reference_value,
            })
        })
        .collect();
    Ok(Comparison { mismatches })
}

fn on_off(enabled: bool) -> String {
    let label = if enabled { "on" } else { "off" };
    label.to_string()
}

/// Verifies the reference was built with the same platform settings.
///
/// # Errors
///
/// Returns [`SetupError::InconsistentReference`] listing every differing
/// setting.
pub fn check_reference_platform(
    platform: &PlatformConfig,
    reference: &dyn ReferenceModel,
) -> Result<(), SetupError> {
    let Some(settings) = reference.platform() else {
        return Ok(());
    };
    let mut mismatches = Vec::new();
    if settings.dirty_update != platform.enable_dirty_update {
        mismatches.push(SettingMismatch {
            setting: "enable-dirty-update",
            reference: on_off(settings.dirty_update),
            model: on_off(platform.enable_dirty_update),
        });
    }
    if settings.misaligned != platform.enable_misaligned {
        mismatches.push(SettingMismatch {
            setting: "enable-misaligned-access",
            reference: on_off(settings.misaligned),
            model: on_off(platform.enable_misaligned),
        });
    }
    if settings.ram_size != platform.ram_size {
        mismatches.push(SettingMismatch {
            setting: "ram-size",
            reference: format!("{:#x}", settings.ram_size),
            model: format!("{:#x}", platform.ram_size),
        });
    }
    if mismatches.is_empty() {
        Ok(())
    } else {
        Err(SetupError::InconsistentReference(mismatches))
    }
}
