//! Run and platform configuration.
//!
//! Both structs are built once during startup (CLI flags layered over an
//! optional config file) and are read-only for the rest of the process.

use crate::SetupError;

/// Default number of retired instructions between platform clock ticks.
pub const DEFAULT_INSNS_PER_TICK: u64 = 100;
/// Default RAM base address for image-driven runs.
pub const DEFAULT_RAM_BASE: u64 = 0x8000_0000;
/// Default RAM size (64 MiB).
pub const DEFAULT_RAM_SIZE: u64 = 64 << 20;
/// RAM base used by the remote instruction protocol.
pub const PROTOCOL_RAM_BASE: u64 = 0x8000_0000;
/// RAM size used by the remote instruction protocol.
pub const PROTOCOL_RAM_SIZE: u64 = 0x80_0000;

/// Trace categories that can be toggled independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum TraceCategory {
    /// Per-instruction execution trace.
    Instr,
    /// Register writes.
    Reg,
    /// Memory accesses.
    Mem,
    /// Platform devices (clock ticks, HTIF).
    Platform,
}

impl TraceCategory {
    /// Every category, in display order.
    pub const ALL: [Self; 4] = [Self::Instr, Self::Reg, Self::Mem, Self::Platform];

    /// Returns the `tracing` target events of this category are emitted under.
    #[must_use]
    pub const fn target(self) -> &'static str {
        match self {
            Self::Instr => "rvsim::instr",
            Self::Reg => "rvsim::reg",
            Self::Mem => "rvsim::mem",
            Self::Platform => "rvsim::platform",
        }
    }

    /// Parses a category name as accepted on the command line.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "instr" => Some(Self::Instr),
            "reg" => Some(Self::Reg),
            "mem" => Some(Self::Mem),
            "platform" => Some(Self::Platform),
            _ => None,
        }
    }
}

/// Per-category trace switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[allow(clippy::struct_excessive_bools)]
pub struct TraceConfig {
    /// Instruction trace.
    pub instr: bool,
    /// Register trace.
    pub reg: bool,
    /// Memory-access trace.
    pub mem: bool,
    /// Platform trace.
    pub platform: bool,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            instr: true,
            reg: true,
            mem: true,
            platform: true,
        }
    }
}

impl TraceConfig {
    /// Sets one category, or every category when `name` is `None` or `"all"`.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError::UnknownTraceCategory`] for any other name.
    pub fn set(&mut self, name: Option<&str>, enabled: bool) -> Result<(), SetupError> {
        match name {
            None | Some("all") => {
                for category in TraceCategory::ALL {
                    self.set_category(category, enabled);
                }
                Ok(())
            }
            Some(other) => {
                let category = TraceCategory::from_name(other)
                    .ok_or_else(|| SetupError::UnknownTraceCategory(other.to_string()))?;
                self.set_category(category, enabled);
                Ok(())
            }
        }
    }

    /// Sets a single category.
    pub const fn set_category(&mut self, category: TraceCategory, enabled: bool) {
        match category {
            TraceCategory::Instr => self.instr = enabled,
            TraceCategory::Reg => self.reg = enabled,
            TraceCategory::Mem => self.mem = enabled,
            TraceCategory::Platform => self.platform = enabled,
        }
    }

    /// Returns `true` when `category` is enabled.
    #[must_use]
    pub const fn is_enabled(&self, category: TraceCategory) -> bool {
        match category {
            TraceCategory::Instr => self.instr,
            TraceCategory::Reg => self.reg,
            TraceCategory::Mem => self.mem,
            TraceCategory::Platform => self.platform,
        }
    }

    /// Returns the `tracing` targets of every enabled category.
    pub fn enabled_targets(&self) -> impl Iterator<Item = &'static str> + '_ {
        TraceCategory::ALL
            .into_iter()
            .filter(|category| self.is_enabled(*category))
            .map(TraceCategory::target)
    }
}

/// Immutable run configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RunConfig {
    /// Retired-instruction limit for the whole process, summed over every
    /// run sharing one [`crate::RunStats`]; `0` means unlimited.
    pub insn_limit: u64,
    /// Lock-step the primary model against a reference model.
    pub tandem: bool,
    /// Loopback port for the remote instruction protocol; `None` runs the
    /// resident program image.
    pub protocol_port: Option<u16>,
    /// Retired instructions per platform clock tick, unless the reference
    /// model supplies its own value.
    pub insns_per_tick: u64,
    /// Report timing and throughput on completion.
    pub show_times: bool,
    /// Trace category switches.
    pub trace: TraceConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            insn_limit: 0,
            tandem: false,
            protocol_port: None,
            insns_per_tick: DEFAULT_INSNS_PER_TICK,
            show_times: false,
            trace: TraceConfig::default(),
        }
    }
}

impl RunConfig {
    /// Returns `true` when instructions arrive over the remote protocol.
    #[must_use]
    pub const fn protocol_mode(&self) -> bool {
        self.protocol_port.is_some()
    }

    /// Returns `true` once `retired` has reached a non-zero instruction limit.
    #[must_use]
    pub const fn limit_reached(&self, retired: u64) -> bool {
        self.insn_limit != 0 && retired >= self.insn_limit
    }

    /// Checks internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError::ZeroInsnsPerTick`] when ticks could never fire and
    /// [`SetupError::TandemWithProtocol`] when both run modes are requested.
    pub const fn validate(&self) -> Result<(), SetupError> {
        if self.insns_per_tick == 0 {
            return Err(SetupError::ZeroInsnsPerTick);
        }
        if self.tandem && self.protocol_port.is_some() {
            return Err(SetupError::TandemWithProtocol);
        }
        Ok(())
    }
}

/// Platform memory layout and optional ISA switches.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[allow(clippy::struct_excessive_bools)]
pub struct PlatformConfig {
    /// RAM base address.
    pub ram_base: u64,
    /// RAM size in bytes.
    pub ram_size: u64,
    /// Hardware update of page-table dirty bits.
    pub enable_dirty_update: bool,
    /// Misaligned data accesses complete instead of trapping.
    pub enable_misaligned: bool,
    /// Physical memory protection.
    pub enable_pmp: bool,
    /// Compressed instructions.
    pub enable_rvc: bool,
    /// `misa` accepts writes.
    pub enable_writable_misa: bool,
    /// F and D extensions.
    pub enable_fdext: bool,
    /// `mtval` receives the faulting encoding on illegal-instruction traps.
    pub mtval_has_illegal_inst_bits: bool,
    /// Place a boot ROM with a reset vector ahead of RAM.
    pub boot_rom: bool,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            ram_base: DEFAULT_RAM_BASE,
            ram_size: DEFAULT_RAM_SIZE,
            enable_dirty_update: false,
            enable_misaligned: false,
            enable_pmp: false,
            enable_rvc: true,
            enable_writable_misa: true,
            enable_fdext: true,
            mtval_has_illegal_inst_bits: false,
            boot_rom: true,
        }
    }
}

impl PlatformConfig {
    /// Layout used by the remote instruction protocol: RAM only, execution
    /// starting at the RAM base.
    #[must_use]
    pub fn protocol() -> Self {
        Self {
            ram_base: PROTOCOL_RAM_BASE,
            ram_size: PROTOCOL_RAM_SIZE,
            boot_rom: false,
            ..Self::default()
        }
    }

    /// Sets the RAM size from a MiB count.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError::InvalidRamSize`] for zero or overflowing sizes.
    pub fn set_ram_size_mib(&mut self, mib: u64) -> Result<(), SetupError> {
        if mib == 0 {
            return Err(SetupError::InvalidRamSize(mib));
        }
        self.ram_size = mib
            .checked_mul(1 << 20)
            .ok_or(SetupError::InvalidRamSize(mib))?;
        Ok(())
    }

    /// Exclusive end address of RAM.
    #[must_use]
    pub const fn ram_end(&self) -> u64 {
        self.ram_base.saturating_add(self.ram_size)
    }
}

#[cfg(test)]
mod tests {
    use super::{PlatformConfig, RunConfig, TraceCategory, TraceConfig, PROTOCOL_RAM_SIZE};
    use crate::SetupError;

    #[test]
    fn trace_defaults_enable_every_category() {
        let trace = TraceConfig::default();
        assert_eq!(trace.enabled_targets().count(), TraceCategory::ALL.len());
    }

    #[test]
    fn trace_set_toggles_single_and_all_categories() {
        let mut trace = TraceConfig::default();
        trace.set(Some("all"), false).expect("all is a known category");
        assert_eq!(trace.enabled_targets().count(), 0);

        trace.set(Some("mem"), true).expect("mem is a known category");
        assert_eq!(
            trace.enabled_targets().collect::<Vec<_>>(),
            vec!["rvsim::mem"]
        );

        trace.set(None, true).expect("bare toggle applies to all");
        assert!(trace.is_enabled(TraceCategory::Platform));
    }

    #[test]
    fn trace_rejects_unknown_category() {
        let mut trace = TraceConfig::default();
        let err = trace.set(Some("cache"), true).expect_err("unknown category");
        assert!(matches!(err, SetupError::UnknownTraceCategory(name) if name == "cache"));
    }

    #[test]
    fn run_config_limit_zero_is_unlimited() {
        let config = RunConfig::default();
        assert!(!config.limit_reached(u64::MAX));

        let limited = RunConfig {
            insn_limit: 3,
            ..RunConfig::default()
        };
        assert!(!limited.limit_reached(2));
        assert!(limited.limit_reached(3));
    }

    #[test]
    fn run_config_validation_rejects_zero_tick_and_mixed_modes() {
        let zero_tick = RunConfig {
            insns_per_tick: 0,
            ..RunConfig::default()
        };
        assert!(matches!(
            zero_tick.validate(),
            Err(SetupError::ZeroInsnsPerTick)
        ));

        let mixed = RunConfig {
            tandem: true,
            protocol_port: Some(1234),
            ..RunConfig::default()
        };
        assert!(matches!(
            mixed.validate(),
            Err(SetupError::TandemWithProtocol)
        ));
        assert!(RunConfig::default().validate().is_ok());
    }

    #[test]
    fn protocol_layout_has_no_boot_rom() {
        let platform = PlatformConfig::protocol();
        assert_eq!(platform.ram_size, PROTOCOL_RAM_SIZE);
        assert!(!platform.boot_rom);
        assert_eq!(platform.ram_end(), 0x8080_0000);
    }

    #[test]
    fn ram_size_is_given_in_mib() {
        let mut platform = PlatformConfig::default();
        platform.set_ram_size_mib(16).expect("valid size");
        assert_eq!(platform.ram_size, 16 << 20);
        assert!(matches!(
            platform.set_ram_size_mib(0),
            Err(SetupError::InvalidRamSize(0))
        ));
    }
}
