//! Command-line surface.
//!
//! Flags are layered over an optional JSON config file: the file supplies the
//! starting [`RunConfig`] and [`PlatformConfig`], explicit flags win.

use std::ffi::OsString;
use std::path::PathBuf;

use anyhow::bail;
use clap::{ArgAction, ArgMatches, CommandFactory as _, FromArgMatches as _, Parser};
use driver_core::{
    PlatformConfig, RunConfig, SignatureRange, PROTOCOL_RAM_BASE, PROTOCOL_RAM_SIZE,
};
use rv_model::DEFAULT_TOHOST;

use crate::config::ConfigFile;

/// RISC-V instruction-set simulator driver.
#[derive(Debug, Clone, Parser)]
#[command(name = "rvsim", version, about)]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    /// Raw program image, loaded at the RAM base.
    #[arg(value_name = "IMAGE")]
    pub image: Option<PathBuf>,

    /// JSON file with `run` and `platform` sections; flags override it.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Enable hardware update of page-table dirty bits.
    #[arg(short = 'd', long)]
    pub enable_dirty_update: bool,

    /// Let misaligned loads and stores complete instead of trapping.
    #[arg(short = 'm', long)]
    pub enable_misaligned: bool,

    /// Enable physical memory protection registers.
    #[arg(short = 'P', long)]
    pub enable_pmp: bool,

    /// RAM size in MiB.
    #[arg(short = 'z', long, value_name = "MIB")]
    pub ram_size: Option<u64>,

    /// Disable compressed instructions.
    #[arg(short = 'C', long)]
    pub disable_compressed: bool,

    /// Make `misa` read-only.
    #[arg(short = 'I', long)]
    pub disable_writable_misa: bool,

    /// Disable the F and D extensions.
    #[arg(short = 'F', long)]
    pub disable_fdext: bool,

    /// Report the faulting encoding in `mtval` on illegal-instruction traps.
    #[arg(short = 'i', long)]
    pub mtval_has_illegal_inst_bits: bool,

    /// Write HTIF console output to this file.
    #[arg(short = 't', long, value_name = "PATH")]
    pub terminal_log: Option<PathBuf>,

    /// Report initialisation and execution times and throughput.
    #[arg(short = 'p', long)]
    pub show_times: bool,

    /// Print the architecture and exit.
    #[arg(short = 'a', long)]
    pub report_arch: bool,

    /// Write the test signature to this file.
    #[arg(short = 'T', long, value_name = "PATH")]
    pub test_signature: Option<PathBuf>,

    /// First byte of the signature region (hex).
    #[arg(long, value_name = "ADDR", value_parser = parse_hex)]
    pub signature_start: Option<u64>,

    /// One past the last byte of the signature region (hex).
    #[arg(long, value_name = "ADDR", value_parser = parse_hex)]
    pub signature_end: Option<u64>,

    /// Serve the remote instruction-injection protocol on this loopback port.
    #[arg(short = 'r', long = "rvfi-dii", value_name = "PORT")]
    pub rvfi_dii: Option<u16>,

    /// Enable a trace category (instr, reg, mem, platform, all).
    #[arg(
        short = 'v',
        long,
        value_name = "CATEGORY",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "all",
        action = ArgAction::Append
    )]
    pub trace: Vec<String>,

    /// Disable a trace category (instr, reg, mem, platform, all).
    #[arg(
        short = 'V',
        long,
        value_name = "CATEGORY",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "all",
        action = ArgAction::Append
    )]
    pub no_trace: Vec<String>,

    /// Stop after this many retired instructions (0 = unlimited).
    #[arg(short = 'l', long, value_name = "N")]
    pub inst_limit: Option<u64>,

    /// Check every step against a reference model.
    #[arg(long)]
    pub tandem: bool,

    /// Retired instructions per platform clock tick.
    #[arg(long, value_name = "N")]
    pub insns_per_tick: Option<u64>,

    /// Address of the HTIF `tohost` word (hex).
    #[arg(long, value_name = "ADDR", value_parser = parse_hex, default_value = "0x80001000")]
    pub tohost: u64,
}

/// Parses a hexadecimal address with or without a `0x` prefix.
///
/// # Errors
///
/// Returns a message naming the rejected text.
pub fn parse_hex(text: &str) -> Result<u64, String> {
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    u64::from_str_radix(&digits.replace('_', ""), 16)
        .map_err(|err| format!("invalid hex address '{text}': {err}"))
}

/// One `--trace`/`--no-trace` occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceToggle {
    /// Category name, `all` for a bare flag.
    pub category: String,
    /// `true` for `--trace`.
    pub enabled: bool,
}

/// Parsed command line with trace toggles in the order they were given.
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Flag values.
    pub cli: Cli,
    /// Trace toggles, applied left to right.
    pub toggles: Vec<TraceToggle>,
}

fn toggles_of(matches: &ArgMatches, id: &str, enabled: bool) -> Vec<(usize, TraceToggle)> {
    let (Some(indices), Some(values)) = (
        matches.indices_of(id),
        matches.get_many::<String>(id),
    ) else {
        return Vec::new();
    };
    indices
        .zip(values)
        .map(|(index, category)| {
            (
                index,
                TraceToggle {
                    category: category.clone(),
                    enabled,
                },
            )
        })
        .collect()
}

/// Parses `args` (including the program name).
///
/// # Errors
///
/// Returns the clap error for malformed input, `--help` and `--version`.
pub fn parse<I, T>(args: I) -> Result<Invocation, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let matches = Cli::command().try_get_matches_from(args)?;
    let cli = Cli::from_arg_matches(&matches)?;
    let mut ordered = toggles_of(&matches, "trace", true);
    ordered.extend(toggles_of(&matches, "no_trace", false));
    ordered.sort_by_key(|(index, _)| *index);
    Ok(Invocation {
        cli,
        toggles: ordered.into_iter().map(|(_, toggle)| toggle).collect(),
    })
}

/// Everything the session needs, after layering flags over the config file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Run configuration.
    pub run: RunConfig,
    /// Platform configuration.
    pub platform: PlatformConfig,
    /// Program image path.
    pub image: Option<PathBuf>,
    /// HTIF `tohost` address.
    pub tohost: u64,
    /// Signature output file and region.
    pub signature: Option<(PathBuf, SignatureRange)>,
    /// HTIF console output file.
    pub terminal_log: Option<PathBuf>,
    /// Only report the architecture.
    pub report_arch: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            run: RunConfig::default(),
            platform: PlatformConfig::default(),
            image: None,
            tohost: DEFAULT_TOHOST,
            signature: None,
            terminal_log: None,
            report_arch: false,
        }
    }
}

impl Invocation {
    /// Resolves the final settings.
    ///
    /// # Errors
    ///
    /// Fails on unreadable config files, invalid RAM sizes, unknown trace
    /// categories and incomplete signature requests.
    pub fn settings(&self) -> anyhow::Result<Settings> {
        let cli = &self.cli;
        let file = match &cli.config {
            Some(path) => ConfigFile::load(path)?,
            None => ConfigFile::default(),
        };
        let mut run = file.run;
        let mut platform = file.platform;

        if let Some(limit) = cli.inst_limit {
            run.insn_limit = limit;
        }
        if let Some(insns_per_tick) = cli.insns_per_tick {
            run.insns_per_tick = insns_per_tick;
        }
        run.tandem |= cli.tandem;
        run.show_times |= cli.show_times;
        if cli.rvfi_dii.is_some() {
            run.protocol_port = cli.rvfi_dii;
        }
        for toggle in &self.toggles {
            run.trace.set(Some(toggle.category.as_str()), toggle.enabled)?;
        }

        platform.enable_dirty_update |= cli.enable_dirty_update;
        platform.enable_misaligned |= cli.enable_misaligned;
        platform.enable_pmp |= cli.enable_pmp;
        platform.mtval_has_illegal_inst_bits |= cli.mtval_has_illegal_inst_bits;
        platform.enable_rvc &= !cli.disable_compressed;
        platform.enable_writable_misa &= !cli.disable_writable_misa;
        platform.enable_fdext &= !cli.disable_fdext;
        if let Some(mib) = cli.ram_size {
            platform.set_ram_size_mib(mib)?;
        }
        if run.protocol_mode() {
            platform.ram_base = PROTOCOL_RAM_BASE;
            platform.ram_size = PROTOCOL_RAM_SIZE;
            platform.boot_rom = false;
        }
        run.validate()?;

        let signature = match (&cli.test_signature, cli.signature_start, cli.signature_end) {
            (None, _, _) => None,
            (Some(path), Some(start), Some(end)) => {
                Some((path.clone(), SignatureRange { start, end }))
            }
            (Some(path), _, _) => bail!(
                "--test-signature {} needs --signature-start and --signature-end",
                path.display()
            ),
        };

        Ok(Settings {
            run,
            platform,
            image: cli.image.clone(),
            tohost: cli.tohost,
            signature,
            terminal_log: cli.terminal_log.clone(),
            report_arch: cli.report_arch,
        })
    }
}
