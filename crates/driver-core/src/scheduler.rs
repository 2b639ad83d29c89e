//! Step/tick scheduling.
//!
//! [`run`] advances the primary model one instruction per iteration, optionally
//! drawing each instruction from the remote link and optionally lock-stepping
//! a reference model. Every `insns_per_tick` retirements the platform clock
//! advances and pending HPM events are drained.

use std::fmt;

use crate::{
    compare, Command, EventMultiplexer, ExecutionFrame, InstructionLink, Model, ReferenceModel,
    RunConfig, RunError, RunStats, SetupError, StepContext, StepOutcome, TraceCategory,
};

const PLATFORM: &str = TraceCategory::Platform.target();

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TerminationReason {
    /// The model signalled completion.
    Completed {
        /// Exit code reported by the program.
        exit_code: u64,
    },
    /// The configured retirement limit was reached.
    InstructionLimitReached,
    /// Tandem comparison found a disagreement.
    Diverged,
    /// The remote peer closed the stream between frames.
    ProtocolClosed,
    /// The remote peer ended the current trace; the session may continue
    /// after a model reset.
    TraceEnded,
    /// The model reported an internal exception.
    FatalException,
}

impl TerminationReason {
    /// Process exit status: `0` only for a completed run with exit code `0`.
    #[must_use]
    pub const fn exit_status(self) -> u8 {
        match self {
            Self::Completed { exit_code: 0 } => 0,
            _ => 1,
        }
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed { exit_code } => write!(f, "completed with exit code {exit_code}"),
            Self::InstructionLimitReached => f.write_str("instruction limit reached"),
            Self::Diverged => f.write_str("diverged from reference model"),
            Self::ProtocolClosed => f.write_str("remote peer closed the connection"),
            Self::TraceEnded => f.write_str("remote trace ended"),
            Self::FatalException => f.write_str("model exception"),
        }
    }
}

/// Everything one run touches, borrowed for its duration.
pub struct RunContext<'a> {
    /// Run configuration.
    pub config: &'a RunConfig,
    /// Primary model.
    pub model: &'a mut dyn Model,
    /// Reference model; [`crate::NullReference`] outside tandem mode.
    pub reference: &'a mut dyn ReferenceModel,
    /// HPM multiplexer shared with the model during steps.
    pub events: &'a mut EventMultiplexer,
    /// Instruction source in protocol mode.
    pub link: Option<&'a mut dyn InstructionLink>,
    /// Process-wide counters.
    pub stats: &'a mut RunStats,
}

/// Picks the tick length: the reference model's in tandem mode when it
/// dictates one, otherwise the configured value.
///
/// # Errors
///
/// Returns [`SetupError::ZeroInsnsPerTick`] when the chosen value is zero.
pub fn resolve_insns_per_tick(
    config: &RunConfig,
    reference: &dyn ReferenceModel,
) -> Result<u64, SetupError> {
    let from_reference = if config.tandem {
        reference.insns_per_tick()
    } else {
        None
    };
    match from_reference.unwrap_or(config.insns_per_tick) {
        0 => Err(SetupError::ZeroInsnsPerTick),
        n => Ok(n),
    }
}

/// Drives one run to termination.
///
/// Graceful ends, divergence and model exceptions are returned as a
/// [`TerminationReason`]; the latter two are logged before returning.
///
/// # Errors
///
/// Returns [`RunError::Setup`] for inconsistent setup before any step,
/// [`RunError::Protocol`] for framing or transport failures and
/// [`RunError::Tandem`] for one-sided completion.
pub fn run(ctx: RunContext<'_>) -> Result<TerminationReason, RunError> {
    let RunContext {
        config,
        model,
        reference,
        events,
        mut link,
        stats,
    } = ctx;

    config.validate()?;
    if config.tandem && !reference.is_active() {
        return Err(SetupError::MissingReference.into());
    }
    if config.protocol_mode() && link.is_none() {
        return Err(SetupError::MissingLink.into());
    }
    let insns_per_tick = resolve_insns_per_tick(config, &*reference)?;
    tracing::debug!(insns_per_tick, tandem = config.tandem, "run starting");

    let mut step_index = 0u64;
    let mut since_tick = 0u64;
    let mut diverged = false;

    while !model.state().halted() && !config.limit_reached(stats.retired()) {
        let mut injected = None;
        if let Some(link) = link.as_deref_mut() {
            match link.receive_command()? {
                None => {
                    tracing::info!("remote peer closed the connection");
                    return Ok(TerminationReason::ProtocolClosed);
                }
                Some(Command::EndOfTrace) => {
                    link.send_result(&ExecutionFrame::halted().to_packet())?;
                    tracing::debug!(steps = step_index, "remote trace ended");
                    return Ok(TerminationReason::TraceEnded);
                }
                Some(Command::Instruction { encoding }) => injected = Some(encoding),
            }
        }

        let mut step = StepContext {
            step_index,
            injected,
            events: &mut *events,
        };
        let outcome = match model.step(&mut step) {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::error!(step = step_index, "model exception: {err}");
                return Ok(TerminationReason::FatalException);
            }
        };

        if let Some(link) = link.as_deref_mut() {
            link.send_result(&model.execution_frame().to_packet())?;
        }
        if outcome == StepOutcome::Retired {
            step_index += 1;
            since_tick += 1;
            stats.record_retired();
        }

        if config.tandem {
            if let Err(err) = reference.step() {
                tracing::error!(step = step_index, "reference model exception: {err}");
                return Ok(TerminationReason::FatalException);
            }
            let comparison = compare(model.state(), &*reference)?;
            if !comparison.agrees() {
                for mismatch in &comparison.mismatches {
                    tracing::error!(
                        "{}: model {:#018x}, reference {:#018x}",
                        mismatch.field,
                        mismatch.primary,
                        mismatch.reference
                    );
                }
                let pc = model.state().pc();
                tracing::error!(step = step_index, "divergence from reference model at pc {pc:#x}");
                diverged = true;
                break;
            }
        }

        if since_tick >= insns_per_tick {
            since_tick = 0;
            model.tick();
            let applied = events.process_pending(model.hpm_registers());
            reference.tick();
            tracing::debug!(target: PLATFORM, step = step_index, applied, "clock tick");
        }
    }

    let state = model.state();
    if diverged {
        return Ok(TerminationReason::Diverged);
    }
    if state.halted() {
        match state.exit_code() {
            0 => tracing::info!("SUCCESS"),
            code => tracing::error!("FAILURE: {code}"),
        }
        return Ok(TerminationReason::Completed {
            exit_code: state.exit_code(),
        });
    }
    Ok(TerminationReason::InstructionLimitReached)
}
