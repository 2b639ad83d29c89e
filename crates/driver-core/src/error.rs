use std::fmt;
use std::io;

use thiserror::Error;

use crate::{HpmError, ModelError, ProtocolError, TandemError};

/// A single setting on which the reference model and the driver disagree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingMismatch {
    /// Setting name as shown to the user.
    pub setting: &'static str,
    /// Value reported by the reference model.
    pub reference: String,
    /// Value configured for the primary model.
    pub model: String,
}

impl fmt::Display for SettingMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "inconsistent {} setting: reference {}, model {}",
            self.setting, self.reference, self.model
        )
    }
}

/// Fatal setup failures: nothing has executed yet.
#[derive(Debug, Error)]
pub enum SetupError {
    /// `insns_per_tick` resolved to zero.
    #[error("instructions per tick must be at least 1")]
    ZeroInsnsPerTick,
    /// RAM size flag was zero or overflowed.
    #[error("invalid ram-size '{0}' MiB")]
    InvalidRamSize(u64),
    /// Trace category name not recognised.
    #[error("unknown trace category '{0}' (should be instr|reg|mem|platform|all)")]
    UnknownTraceCategory(String),
    /// Tandem mode was requested with an inactive reference model.
    #[error("tandem mode requires an active reference model")]
    MissingReference,
    /// Protocol mode was requested without a connected transport.
    #[error("remote protocol mode requires a connected transport")]
    MissingLink,
    /// Tandem verification cannot follow injected instructions.
    #[error("tandem mode cannot be combined with the remote instruction protocol")]
    TandemWithProtocol,
    /// Reference model platform settings disagree with the driver's.
    #[error("reference model configuration mismatch: {}", join_mismatches(.0))]
    InconsistentReference(Vec<SettingMismatch>),
    /// Loopback listener could not be bound.
    #[error("unable to bind loopback port {port}: {source}")]
    Bind {
        /// Requested port.
        port: u16,
        /// Underlying socket error.
        source: io::Error,
    },
    /// Listener failed to accept the single peer connection.
    #[error("unable to accept connection: {0}")]
    Accept(io::Error),
}

fn join_mismatches(mismatches: &[SettingMismatch]) -> String {
    mismatches
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Fatal conditions that abort a run in progress.
#[derive(Debug, Error)]
pub enum RunError {
    /// Run could not start.
    #[error(transparent)]
    Setup(#[from] SetupError),
    /// Remote protocol framing or transport violation.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    /// One-sided completion between the tandem models.
    #[error(transparent)]
    Tandem(#[from] TandemError),
    /// HPM bookkeeping inconsistency outside a model step.
    #[error(transparent)]
    Hpm(#[from] HpmError),
    /// Model failure outside a step, such as a reset between traces.
    #[error(transparent)]
    Model(#[from] ModelError),
}
