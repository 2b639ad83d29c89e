//! Simulation driver core: step/tick scheduling, tandem verification, the
//! remote instruction-injection protocol, and HPM event multiplexing.

/// Run and platform configuration captured before a run starts.
pub mod config;
pub use config::{
    PlatformConfig, RunConfig, TraceCategory, TraceConfig, DEFAULT_INSNS_PER_TICK,
    DEFAULT_RAM_BASE, DEFAULT_RAM_SIZE, PROTOCOL_RAM_BASE, PROTOCOL_RAM_SIZE,
};

/// Setup and run-level error taxonomy.
pub mod error;
pub use error::{RunError, SettingMismatch, SetupError};

/// Architectural simulation state owned by the model for one run.
pub mod state;
pub use state::{Csr, CsrBank, Gpr, Privilege, SimulationState, GPR_COUNT, SSTATUS_MASK};

/// HPM event-to-counter multiplexer.
pub mod hpm;
pub use hpm::{
    DispatchPath, EventDescriptor, EventKind, EventMultiplexer, HpmError, HpmRegisterFile,
    PendingEventSet, PlatformEvent, HPM_COUNTER_COUNT, INHIBIT_BIT_BASE, MAX_EVENT_KINDS,
};

/// Collaborator contracts for the primary and reference models.
pub mod model;
pub use model::{
    MemoryReader, Model, ModelError, NullReference, ReferenceModel, ReferencePlatform,
    StepContext, StepOutcome,
};

/// Lock-step comparison between the primary and reference models.
pub mod tandem;
pub use tandem::{
    check_reference_platform, compare, Accessor, ComparedField, Comparison, Mismatch,
    TandemError, COMPARED_FIELDS,
};

/// Remote instruction-injection protocol: frames, packets and transport.
pub mod remote;
pub use remote::{
    Command, ExecutionFrame, InstructionFrame, InstructionLink, ProtocolError, RemoteLink,
    RemoteListener, TracePacket, COMMAND_FRAME_BYTES, EXECUTION_FRAME_BITS,
    EXECUTION_FRAME_BYTES,
};

/// Step/tick scheduling loop.
pub mod scheduler;
pub use scheduler::{resolve_insns_per_tick, run, RunContext, TerminationReason};

/// Test-signature dump of a memory range.
pub mod signature;
pub use signature::{render_signature, write_signature, SignatureRange};

/// Process-wide run timing and throughput reporting.
pub mod stats;
pub use stats::{RunStats, KIPS_REPORT_INTERVAL};

#[cfg(test)]
use proptest as _;
