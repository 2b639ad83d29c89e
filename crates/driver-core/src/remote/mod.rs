//! Remote instruction injection: an external peer supplies one encoding per
//! command frame over a loopback TCP stream and reads back one execution
//! trace packet per step.

use std::io;

use thiserror::Error;

/// Command and execution-trace wire records.
pub mod frame;
/// Loopback listener and framed stream transport.
pub mod transport;

pub use frame::{
    Command, ExecutionFrame, InstructionFrame, TracePacket, COMMAND_FRAME_BYTES,
    EXECUTION_FRAME_BITS, EXECUTION_FRAME_BYTES,
};
pub use transport::{InstructionLink, RemoteLink, RemoteListener};

/// Framing and transport violations. All are fatal to the session.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Command byte other than end-of-trace or instruction.
    #[error("unknown remote command {0:#04x}")]
    UnknownCommand(u8),
    /// Peer closed the stream part-way through a command frame.
    #[error("short command frame: received {received} of {COMMAND_FRAME_BYTES} bytes")]
    ShortFrame {
        /// Bytes received before the close.
        received: usize,
    },
    /// Execution packet whose length is not a whole number of bytes.
    #[error("execution packet of {0} bits is not byte aligned")]
    UnalignedPacket(usize),
    /// Execution packet buffer of the wrong size.
    #[error("execution packet of {received} bytes, expected {EXECUTION_FRAME_BYTES}")]
    PacketLength {
        /// Bytes supplied.
        received: usize,
    },
    /// Underlying stream failure.
    #[error("remote transport error: {0}")]
    Io(#[from] io::Error),
}
