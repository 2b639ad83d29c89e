//! Host-target interface: the `tohost` word through which test programs
//! report completion and print characters.

use driver_core::TraceCategory;

/// Conventional `tohost` location for images linked at the RAM base.
pub const DEFAULT_TOHOST: u64 = 0x8000_1000;

const PLATFORM: &str = TraceCategory::Platform.target();

/// Decoded `tohost` write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HtifRequest {
    /// Program finished; the payload is its exit code.
    Exit(u64),
    /// Console output of one byte.
    Putchar(u8),
    /// Any other device/command pair; ignored.
    Unsupported {
        /// Device field, bits `[63:56]`.
        device: u8,
        /// Command field, bits `[55:48]`.
        command: u8,
    },
}

impl HtifRequest {
    /// Decodes a value written to `tohost`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn decode(value: u64) -> Self {
        let device = (value >> 56) as u8;
        let command = (value >> 48) as u8;
        match (device, command) {
            (0, 0) if value & 1 == 1 => Self::Exit(value >> 1),
            (1, 1) => Self::Putchar(value as u8),
            _ => Self::Unsupported { device, command },
        }
    }
}

/// Console side of the interface.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Htif {
    console: Vec<u8>,
}

impl Htif {
    /// Applies a `tohost` write and returns the exit code if the program
    /// finished.
    pub fn handle(&mut self, value: u64) -> Option<u64> {
        match HtifRequest::decode(value) {
            HtifRequest::Exit(code) => {
                tracing::debug!(target: PLATFORM, code, "htif exit");
                Some(code)
            }
            HtifRequest::Putchar(byte) => {
                self.console.push(byte);
                tracing::trace!(target: PLATFORM, byte, "htif putchar");
                None
            }
            HtifRequest::Unsupported { device, command } => {
                tracing::warn!(target: PLATFORM, device, command, "unsupported htif request");
                None
            }
        }
    }

    /// Bytes printed so far.
    #[must_use]
    pub fn console(&self) -> &[u8] {
        &self.console
    }

    /// Removes and returns the bytes printed so far.
    pub fn take_console(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.console)
    }
}
