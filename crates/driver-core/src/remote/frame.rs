use super::ProtocolError;

/// Size of an inbound command frame.
pub const COMMAND_FRAME_BYTES: usize = 8;
/// Size of an outbound execution packet in bits.
pub const EXECUTION_FRAME_BITS: usize = 704;
/// Size of an outbound execution packet in bytes.
pub const EXECUTION_FRAME_BYTES: usize = EXECUTION_FRAME_BITS / 8;

const CMD_END_OF_TRACE: u8 = 0;
const CMD_INSTRUCTION: u8 = 1;

/// Decoded command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// No more instructions follow; answer with a halted packet.
    EndOfTrace,
    /// Execute `encoding` in place of the fetched instruction.
    Instruction {
        /// Raw instruction bits.
        encoding: u32,
    },
}

/// Inbound 8-byte record: one little-endian word holding
/// `insn[31:0] time[47:32] cmd[55:48] padding[63:56]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct InstructionFrame {
    /// Instruction encoding.
    pub insn: u32,
    /// Peer timestamp; unused by the model.
    pub time: u16,
    /// Command byte.
    pub cmd: u8,
    /// Reserved.
    pub padding: u8,
}

impl InstructionFrame {
    /// Decodes a frame from its wire bytes.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn from_bytes(bytes: [u8; COMMAND_FRAME_BYTES]) -> Self {
        let word = u64::from_le_bytes(bytes);
        Self {
            insn: word as u32,
            time: (word >> 32) as u16,
            cmd: (word >> 48) as u8,
            padding: (word >> 56) as u8,
        }
    }

    /// Encodes the frame as wire bytes.
    #[must_use]
    pub const fn to_bytes(self) -> [u8; COMMAND_FRAME_BYTES] {
        let word = (self.insn as u64)
            | ((self.time as u64) << 32)
            | ((self.cmd as u64) << 48)
            | ((self.padding as u64) << 56);
        word.to_le_bytes()
    }

    /// Frame carrying `command`.
    #[must_use]
    pub const fn for_command(command: Command) -> Self {
        match command {
            Command::EndOfTrace => Self {
                insn: 0,
                time: 0,
                cmd: CMD_END_OF_TRACE,
                padding: 0,
            },
            Command::Instruction { encoding } => Self {
                insn: encoding,
                time: 0,
                cmd: CMD_INSTRUCTION,
                padding: 0,
            },
        }
    }

    /// Interprets the command byte.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::UnknownCommand`] for any value other than
    /// end-of-trace (`0`) or instruction (`1`).
    pub fn command(self) -> Result<Command, ProtocolError> {
        match self.cmd {
            CMD_END_OF_TRACE => Ok(Command::EndOfTrace),
            CMD_INSTRUCTION => Ok(Command::Instruction {
                encoding: self.insn,
            }),
            other => Err(ProtocolError::UnknownCommand(other)),
        }
    }
}

/// Architectural effects of one step, in the order they appear on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[allow(missing_docs)]
pub struct ExecutionFrame {
    pub order: u64,
    pub pc_rdata: u64,
    pub pc_wdata: u64,
    pub insn: u64,
    pub rs1_data: u64,
    pub rs2_data: u64,
    pub rd_wdata: u64,
    pub mem_addr: u64,
    pub mem_rdata: u64,
    pub mem_wdata: u64,
    pub mem_rmask: u8,
    pub mem_wmask: u8,
    pub rs1_addr: u8,
    pub rs2_addr: u8,
    pub rd_addr: u8,
    pub trap: u8,
    pub halt: u8,
    pub intr: u8,
}

impl ExecutionFrame {
    /// Zeroed frame with only the halt marker set.
    #[must_use]
    pub fn halted() -> Self {
        Self {
            halt: 1,
            ..Self::default()
        }
    }

    /// `true` when the halt marker is set.
    #[must_use]
    pub const fn is_halted(&self) -> bool {
        self.halt != 0
    }

    const fn wide_fields(&self) -> [u64; 10] {
        [
            self.order,
            self.pc_rdata,
            self.pc_wdata,
            self.insn,
            self.rs1_data,
            self.rs2_data,
            self.rd_wdata,
            self.mem_addr,
            self.mem_rdata,
            self.mem_wdata,
        ]
    }

    const fn narrow_fields(&self) -> [u8; 8] {
        [
            self.mem_rmask,
            self.mem_wmask,
            self.rs1_addr,
            self.rs2_addr,
            self.rd_addr,
            self.trap,
            self.halt,
            self.intr,
        ]
    }

    /// Packs the frame least-significant bit first.
    #[must_use]
    pub fn to_packet(&self) -> TracePacket {
        let mut packet = TracePacket::default();
        for value in self.wide_fields() {
            packet.push(value, 64);
        }
        for value in self.narrow_fields() {
            packet.push(u64::from(value), 8);
        }
        packet
    }

    /// Decodes a packet produced by [`Self::to_packet`].
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::PacketLength`] unless `bytes` is exactly
    /// [`EXECUTION_FRAME_BYTES`] long.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let Ok(bytes) = <&[u8; EXECUTION_FRAME_BYTES]>::try_from(bytes) else {
            return Err(ProtocolError::PacketLength {
                received: bytes.len(),
            });
        };
        let mut wide = [0u64; 10];
        for (slot, chunk) in wide.iter_mut().zip(bytes.chunks_exact(8)) {
            let mut word = [0u8; 8];
            word.copy_from_slice(chunk);
            *slot = u64::from_le_bytes(word);
        }
        let narrow = &bytes[80..];
        Ok(Self {
            order: wide[0],
            pc_rdata: wide[1],
            pc_wdata: wide[2],
            insn: wide[3],
            rs1_data: wide[4],
            rs2_data: wide[5],
            rd_wdata: wide[6],
            mem_addr: wide[7],
            mem_rdata: wide[8],
            mem_wdata: wide[9],
            mem_rmask: narrow[0],
            mem_wmask: narrow[1],
            rs1_addr: narrow[2],
            rs2_addr: narrow[3],
            rd_addr: narrow[4],
            trap: narrow[5],
            halt: narrow[6],
            intr: narrow[7],
        })
    }
}

/// Bit-packed outbound record.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TracePacket {
    bytes: Vec<u8>,
    bit_len: usize,
}

impl TracePacket {
    /// Appends the low `bits` bits of `value`, least-significant bit first.
    pub fn push(&mut self, value: u64, bits: u32) {
        for bit in 0..bits.min(64) {
            let position = self.bit_len;
            if position % 8 == 0 {
                self.bytes.push(0);
            }
            if (value >> bit) & 1 == 1 {
                self.bytes[position / 8] |= 1 << (position % 8);
            }
            self.bit_len += 1;
        }
    }

    /// Packet length in bits.
    #[must_use]
    pub const fn bit_len(&self) -> usize {
        self.bit_len
    }

    /// Wire bytes of the packet.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::UnalignedPacket`] when the bit length is not a
    /// multiple of eight; such a packet must never reach the peer.
    pub fn as_bytes(&self) -> Result<&[u8], ProtocolError> {
        if self.bit_len % 8 != 0 {
            return Err(ProtocolError::UnalignedPacket(self.bit_len));
        }
        Ok(&self.bytes)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::{
        Command, ExecutionFrame, InstructionFrame, TracePacket, EXECUTION_FRAME_BITS,
        EXECUTION_FRAME_BYTES,
    };
    use crate::ProtocolError;

    #[rstest]
    #[case(0x0000_0000_0000_0000, Command::EndOfTrace)]
    #[case(0x0001_0000_0000_0013, Command::Instruction { encoding: 0x13 })]
    #[case(0xAA01_BEEF_0010_0093, Command::Instruction { encoding: 0x0010_0093 })]
    #[case(0x0000_1234_0000_0000, Command::EndOfTrace)]
    fn command_word_layout(#[case] word: u64, #[case] expected: Command) {
        let frame = InstructionFrame::from_bytes(word.to_le_bytes());
        assert_eq!(frame.command().expect("known command"), expected);
    }

    #[test]
    fn command_fields_sit_at_fixed_offsets() {
        let frame = InstructionFrame::from_bytes(0xAA01_BEEF_0010_0093u64.to_le_bytes());
        assert_eq!(frame.insn, 0x0010_0093);
        assert_eq!(frame.time, 0xBEEF);
        assert_eq!(frame.cmd, 1);
        assert_eq!(frame.padding, 0xAA);
        assert_eq!(frame.to_bytes(), 0xAA01_BEEF_0010_0093u64.to_le_bytes());
    }

    #[rstest]
    #[case(2)]
    #[case(0x7F)]
    #[case(0xFF)]
    fn unknown_commands_are_rejected(#[case] cmd: u8) {
        let frame = InstructionFrame {
            cmd,
            ..InstructionFrame::default()
        };
        assert!(matches!(
            frame.command(),
            Err(ProtocolError::UnknownCommand(value)) if value == cmd
        ));
    }

    #[test]
    fn execution_packet_layout() {
        let frame = ExecutionFrame {
            order: 1,
            pc_rdata: 0x8000_0000,
            pc_wdata: 0x8000_0004,
            insn: 0x0010_0093,
            rd_wdata: 1,
            rd_addr: 1,
            halt: 0,
            trap: 1,
            intr: 0x5A,
            ..ExecutionFrame::default()
        };
        let packet = frame.to_packet();
        assert_eq!(packet.bit_len(), EXECUTION_FRAME_BITS);

        let bytes = packet.as_bytes().expect("byte aligned");
        assert_eq!(bytes.len(), EXECUTION_FRAME_BYTES);
        assert_eq!(bytes[0], 1);
        assert_eq!(&bytes[8..16], &0x8000_0000u64.to_le_bytes());
        assert_eq!(bytes[84], 1, "rd_addr");
        assert_eq!(bytes[85], 1, "trap");
        assert_eq!(bytes[87], 0x5A, "intr");
        assert_eq!(ExecutionFrame::from_bytes(bytes).expect("full packet"), frame);
    }

    #[test]
    fn halted_frame_is_zero_apart_from_halt() {
        let packet = ExecutionFrame::halted().to_packet();
        let bytes = packet.as_bytes().expect("byte aligned");
        for (index, byte) in bytes.iter().enumerate() {
            assert_eq!(*byte, u8::from(index == 86), "byte {index}");
        }
    }

    #[test]
    fn unaligned_packets_are_refused() {
        let mut packet = TracePacket::default();
        packet.push(0b101, 3);
        assert!(matches!(
            packet.as_bytes(),
            Err(ProtocolError::UnalignedPacket(3))
        ));
        packet.push(0, 5);
        assert_eq!(packet.as_bytes().expect("aligned"), &[0b101]);
    }

    #[test]
    fn truncated_packets_do_not_decode() {
        assert!(matches!(
            ExecutionFrame::from_bytes(&[0; 10]),
            Err(ProtocolError::PacketLength { received: 10 })
        ));
    }
}
