use std::io::{self, ErrorKind, Read, Write};
use std::net::{Ipv4Addr, SocketAddr, TcpListener, TcpStream};

use super::{Command, InstructionFrame, ProtocolError, TracePacket, COMMAND_FRAME_BYTES};
use crate::SetupError;

/// Source of injected instructions and sink for execution packets.
pub trait InstructionLink {
    /// Blocks until a whole command frame arrives. `Ok(None)` means the peer
    /// closed the stream between frames.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError`] for partial frames, unknown commands and
    /// stream failures.
    fn receive_command(&mut self) -> Result<Option<Command>, ProtocolError>;

    /// Writes one execution packet.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::UnalignedPacket`] before writing anything when
    /// the packet is not byte aligned, or [`ProtocolError::Io`] on write
    /// failure.
    fn send_result(&mut self, packet: &TracePacket) -> Result<(), ProtocolError>;
}

/// Framed command/response session over a byte stream.
#[derive(Debug)]
pub struct RemoteLink<S> {
    stream: S,
}

impl<S: Read + Write> RemoteLink<S> {
    /// Wraps a connected stream.
    pub const fn new(stream: S) -> Self {
        Self { stream }
    }

    /// Returns the underlying stream.
    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl<S: Read + Write> InstructionLink for RemoteLink<S> {
    fn receive_command(&mut self) -> Result<Option<Command>, ProtocolError> {
        let mut buf = [0u8; COMMAND_FRAME_BYTES];
        let mut received = 0;
        while received < COMMAND_FRAME_BYTES {
            match self.stream.read(&mut buf[received..]) {
                Ok(0) if received == 0 => return Ok(None),
                Ok(0) => return Err(ProtocolError::ShortFrame { received }),
                Ok(n) => received += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => {}
                Err(err) => return Err(err.into()),
            }
        }
        let frame = InstructionFrame::from_bytes(buf);
        tracing::trace!(
            insn = frame.insn,
            time = frame.time,
            cmd = frame.cmd,
            "remote command frame"
        );
        frame.command().map(Some)
    }

    fn send_result(&mut self, packet: &TracePacket) -> Result<(), ProtocolError> {
        let bytes = packet.as_bytes()?;
        self.stream.write_all(bytes)?;
        self.stream.flush()?;
        Ok(())
    }
}

/// Loopback listener that hands out exactly one connection.
#[derive(Debug)]
pub struct RemoteListener {
    listener: TcpListener,
    port: u16,
}

impl RemoteListener {
    /// Binds `127.0.0.1:port`; port `0` picks a free port.
    ///
    /// The standard library already enables address reuse on Unix listeners,
    /// so a restarted driver can rebind while old connections linger.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError::Bind`] when the socket cannot be bound.
    pub fn bind(port: u16) -> Result<Self, SetupError> {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, port))
            .map_err(|source| SetupError::Bind { port, source })?;
        Ok(Self { listener, port })
    }

    /// Bound address, useful when binding port `0`.
    ///
    /// # Errors
    ///
    /// Propagates the socket query failure.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Waits for the single peer and closes the listening socket.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError::Accept`] when no connection can be accepted.
    pub fn accept(self) -> Result<RemoteLink<TcpStream>, SetupError> {
        tracing::info!(port = self.port, "waiting for connection");
        let (stream, peer) = self.listener.accept().map_err(SetupError::Accept)?;
        tracing::info!(%peer, "connected");
        Ok(RemoteLink::new(stream))
    }
}
