//! The kernel channel abstraction and a reference Unix-socket transport.
//!
//! Grounded on `smb-transport`'s `SmbTransport` trait-object pattern,
//! adapted to this daemon's synchronous, blocking-read IPC loop (spec
//! §4.6 `IpcLoop` is single-threaded with blocking reads).

use std::io::{Read, Write};
use std::os::unix::net::UnixStream;

use binrw::prelude::*;

use crate::envelope::{EnvelopeHeader, MessageType, RawMessage};
use crate::error::{IpcError, Result};

/// A duplex channel to the kernel engine: frame-level read/write of raw
/// messages, with the envelope parsed but the payload left opaque.
pub trait KernelChannel: Send {
    fn recv(&mut self) -> Result<RawMessage>;
    fn send(&mut self, msg_type: MessageType, flags: u32, payload: &[u8]) -> Result<()>;
}

/// A `KernelChannel` backed by a connected `AF_UNIX` stream socket — the
/// reference transport used by the `ksmbd` binary and by tests (over a
/// `UnixStream::pair()`).
pub struct UnixSocketChannel {
    stream: UnixStream,
}

impl UnixSocketChannel {
    pub fn new(stream: UnixStream) -> Self {
        UnixSocketChannel { stream }
    }

    pub fn connect(path: &std::path::Path) -> Result<Self> {
        Ok(UnixSocketChannel::new(UnixStream::connect(path)?))
    }
}

impl KernelChannel for UnixSocketChannel {
    fn recv(&mut self) -> Result<RawMessage> {
        let mut hdr_buf = [0u8; EnvelopeHeader::SIZE];
        match self.stream.read_exact(&mut hdr_buf) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Err(IpcError::ChannelClosed);
            }
            Err(e) => return Err(e.into()),
        }
        let mut cursor = std::io::Cursor::new(&hdr_buf);
        let hdr = EnvelopeHeader::read(&mut cursor)
            .map_err(|_| IpcError::BadMessage { msg_type: 0, expected: 0, got: 0 })?;

        let body_len = (hdr.length as usize).saturating_sub(EnvelopeHeader::SIZE);
        let mut payload = vec![0u8; body_len];
        self.stream.read_exact(&mut payload)?;

        let msg_type = MessageType::try_from(hdr.msg_type)?;
        Ok(RawMessage {
            msg_type,
            flags: hdr.flags,
            payload,
        })
    }

    fn send(&mut self, msg_type: MessageType, flags: u32, payload: &[u8]) -> Result<()> {
        let hdr = EnvelopeHeader {
            length: (EnvelopeHeader::SIZE + payload.len()) as u32,
            msg_type: msg_type as u32,
            flags,
        };
        let mut buf = Vec::with_capacity(EnvelopeHeader::SIZE + payload.len());
        hdr.write(&mut std::io::Cursor::new(&mut buf))
            .map_err(|_| IpcError::BadMessage { msg_type: msg_type as u32, expected: 0, got: 0 })?;
        buf.extend_from_slice(payload);
        self.stream.write_all(&buf)?;
        Ok(())
    }
}
