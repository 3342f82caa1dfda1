//! Wire protocol and transport between this daemon and the kernel-resident
//! SMB engine: a fixed envelope, one struct layout per message type, and a
//! blocking `KernelChannel` the IPC loop reads one frame at a time.

#![forbid(unsafe_code)]

pub mod envelope;
pub mod error;
pub mod messages;
pub mod transport;

pub use envelope::{EnvelopeHeader, MessageType, RawMessage};
pub use error::{IpcError, Result};
pub use transport::{KernelChannel, UnixSocketChannel};
