//! Error type for the kernel IPC envelope and transport.

/// Errors raised while framing, parsing or transporting IPC messages.
#[derive(Debug, thiserror::Error)]
pub enum IpcError {
    /// A message's declared length didn't match its type's expected payload size.
    #[error("message type {msg_type:#x}: expected payload of {expected} bytes, got {got}")]
    BadMessage {
        msg_type: u32,
        expected: usize,
        got: usize,
    },
    /// `type` did not match any message this daemon understands.
    #[error("unknown message type {0:#x}")]
    UnknownType(u32),
    /// The channel to the kernel engine closed.
    #[error("kernel channel closed")]
    ChannelClosed,
    /// Underlying transport I/O failure.
    #[error("IPC transport error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type used throughout `ksmbd-ipc`.
pub type Result<T> = std::result::Result<T, IpcError>;
