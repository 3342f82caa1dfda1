//! Error type for NDR decoding, DCE/RPC framing and the srvsvc pipe engine.

/// Errors raised by [`crate::ndr`], [`crate::dcerpc`] and [`crate::srvsvc`].
#[derive(Debug, thiserror::Error)]
pub enum NdrError {
    /// A read ran past the end of the buffer.
    #[error("NDR buffer overrun at offset {offset} (wanted {wanted} more bytes)")]
    Overrun { offset: usize, wanted: usize },
    /// A cursor was not positioned on the alignment boundary a primitive requires.
    #[error("NDR cursor at offset {0} is not 4-byte aligned")]
    Unaligned(usize),
    /// A conformant/varying string was truncated or malformed (e.g. missing NUL).
    #[error("malformed NDR string: {0}")]
    BadString(&'static str),
    /// Any other structurally invalid request argument blob.
    #[error("malformed NDR data: {0}")]
    BadData(&'static str),
    /// A DCE/RPC PDU header failed to parse (bad magic, unsupported ptype, ...).
    #[error("malformed DCE/RPC PDU: {0}")]
    BadPdu(&'static str),
    /// The pipe was asked to read before it had a parsed, invoked request.
    #[error("srvsvc pipe read attempted before a request was invoked")]
    NotReady,
}

/// Result type used throughout `ksmbd-ndr`.
pub type Result<T> = std::result::Result<T, NdrError>;
