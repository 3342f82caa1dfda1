//! NDR encoding, DCE/RPC framing, and the `srvsvc` pipe state machine.
//!
//! This crate is the wire half of the control plane: it knows how to
//! turn a parsed request into bytes and back, but nothing about sockets
//! or the kernel IPC channel that carries those bytes.

#![forbid(unsafe_code)]

pub mod dcerpc;
pub mod error;
pub mod ndr;
pub mod srvsvc;

pub use dcerpc::{DceRpcRequestHeader, DceRpcResponseHeader, DcerpcFramer, PfcFlags, PACKED_DREP_LE};
pub use error::{NdrError, Result};
pub use ndr::{NdrReader, NdrWriter};
pub use srvsvc::SrvsvcPipe;
