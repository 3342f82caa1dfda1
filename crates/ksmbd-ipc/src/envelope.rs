//! The kernel IPC message envelope: `{ length, type, flags, payload }`.

use binrw::prelude::*;

/// Fixed 12-byte prefix in front of every message's payload.
#[derive(Debug, Clone, BinRead, BinWrite)]
#[brw(little)]
pub struct EnvelopeHeader {
    /// Total message length, header included.
    pub length: u32,
    /// Selects the fixed struct layout of the payload; see [`MessageType`].
    pub msg_type: u32,
    pub flags: u32,
}

impl EnvelopeHeader {
    pub const SIZE: usize = 12;
}

/// Message types in scope for this daemon (spec §6 "External Interfaces").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum MessageType {
    LoginRequest = 1,
    LoginResponse = 2,
    TreeConnectRequest = 3,
    TreeConnectResponse = 4,
    TreeDisconnectRequest = 5,
    LogoutRequest = 6,
    ShareConfigRequest = 7,
    ShareConfigResponse = 8,
    Heartbeat = 9,
    RpcRequest = 10,
    RpcResponse = 11,
}

impl TryFrom<u32> for MessageType {
    type Error = crate::error::IpcError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Ok(match value {
            1 => MessageType::LoginRequest,
            2 => MessageType::LoginResponse,
            3 => MessageType::TreeConnectRequest,
            4 => MessageType::TreeConnectResponse,
            5 => MessageType::TreeDisconnectRequest,
            6 => MessageType::LogoutRequest,
            7 => MessageType::ShareConfigRequest,
            8 => MessageType::ShareConfigResponse,
            9 => MessageType::Heartbeat,
            10 => MessageType::RpcRequest,
            11 => MessageType::RpcResponse,
            other => return Err(crate::error::IpcError::UnknownType(other)),
        })
    }
}

/// A framed message as read off the wire: its type and the raw payload
/// bytes, still to be parsed into the type-specific struct.
pub struct RawMessage {
    pub msg_type: MessageType,
    pub flags: u32,
    pub payload: Vec<u8>,
}

impl RawMessage {
    /// Validates that `payload.len()` matches `expected_size` exactly, the
    /// size check every handler performs before touching its fields.
    pub fn check_size(&self, expected_size: usize) -> crate::error::Result<()> {
        if self.payload.len() != expected_size {
            return Err(crate::error::IpcError::BadMessage {
                msg_type: self.msg_type as u32,
                expected: expected_size,
                got: self.payload.len(),
            });
        }
        Ok(())
    }
}
