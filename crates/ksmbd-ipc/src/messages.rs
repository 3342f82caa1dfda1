//! Fixed-layout request/response payloads carried inside the envelope.
//!
//! Every request carries a `handle` the matching response must echo
//! (spec §6, property P1).

use binrw::prelude::*;

/// Outcome flags set on a [`LoginResponse`].
pub mod login_flags {
    pub const SUCCESS: u32 = 0x0000_0001;
    pub const GUEST: u32 = 0x0000_0002;
    pub const INVALID: u32 = 0x0000_0004;
    pub const EXPIRED: u32 = 0x0000_0008;
}

/// Flags set on a [`TreeConnectResponse`].
pub mod tree_connect_flags {
    pub const SUCCESS: u32 = 0x0000_0001;
    pub const WRITABLE: u32 = 0x0000_0002;
    pub const GUEST_ONLY: u32 = 0x0000_0004;
    pub const ACCESS_DENIED: u32 = 0x0000_0008;
    pub const NO_SUCH_SHARE: u32 = 0x0000_0010;
}

/// RPC pipe method selector, a one-hot bitset per spec §4.4.
pub mod rpc_method {
    pub const OPEN: u32 = 0x0000_0001;
    pub const WRITE: u32 = 0x0000_0002;
    pub const READ: u32 = 0x0000_0004;
    pub const IOCTL: u32 = 0x0000_0008;
    pub const CLOSE: u32 = 0x0000_0010;
    pub const RAP: u32 = 0x0000_0020;
}

const USERNAME_LEN: usize = 64;
const SHARE_NAME_LEN: usize = 64;
const HOST_LEN: usize = 64;
const PIPE_NAME_LEN: usize = 32;

#[derive(Debug, Clone, BinRead, BinWrite)]
#[brw(little)]
pub struct LoginRequest {
    pub handle: u64,
    pub username: [u8; USERNAME_LEN],
    /// NT-hash-keyed challenge/response material (MS-NLMP NTLMv1-style).
    pub challenge: [u8; 8],
    pub nt_response: [u8; 24],
}

#[derive(Debug, Clone, BinRead, BinWrite)]
#[brw(little)]
pub struct LoginResponse {
    pub handle: u64,
    pub flags: u32,
    pub session_id: u64,
}

#[derive(Debug, Clone, BinRead, BinWrite)]
#[brw(little)]
pub struct TreeConnectRequest {
    pub handle: u64,
    pub session_id: u64,
    pub share_name: [u8; SHARE_NAME_LEN],
    pub client_host: [u8; HOST_LEN],
}

#[derive(Debug, Clone, BinRead, BinWrite)]
#[brw(little)]
pub struct TreeConnectResponse {
    pub handle: u64,
    pub flags: u32,
    pub connect_id: u32,
}

#[derive(Debug, Clone, BinRead, BinWrite)]
#[brw(little)]
pub struct TreeDisconnectRequest {
    pub handle: u64,
    pub session_id: u64,
    pub connect_id: u32,
}

#[derive(Debug, Clone, BinRead, BinWrite)]
#[brw(little)]
pub struct LogoutRequest {
    pub handle: u64,
    pub session_id: u64,
}

#[derive(Debug, Clone, BinRead, BinWrite)]
#[brw(little)]
pub struct ShareConfigRequest {
    pub handle: u64,
    pub share_name: [u8; SHARE_NAME_LEN],
}

/// The fixed-size prefix of a `ShareConfigResponse`; variable-length
/// fields (path, veto list) follow as length-prefixed bytes appended by
/// the handler after this prefix is serialized, matching spec §4.4's
/// "payload size computed first" note.
#[derive(Debug, Clone, BinRead, BinWrite)]
#[brw(little)]
pub struct ShareConfigResponsePrefix {
    pub handle: u64,
    pub found: u32,
    pub flags: u32,
    pub create_mask: u32,
    pub directory_mask: u32,
    pub max_connections: u32,
    pub path_len: u32,
    pub veto_count: u32,
}

#[derive(Debug, Clone, BinRead, BinWrite)]
#[brw(little)]
pub struct Heartbeat {
    pub handle: u64,
}

#[derive(Debug, Clone, BinRead, BinWrite)]
#[brw(little)]
pub struct RpcRequestHeader {
    pub handle: u64,
    pub session_id: u64,
    pub connect_id: u32,
    pub method: u32,
    pub pipe_name: [u8; PIPE_NAME_LEN],
    pub data_len: u32,
    // `data_len` bytes of PDU data follow, read separately by the caller.
}

#[derive(Debug, Clone, BinRead, BinWrite)]
#[brw(little)]
pub struct RpcResponseHeader {
    pub handle: u64,
    pub status: u32,
    pub data_len: u32,
    // `data_len` bytes of PDU data follow.
}

/// Reads a fixed-width, NUL-padded field as a `&str`, trimming trailing
/// NUL bytes the way a C string buffer would be read.
pub fn field_str(buf: &[u8]) -> &str {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    std::str::from_utf8(&buf[..end]).unwrap_or("")
}

/// Writes `s` into a fixed-width NUL-padded buffer, truncating if too long.
pub fn write_field(buf: &mut [u8], s: &str) {
    buf.fill(0);
    let bytes = s.as_bytes();
    let n = bytes.len().min(buf.len());
    buf[..n].copy_from_slice(&bytes[..n]);
}
