use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Mutex;

use binrw::{BinRead, BinWrite};

use ksmbd_ipc::messages::{field_str, rpc_method, RpcRequestHeader, RpcResponseHeader};
use ksmbd_ndr::{DceRpcRequestHeader, DcerpcFramer, SrvsvcPipe};

use super::Context;

const PIPE_SRVSVC: &str = "srvsvc";

/// Status codes returned to the kernel over the IPC envelope (distinct
/// from the DCE/RPC-level status carried inside the PDU payload).
mod status {
    pub const OK: u32 = 0;
    pub const NO_SUCH_PIPE: u32 = 1;
    pub const UNKNOWN_PIPE_NAME: u32 = 2;
    pub const BAD_PDU: u32 = 3;
    pub const NOT_IMPLEMENTED: u32 = 4;
}

struct OpenPipe {
    pipe: SrvsvcPipe,
    call_id: u32,
}

/// Open named-pipe instances, keyed by `(session_id, connect_id)`. One
/// entry per `OPEN`, torn down on `CLOSE` or session logout.
#[derive(Default)]
pub struct PipeTable {
    pipes: Mutex<HashMap<(u64, u32), OpenPipe>>,
}

impl PipeTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(req: &RpcRequestHeader) -> (u64, u32) {
        (req.session_id, req.connect_id)
    }
}

/// Dispatches one `rpc_method` bitset to the srvsvc pipe table (spec
/// §4.4 RPC: `OPEN`/`WRITE`/`READ`/`IOCTL`/`CLOSE`, plus the legacy `RAP`
/// transport this daemon never implements).
///
/// `pdu` is the `data_len` bytes of PDU data following `req` in the
/// envelope. Returns the response header and any PDU bytes to send back.
pub fn handle_rpc(
    req: &RpcRequestHeader,
    pdu: &[u8],
    _ctx: &Context,
    pipes: &PipeTable,
) -> (RpcResponseHeader, Vec<u8>) {
    if req.method & rpc_method::RAP != 0 {
        return (response(req.handle, status::NOT_IMPLEMENTED), Vec::new());
    }

    if req.method & rpc_method::OPEN != 0 {
        return handle_open(req, pipes);
    }
    if req.method & rpc_method::CLOSE != 0 {
        return handle_close(req, pipes);
    }
    if req.method & (rpc_method::WRITE | rpc_method::IOCTL) != 0 {
        return handle_write(req, pdu, _ctx, pipes);
    }
    if req.method & rpc_method::READ != 0 {
        return handle_read(req, pdu, pipes);
    }

    (response(req.handle, status::BAD_PDU), Vec::new())
}

fn handle_open(req: &RpcRequestHeader, pipes: &PipeTable) -> (RpcResponseHeader, Vec<u8>) {
    let pipe_name = field_str(&req.pipe_name);
    if pipe_name != PIPE_SRVSVC {
        return (response(req.handle, status::UNKNOWN_PIPE_NAME), Vec::new());
    }
    pipes.pipes.lock().unwrap().insert(
        PipeTable::key(req),
        OpenPipe {
            pipe: SrvsvcPipe::new(),
            call_id: 0,
        },
    );
    (response(req.handle, status::OK), Vec::new())
}

fn handle_close(req: &RpcRequestHeader, pipes: &PipeTable) -> (RpcResponseHeader, Vec<u8>) {
    pipes.pipes.lock().unwrap().remove(&PipeTable::key(req));
    (response(req.handle, status::OK), Vec::new())
}

fn handle_write(
    req: &RpcRequestHeader,
    pdu: &[u8],
    ctx: &Context,
    pipes: &PipeTable,
) -> (RpcResponseHeader, Vec<u8>) {
    let mut guard = pipes.pipes.lock().unwrap();
    let entry = match guard.get_mut(&PipeTable::key(req)) {
        Some(entry) => entry,
        None => return (response(req.handle, status::NO_SUCH_PIPE), Vec::new()),
    };

    let mut cursor = Cursor::new(pdu);
    let hdr = match DceRpcRequestHeader::read(&mut cursor) {
        Ok(hdr) => hdr,
        Err(_) => return (response(req.handle, status::BAD_PDU), Vec::new()),
    };
    if hdr.validate().is_err() {
        return (response(req.handle, status::BAD_PDU), Vec::new());
    }

    let body = &pdu[DceRpcRequestHeader::SIZE..];
    if entry.pipe.write(body, hdr.opnum, &ctx.shares).is_err() {
        return (response(req.handle, status::BAD_PDU), Vec::new());
    }
    entry.call_id = hdr.call_id;

    // `IOCTL` is a transact: write immediately followed by a read bounded
    // by the caller's requested read-buffer size (`data_len` doubles as
    // that budget here, same as a real transact-named-pipe call).
    if req.method & rpc_method::IOCTL != 0 {
        return encode_reply(req, entry, pdu.len().max(4096));
    }

    (response(req.handle, status::OK), Vec::new())
}

fn handle_read(
    req: &RpcRequestHeader,
    pdu: &[u8],
    pipes: &PipeTable,
) -> (RpcResponseHeader, Vec<u8>) {
    let mut guard = pipes.pipes.lock().unwrap();
    let entry = match guard.get_mut(&PipeTable::key(req)) {
        Some(entry) => entry,
        None => return (response(req.handle, status::NO_SUCH_PIPE), Vec::new()),
    };
    let budget = if pdu.len() >= 4 {
        u32::from_le_bytes(pdu[..4].try_into().unwrap()) as usize
    } else {
        4096
    };
    encode_reply(req, entry, budget)
}

fn encode_reply(
    req: &RpcRequestHeader,
    entry: &mut OpenPipe,
    budget: usize,
) -> (RpcResponseHeader, Vec<u8>) {
    let (body, _rpc_status) = match entry.pipe.encode_response(budget) {
        Ok(result) => result,
        Err(_) => return (response(req.handle, status::BAD_PDU), Vec::new()),
    };
    // `body` already carries its own trailing Win32-style return code
    // (RPC_OK/RPC_MORE_DATA/RPC_BAD_DATA/RPC_INVALID_LEVEL/...), so every
    // reply is a well-formed RESPONSE PDU regardless of that code — a
    // DCE FAULT PDU is for PDU-level faults, not application status.
    let fragments = match DcerpcFramer::frame_response(&body, entry.call_id, budget.max(1), None) {
        Ok(fragments) => fragments,
        Err(_) => return (response(req.handle, status::BAD_PDU), Vec::new()),
    };
    let payload: Vec<u8> = fragments.into_iter().flatten().collect();
    (response(req.handle, status::OK), payload)
}

fn response(handle: u64, status: u32) -> RpcResponseHeader {
    RpcResponseHeader {
        handle,
        status,
        data_len: 0,
    }
}
