//! DCE/RPC PDU headers and fragment framing for the srvsvc named pipe.
//!
//! Reference: DCE 1.1 RPC, chapter 12 (connection-oriented PDU format),
//! restricted to the `request`/`response` ptypes this control plane
//! actually exchanges over the named pipe.

use binrw::prelude::*;
use modular_bitfield::prelude::*;

use crate::error::{NdrError, Result};

/// `pfc_flags` bitfield (DCE 1.1 RPC §12.6.3.1).
#[bitfield(bits = 8)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PfcFlags {
    pub first_frag: bool,
    pub last_frag: bool,
    pub pending_cancel: bool,
    #[skip]
    __: B1,
    pub conc_mpx: bool,
    pub did_not_execute: bool,
    pub maybe: bool,
    pub object: bool,
}

impl PfcFlags {
    pub fn single_fragment() -> Self {
        PfcFlags::new().with_first_frag(true).with_last_frag(true)
    }
}

/// The little-endian, ASCII/IEEE float, no-padding `packed_drep` this
/// daemon always sends and is the only one it accepts on requests.
pub const PACKED_DREP_LE: [u8; 4] = [0x10, 0x00, 0x00, 0x00];

const PTYPE_REQUEST: u8 = 0x00;
const PTYPE_RESPONSE: u8 = 0x02;
const PTYPE_FAULT: u8 = 0x03;

/// 24-byte `rpcconn_request_hdr_t` prefix shared by request PDUs.
#[derive(Debug, Clone, BinRead, BinWrite)]
#[brw(little)]
pub struct DceRpcRequestHeader {
    pub rpc_vers: u8,
    pub rpc_vers_minor: u8,
    pub ptype: u8,
    pfc_flags_raw: u8,
    pub packed_drep: [u8; 4],
    pub frag_length: u16,
    pub auth_length: u16,
    pub call_id: u32,
    pub alloc_hint: u32,
    pub p_cont_id: u16,
    pub opnum: u16,
}

impl DceRpcRequestHeader {
    pub const SIZE: usize = 24;

    pub fn pfc_flags(&self) -> PfcFlags {
        PfcFlags::from_bytes([self.pfc_flags_raw])
    }

    pub fn validate(&self) -> Result<()> {
        if self.rpc_vers != 5 || self.rpc_vers_minor != 0 {
            return Err(NdrError::BadPdu("unsupported rpc_vers"));
        }
        if self.ptype != PTYPE_REQUEST {
            return Err(NdrError::BadPdu("expected request ptype"));
        }
        if self.packed_drep != PACKED_DREP_LE {
            return Err(NdrError::BadPdu("unsupported packed_drep"));
        }
        Ok(())
    }
}

/// 24-byte `rpcconn_response_hdr_t` prefix this daemon emits.
#[derive(Debug, Clone, BinRead, BinWrite)]
#[brw(little)]
pub struct DceRpcResponseHeader {
    pub rpc_vers: u8,
    pub rpc_vers_minor: u8,
    pub ptype: u8,
    pfc_flags_raw: u8,
    pub packed_drep: [u8; 4],
    pub frag_length: u16,
    pub auth_length: u16,
    pub call_id: u32,
    pub alloc_hint: u32,
    pub p_cont_id: u16,
    pub cancel_count: u8,
    pub reserved: u8,
}

impl DceRpcResponseHeader {
    pub const SIZE: usize = 24;

    pub fn new(call_id: u32, alloc_hint: u32, pfc_flags: PfcFlags) -> Self {
        DceRpcResponseHeader {
            rpc_vers: 5,
            rpc_vers_minor: 0,
            ptype: PTYPE_RESPONSE,
            pfc_flags_raw: pfc_flags.into_bytes()[0],
            packed_drep: PACKED_DREP_LE,
            frag_length: 0,
            auth_length: 0,
            call_id,
            alloc_hint,
            p_cont_id: 0,
            cancel_count: 0,
            reserved: 0,
        }
    }

    pub fn pfc_flags(&self) -> PfcFlags {
        PfcFlags::from_bytes([self.pfc_flags_raw])
    }

    pub fn new_fault(call_id: u32) -> Self {
        let mut hdr = Self::new(call_id, 0, PfcFlags::single_fragment());
        hdr.ptype = PTYPE_FAULT;
        hdr
    }
}

/// Splits a response body into DCE/RPC fragments no larger than the
/// peer's advertised `max_size`, writing each fragment's header with a
/// back-patched `frag_length` and correct `first_frag`/`last_frag` bits.
///
/// Grounded on the header-reservation/back-patch pattern `smb-msg`'s
/// request/response framing macros use to compute sizes after encoding.
pub struct DcerpcFramer;

impl DcerpcFramer {
    /// Frames `body` (already-encoded NDR bytes) for opnum `opnum` on
    /// `call_id`, split so that no fragment exceeds `max_frag_size` total
    /// bytes (header included). Returns one or more complete wire
    /// fragments in order.
    pub fn frame_response(
        body: &[u8],
        call_id: u32,
        max_frag_size: usize,
        fault: Option<u32>,
    ) -> Result<Vec<Vec<u8>>> {
        if let Some(status) = fault {
            let hdr = DceRpcResponseHeader::new_fault(call_id);
            let mut buf = Vec::with_capacity(DceRpcResponseHeader::SIZE + 4);
            hdr.write(&mut std::io::Cursor::new(&mut buf))
                .map_err(|_| NdrError::BadPdu("failed to encode fault header"))?;
            buf.extend_from_slice(&status.to_le_bytes());
            let frag_len = buf.len() as u16;
            buf[8..10].copy_from_slice(&frag_len.to_le_bytes());
            return Ok(vec![buf]);
        }

        let payload_budget = max_frag_size.saturating_sub(DceRpcResponseHeader::SIZE);
        if payload_budget == 0 {
            return Err(NdrError::BadPdu("max_frag_size too small for a header"));
        }

        let chunks: Vec<&[u8]> = if body.is_empty() {
            vec![&[][..]]
        } else {
            body.chunks(payload_budget).collect()
        };

        let total = chunks.len();
        let mut frags = Vec::with_capacity(total);
        for (idx, chunk) in chunks.into_iter().enumerate() {
            let flags = PfcFlags::new()
                .with_first_frag(idx == 0)
                .with_last_frag(idx == total - 1);
            let hdr = DceRpcResponseHeader::new(call_id, body.len() as u32, flags);
            let mut buf = Vec::with_capacity(DceRpcResponseHeader::SIZE + chunk.len());
            hdr.write(&mut std::io::Cursor::new(&mut buf))
                .map_err(|_| NdrError::BadPdu("failed to encode response header"))?;
            buf.extend_from_slice(chunk);
            let frag_len = buf.len() as u16;
            buf[8..10].copy_from_slice(&frag_len.to_le_bytes());
            frags.push(buf);
        }
        Ok(frags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use binrw::BinRead;

    fn request_bytes(opnum: u16, body_len: usize) -> Vec<u8> {
        let hdr = DceRpcRequestHeader {
            rpc_vers: 5,
            rpc_vers_minor: 0,
            ptype: PTYPE_REQUEST,
            pfc_flags_raw: PfcFlags::single_fragment().into_bytes()[0],
            packed_drep: PACKED_DREP_LE,
            frag_length: (DceRpcRequestHeader::SIZE + body_len) as u16,
            auth_length: 0,
            call_id: 1,
            alloc_hint: body_len as u32,
            p_cont_id: 0,
            opnum,
        };
        let mut buf = Vec::new();
        hdr.write(&mut std::io::Cursor::new(&mut buf)).unwrap();
        buf
    }

    #[test]
    fn request_header_round_trips() {
        let bytes = request_bytes(15, 8);
        let mut cursor = std::io::Cursor::new(&bytes);
        let hdr = DceRpcRequestHeader::read(&mut cursor).unwrap();
        hdr.validate().unwrap();
        assert_eq!(hdr.opnum, 15);
        assert!(hdr.pfc_flags().first_frag());
        assert!(hdr.pfc_flags().last_frag());
    }

    #[test]
    fn rejects_bad_drep() {
        let mut bytes = request_bytes(15, 0);
        bytes[4] = 0x00; // corrupt packed_drep
        let mut cursor = std::io::Cursor::new(&bytes);
        let hdr = DceRpcRequestHeader::read(&mut cursor).unwrap();
        assert!(matches!(hdr.validate(), Err(NdrError::BadPdu(_))));
    }

    #[test]
    fn frames_split_under_max_size() {
        let body = vec![0xABu8; 600];
        let frags = DcerpcFramer::frame_response(&body, 9, 256, None).unwrap();
        assert!(frags.len() > 1);
        for f in &frags {
            assert!(f.len() <= 256);
        }
        let first_hdr_flags = PfcFlags::from_bytes([frags[0][3]]);
        assert!(first_hdr_flags.first_frag());
        assert!(!first_hdr_flags.last_frag());
        let last = frags.last().unwrap();
        let last_hdr_flags = PfcFlags::from_bytes([last[3]]);
        assert!(last_hdr_flags.last_frag());
    }

    #[test]
    fn single_fragment_sets_both_bits() {
        let body = vec![0x11u8; 10];
        let frags = DcerpcFramer::frame_response(&body, 1, 4096, None).unwrap();
        assert_eq!(frags.len(), 1);
        let flags = PfcFlags::from_bytes([frags[0][3]]);
        assert!(flags.first_frag() && flags.last_frag());
    }

    #[test]
    fn fault_frame_carries_status() {
        let frags = DcerpcFramer::frame_response(&[], 2, 4096, Some(0x0000007C)).unwrap();
        assert_eq!(frags.len(), 1);
        assert_eq!(frags[0][2], PTYPE_FAULT);
        let status = u32::from_le_bytes(frags[0][24..28].try_into().unwrap());
        assert_eq!(status, 0x0000007C);
    }
}
