//! The `srvsvc` named-pipe RPC interface: `NetShareEnumAll` and
//! `NetShareGetInfo`, restricted to info levels 0 and 1.
//!
//! Grounded on `rpc_srvsvc.c`'s invoke/return split: a request is parsed
//! and invoked once (populating a queue of matching shares), then
//! `encode_response` drains that queue into NDR bytes bounded by the
//! caller's size budget, returning `RPC_MORE_DATA` when entries remain
//! so the caller can invoke it again against a fresh budget.

use std::collections::VecDeque;
use std::sync::Arc;

use ksmbd_dtyp::{Share, ShareRegistry};

use crate::error::{NdrError, Result};
use crate::ndr::{NdrReader, NdrWriter};

pub const OPNUM_NET_SHARE_ENUM_ALL: u16 = 15;
pub const OPNUM_NET_SHARE_GET_INFO: u16 = 16;

pub const LEVEL_NAME_ONLY: u32 = 0;
pub const LEVEL_NAME_TYPE_COMMENT: u32 = 1;

pub const RPC_OK: u32 = 0x00000000;
/// `ERROR_INVALID_DATA`
pub const RPC_BAD_DATA: u32 = 0x0000000D;
/// `ERROR_INVALID_LEVEL`
pub const RPC_INVALID_LEVEL: u32 = 0x0000007C;
/// `ERROR_CALL_NOT_IMPLEMENTED`
pub const RPC_NOT_IMPLEMENTED: u32 = 0x00000078;
/// `ERROR_MORE_DATA`
pub const RPC_MORE_DATA: u32 = 0x000000EA;

const SHARE_TYPE_DISKTREE: u32 = 0;
const SHARE_TYPE_IPC: u32 = 3;

/// `STYPE_DISKTREE`/`STYPE_IPC` only, matching the original `__share_type`
/// exactly: a share reports IPC if it has the pipe flag or an `IPC`-style
/// name, DISKTREE otherwise. No hidden-share bit is synthesized from the
/// name (a real `$`-suffixed share like `data$` is still just DISKTREE).
fn share_type_of(share: &Share) -> u32 {
    if share.is_ipc() {
        SHARE_TYPE_IPC
    } else {
        SHARE_TYPE_DISKTREE
    }
}

/// Per-call state carried between a pipe's `write()` (parse + invoke) and
/// one or more `encode_response()` calls (drain into NDR bytes).
enum Invocation {
    EnumAll {
        level: u32,
        max_size: u32,
        total_entries: u32,
        entries: VecDeque<Arc<Share>>,
    },
    GetInfo {
        level: u32,
        entry: Option<Arc<Share>>,
    },
    Unsupported,
}

/// State machine for one open instance of the `\\PIPE\\srvsvc` handle.
#[derive(Default)]
pub struct SrvsvcPipe {
    invocation: Option<Invocation>,
}

impl SrvsvcPipe {
    pub fn new() -> Self {
        SrvsvcPipe { invocation: None }
    }

    /// Parses and invokes a request body for `opnum`, filling the pipe's
    /// entry queue. Malformed NDR is the only failure mode here — level
    /// validity and not-found lookups are resolved lazily by
    /// [`Self::encode_response`], matching the original's invoke-always,
    /// validate-on-return split.
    pub fn write(&mut self, body: &[u8], opnum: u16, shares: &ShareRegistry) -> Result<()> {
        let mut r = NdrReader::new(body);

        match opnum {
            OPNUM_NET_SHARE_ENUM_ALL => {
                let server_name_ptr = r.read_ptr()?;
                if server_name_ptr != 0 {
                    let _server_name = r.read_conformant_varying_string()?;
                }
                let level = r.read_u32()?;
                let _switch_selector = r.read_u32()?;
                let _container_ref_id = r.read_ptr()?;
                let _container_count = r.read_u32()?;
                let container_ptr = r.read_ptr()?;
                if container_ptr != 0 {
                    return Err(NdrError::BadData("container array pointer must be null"));
                }
                let max_size = r.read_u32()?;
                let resume_ptr = r.read_ptr()?;
                if resume_ptr != 0 {
                    let _resume_handle = r.read_u32()?;
                }

                let entries: VecDeque<Arc<Share>> = shares
                    .snapshot()
                    .into_iter()
                    .filter(|s| s.flags().browseable() && s.flags().available())
                    .collect();
                let total_entries = entries.len() as u32;

                self.invocation = Some(Invocation::EnumAll {
                    level,
                    max_size,
                    total_entries,
                    entries,
                });
                Ok(())
            }
            OPNUM_NET_SHARE_GET_INFO => {
                let server_name_ptr = r.read_ptr()?;
                if server_name_ptr != 0 {
                    let _server_name = r.read_conformant_varying_string()?;
                }
                let share_name = r.read_conformant_varying_string()?;
                let level = r.read_u32()?;

                let entry = shares.lookup(&share_name);
                self.invocation = Some(Invocation::GetInfo { level, entry });
                Ok(())
            }
            _ => {
                self.invocation = Some(Invocation::Unsupported);
                Ok(())
            }
        }
    }

    /// Drains as much of the invoked entry queue as fits in `budget` bytes
    /// (the lesser of the client's requested `max_size` and the caller's
    /// own transport allowance), returning the encoded NDR body and a
    /// Win32-style return code. `RPC_MORE_DATA` means entries remain and
    /// the caller should invoke this again for the next chunk.
    ///
    /// Every body ends with that same return code as its final `u32`
    /// field (spec §4.3 step 7, `ndr_write_int32(dce, status)` in the
    /// original), so the return value is never only a side channel the
    /// caller happens to also receive out of band.
    pub fn encode_response(&mut self, budget: usize) -> Result<(Vec<u8>, u32)> {
        match self.invocation.take() {
            None => Err(NdrError::NotReady),
            Some(Invocation::Unsupported) => {
                let mut w = NdrWriter::new();
                w.write_u32(RPC_NOT_IMPLEMENTED);
                Ok((w.into_bytes(), RPC_NOT_IMPLEMENTED))
            }
            Some(Invocation::GetInfo { level, entry }) => {
                let mut w = NdrWriter::new();
                w.write_union_selector(level);
                if level != LEVEL_NAME_ONLY && level != LEVEL_NAME_TYPE_COMMENT {
                    w.write_u32(RPC_INVALID_LEVEL);
                    return Ok((w.into_bytes(), RPC_INVALID_LEVEL));
                }
                match entry {
                    None => {
                        w.write_u32(RPC_BAD_DATA);
                        Ok((w.into_bytes(), RPC_BAD_DATA))
                    }
                    Some(share) => {
                        encode_entry(&mut w, &share, level);
                        w.write_u32(RPC_OK);
                        Ok((w.into_bytes(), RPC_OK))
                    }
                }
            }
            Some(Invocation::EnumAll {
                level,
                max_size,
                total_entries,
                mut entries,
            }) => {
                let mut w = NdrWriter::new();
                w.write_union_selector(level);
                if level != LEVEL_NAME_ONLY && level != LEVEL_NAME_TYPE_COMMENT {
                    w.write_u32(RPC_INVALID_LEVEL);
                    return Ok((w.into_bytes(), RPC_INVALID_LEVEL));
                }

                let effective_budget = budget.min(max_size as usize);
                let entry_size = if level == LEVEL_NAME_ONLY {
                    entry_size_ctr0
                } else {
                    entry_size_ctr1
                };

                let mut chosen: Vec<Arc<Share>> = Vec::new();
                let mut used = 4; // entry_count header already accounted below
                while let Some(share) = entries.front() {
                    let sz = entry_size(share);
                    if !chosen.is_empty() && used + sz > effective_budget {
                        break;
                    }
                    used += sz;
                    chosen.push(entries.pop_front().unwrap());
                }

                w.write_u32(chosen.len() as u32); // entry_count (this fragment)
                for share in &chosen {
                    encode_entry_rep(&mut w, share, level);
                }
                for share in &chosen {
                    encode_entry_data(&mut w, share, level);
                }
                w.write_u32(total_entries);

                let more = !entries.is_empty();
                if more {
                    self.invocation = Some(Invocation::EnumAll {
                        level,
                        max_size,
                        total_entries,
                        entries,
                    });
                    w.write_u32(1); // resume handle, non-null: more data follows
                    w.write_u32(RPC_MORE_DATA);
                    Ok((w.into_bytes(), RPC_MORE_DATA))
                } else {
                    w.write_u32(0);
                    w.write_u32(RPC_OK);
                    Ok((w.into_bytes(), RPC_OK))
                }
            }
        }
    }

    pub fn is_ready(&self) -> bool {
        self.invocation.is_some()
    }
}

fn entry_size_ctr0(share: &Share) -> usize {
    share.name().encode_utf16().count() * 2 + 4 * 4
}

fn entry_size_ctr1(share: &Share) -> usize {
    let name_len = share.name().encode_utf16().count() * 2;
    let comment_len = share.comment.encode_utf16().count() * 2;
    name_len + comment_len + 9 * 4
}

fn encode_entry_rep(w: &mut NdrWriter, share: &Share, level: u32) {
    let name_ref = w.alloc_referent();
    w.write_referent(name_ref);
    if level == LEVEL_NAME_TYPE_COMMENT {
        w.write_u32(share_type_of(share));
        let comment_ref = w.alloc_referent();
        w.write_referent(comment_ref);
    }
}

fn encode_entry_data(w: &mut NdrWriter, share: &Share, level: u32) {
    w.write_conformant_varying_string(share.name());
    if level == LEVEL_NAME_TYPE_COMMENT {
        w.write_conformant_varying_string(&share.comment);
    }
}

fn encode_entry(w: &mut NdrWriter, share: &Share, level: u32) {
    encode_entry_rep(w, share, level);
    encode_entry_data(w, share, level);
}

#[cfg(test)]
mod tests {
    use super::*;
    use ksmbd_dtyp::ShareFlags;

    fn registry_with(names: &[&str]) -> ShareRegistry {
        let shares: Vec<Share> = names
            .iter()
            .map(|n| {
                Share::new(
                    *n,
                    "/srv",
                    "a comment",
                    ShareFlags::new().with_browseable(true).with_available(true),
                    0,
                )
            })
            .collect();
        ShareRegistry::from_shares(shares).unwrap()
    }

    fn enum_all_request_body(level: u32, max_size: u32) -> Vec<u8> {
        let mut w = NdrWriter::new();
        w.write_null_referent(); // server_name ptr = NULL
        w.write_u32(level);
        w.write_u32(level); // switch selector mirrors level
        w.write_u32(1); // container ref id
        w.write_u32(0); // container count
        w.write_null_referent(); // container array pointer, must be null
        w.write_u32(max_size);
        w.write_null_referent(); // resume handle ptr = NULL
        w.into_bytes()
    }

    fn get_info_request_body(share: &str, level: u32) -> Vec<u8> {
        let mut w = NdrWriter::new();
        w.write_null_referent();
        w.write_conformant_varying_string(share);
        w.write_u32(level);
        w.into_bytes()
    }

    #[test]
    fn enum_all_level0_round_trips() {
        let shares = registry_with(&["data", "home"]);
        let mut pipe = SrvsvcPipe::new();
        pipe.write(&enum_all_request_body(0, 4096), OPNUM_NET_SHARE_ENUM_ALL, &shares)
            .unwrap();
        let (body, status) = pipe.encode_response(4096).unwrap();
        assert_eq!(status, RPC_OK);

        let mut r = NdrReader::new(&body);
        assert_eq!(r.read_union_selector().unwrap(), 0);
        let count = r.read_u32().unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn unknown_level_fails_fast_after_selector() {
        let shares = registry_with(&["data"]);
        let mut pipe = SrvsvcPipe::new();
        pipe.write(&enum_all_request_body(7, 4096), OPNUM_NET_SHARE_ENUM_ALL, &shares)
            .unwrap();
        let (body, status) = pipe.encode_response(4096).unwrap();
        assert_eq!(status, RPC_INVALID_LEVEL);
        assert_eq!(body.len(), 8); // union selector + trailing return code

        let mut r = NdrReader::new(&body);
        r.read_union_selector().unwrap();
        assert_eq!(r.read_u32().unwrap(), RPC_INVALID_LEVEL);
    }

    #[test]
    fn get_info_miss_returns_bad_data() {
        let shares = registry_with(&["data"]);
        let mut pipe = SrvsvcPipe::new();
        pipe.write(&get_info_request_body("nope", 1), OPNUM_NET_SHARE_GET_INFO, &shares)
            .unwrap();
        let (_body, status) = pipe.encode_response(4096).unwrap();
        assert_eq!(status, RPC_BAD_DATA);
    }

    #[test]
    fn non_null_container_pointer_is_rejected() {
        let shares = registry_with(&["data"]);
        let mut body = enum_all_request_body(0, 4096);
        // container array pointer sits right after container_count (offset 20..24)
        body[20..24].copy_from_slice(&1u32.to_le_bytes());
        let mut pipe = SrvsvcPipe::new();
        assert!(pipe
            .write(&body, OPNUM_NET_SHARE_ENUM_ALL, &shares)
            .is_err());
    }

    #[test]
    fn fragmentation_leaves_more_data_and_drains() {
        let names: Vec<String> = (0..40).map(|i| format!("share{i}")).collect();
        let refs: Vec<&str> = names.iter().map(|s| s.as_str()).collect();
        let shares = registry_with(&refs);

        let mut pipe = SrvsvcPipe::new();
        pipe.write(&enum_all_request_body(0, 4096), OPNUM_NET_SHARE_ENUM_ALL, &shares)
            .unwrap();

        let (first, status) = pipe.encode_response(256).unwrap();
        assert_eq!(status, RPC_MORE_DATA);
        let mut r = NdrReader::new(&first);
        r.read_union_selector().unwrap();
        let first_count = r.read_u32().unwrap();
        assert!((first_count as usize) < names.len());

        let mut total_seen = first_count;
        loop {
            let (_chunk, status) = pipe.encode_response(256).unwrap();
            if status == RPC_OK {
                break;
            }
            total_seen += 1; // at least one more entry landed in a further chunk
            if total_seen as usize > names.len() + 5 {
                panic!("fragmentation never completed");
            }
        }
    }
}
