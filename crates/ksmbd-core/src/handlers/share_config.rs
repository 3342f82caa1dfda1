use binrw::BinWrite;
use std::io::Cursor;

use ksmbd_ipc::messages::{field_str, ShareConfigRequest, ShareConfigResponsePrefix};

use super::Context;

/// Serializes the full effective configuration of a share: the fixed
/// prefix, the path bytes, and one length-prefixed entry per veto
/// pattern (spec §4.4 Share Config: "payload size computed first" so the
/// IPC loop can size the envelope before writing it).
pub fn handle_share_config(req: &ShareConfigRequest, ctx: &Context) -> Vec<u8> {
    let share_name = field_str(&req.share_name);

    let share = match ctx.shares.lookup(share_name) {
        Some(share) => share,
        None => {
            let prefix = ShareConfigResponsePrefix {
                handle: req.handle,
                found: 0,
                flags: 0,
                create_mask: 0,
                directory_mask: 0,
                max_connections: 0,
                path_len: 0,
                veto_count: 0,
            };
            return encode_prefix(&prefix);
        }
    };

    let path = share.path.to_string_lossy();
    let path_bytes = path.as_bytes();

    let prefix = ShareConfigResponsePrefix {
        handle: req.handle,
        found: 1,
        flags: share_flags_bits(share.flags()),
        create_mask: share.create_mask,
        directory_mask: share.directory_mask,
        max_connections: share.max_connections,
        path_len: path_bytes.len() as u32,
        veto_count: share.veto_list.len() as u32,
    };

    let mut out = encode_prefix(&prefix);
    out.extend_from_slice(path_bytes);
    for pattern in &share.veto_list {
        let bytes = pattern.as_bytes();
        out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
        out.extend_from_slice(bytes);
    }
    out
}

/// Packs a share's attribute bitfield into the plain `u32` the wire
/// format carries (the in-memory type is a `modular-bitfield` struct,
/// not a bare integer).
fn share_flags_bits(flags: ksmbd_dtyp::ShareFlags) -> u32 {
    let mut bits = 0u32;
    if flags.browseable() {
        bits |= 0x01;
    }
    if flags.available() {
        bits |= 0x02;
    }
    if flags.pipe() {
        bits |= 0x04;
    }
    if flags.readonly() {
        bits |= 0x08;
    }
    if flags.guest_ok() {
        bits |= 0x10;
    }
    bits
}

/// Wire size of [`ShareConfigResponsePrefix`]: all-`u32`/`u64` fields, no padding.
const PREFIX_SIZE: usize = 8 + 4 * 7;

fn encode_prefix(prefix: &ShareConfigResponsePrefix) -> Vec<u8> {
    let mut cursor = Cursor::new(Vec::new());
    prefix.write(&mut cursor).expect("fixed-size struct always encodes");
    cursor.into_inner()
}
