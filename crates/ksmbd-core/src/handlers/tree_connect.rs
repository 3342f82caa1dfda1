use ksmbd_ipc::messages::{field_str, tree_connect_flags, TreeConnectRequest, TreeConnectResponse};

use super::Context;

/// Resolves a share by name, applies host and user access rules, and
/// registers a tree-connect on the session (spec §4.4 Tree Connect).
pub fn handle_tree_connect(req: &TreeConnectRequest, ctx: &Context) -> TreeConnectResponse {
    let share_name = field_str(&req.share_name);
    let client_host = field_str(&req.client_host);

    let session = match ctx.sessions.lookup(req.session_id) {
        Some(session) => session,
        None => {
            return TreeConnectResponse {
                handle: req.handle,
                flags: tree_connect_flags::ACCESS_DENIED,
                connect_id: 0,
            };
        }
    };

    let share = match ctx.shares.lookup(share_name) {
        Some(share) => share,
        None => {
            return TreeConnectResponse {
                handle: req.handle,
                flags: tree_connect_flags::NO_SUCH_SHARE,
                connect_id: 0,
            };
        }
    };

    if !share.host_rules.is_allowed(client_host) {
        return TreeConnectResponse {
            handle: req.handle,
            flags: tree_connect_flags::ACCESS_DENIED,
            connect_id: 0,
        };
    }

    let username = session.user().name().to_string();
    let guest_only = session.user().is_guest();

    if share.user_maps.is_invalid(&username) || !share.user_maps.is_valid(&username) {
        return TreeConnectResponse {
            handle: req.handle,
            flags: tree_connect_flags::ACCESS_DENIED,
            connect_id: 0,
        };
    }

    if share.try_connect().is_err() {
        return TreeConnectResponse {
            handle: req.handle,
            flags: tree_connect_flags::ACCESS_DENIED,
            connect_id: 0,
        };
    }

    let writable = !share.flags().readonly() && share.user_maps.can_write(&username);
    let connect_id = session.add_tree_connect(share.clone(), writable, guest_only);

    let mut flags = tree_connect_flags::SUCCESS;
    if writable {
        flags |= tree_connect_flags::WRITABLE;
    }
    if guest_only {
        flags |= tree_connect_flags::GUEST_ONLY;
    }

    TreeConnectResponse {
        handle: req.handle,
        flags,
        connect_id,
    }
}
