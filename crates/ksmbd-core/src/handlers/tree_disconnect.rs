use ksmbd_ipc::messages::TreeDisconnectRequest;

use super::Context;

/// Releases a tree-connect and the share connection slot it held. No
/// response payload beyond what the IPC loop itself echoes (spec §4.4
/// Tree Disconnect: fire-and-forget from the kernel's perspective).
pub fn handle_tree_disconnect(req: &TreeDisconnectRequest, ctx: &Context) {
    if let Some(session) = ctx.sessions.lookup(req.session_id) {
        let _ = session.remove_tree_connect(req.connect_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ksmbd_dtyp::{Share, ShareFlags, ShareRegistry, SessionRegistry, User, UserFlags, UserRegistry};
    use std::sync::Arc;

    #[test]
    fn releases_share_slot_on_disconnect() {
        let share = Arc::new(Share::new(
            "data",
            "/srv/data",
            "",
            ShareFlags::new().with_browseable(true).with_available(true),
            1,
        ));
        share.try_connect().unwrap();

        let sessions = SessionRegistry::new();
        let session = sessions.create(1, Arc::new(User::new("alice", [0; 16], UserFlags::new())));
        let connect_id = session.add_tree_connect(share.clone(), true, false);

        let ctx = Context::new(
            Arc::new(ShareRegistry::new()),
            Arc::new(UserRegistry::new()),
            Arc::new(sessions),
        );

        handle_tree_disconnect(
            &TreeDisconnectRequest {
                handle: 1,
                session_id: 1,
                connect_id,
            },
            &ctx,
        );

        assert_eq!(share.num_connections(), 0);
    }

    #[test]
    fn unknown_session_is_a_no_op() {
        let ctx = Context::new(
            Arc::new(ShareRegistry::new()),
            Arc::new(UserRegistry::new()),
            Arc::new(SessionRegistry::new()),
        );
        handle_tree_disconnect(
            &TreeDisconnectRequest {
                handle: 1,
                session_id: 999,
                connect_id: 1,
            },
            &ctx,
        );
    }
}
