use ksmbd_ipc::messages::LogoutRequest;

use super::Context;

/// Removes a session and every tree-connect it held. No response payload
/// beyond the envelope itself (spec §4.4 Logout).
pub fn handle_logout(req: &LogoutRequest, ctx: &Context) {
    ctx.sessions.remove(req.session_id);
}
