use ksmbd_ipc::messages::{field_str, login_flags, LoginRequest, LoginResponse};

use crate::crypto::Md4;

use super::Context;

/// Derives the expected challenge response from a stored NT hash: MD4 of
/// `nt_hash || challenge`, repeated to fill the 24-byte response field.
fn expected_response(nt_hash: &[u8; 16], challenge: &[u8; 8]) -> [u8; 24] {
    let mut md4 = Md4::new();
    md4.update(nt_hash);
    md4.update(challenge);
    let digest = md4.finish();
    let mut out = [0u8; 24];
    out[..16].copy_from_slice(&digest);
    out[16..24].copy_from_slice(&digest[..8]);
    out
}

/// Validates a login request against the user registry, allocating and
/// registering a session on success (spec §4.4 Login).
pub fn handle_login(req: &LoginRequest, ctx: &Context) -> LoginResponse {
    let username = field_str(&req.username);

    let user = match ctx.users.lookup(username) {
        Some(user) => user,
        None => {
            return LoginResponse {
                handle: req.handle,
                flags: login_flags::INVALID,
                session_id: 0,
            };
        }
    };

    if user.is_disabled() {
        return LoginResponse {
            handle: req.handle,
            flags: login_flags::EXPIRED,
            session_id: 0,
        };
    }

    if user.is_guest() {
        let session_id = next_session_id();
        ctx.sessions.create(session_id, user.clone());
        return LoginResponse {
            handle: req.handle,
            flags: login_flags::SUCCESS | login_flags::GUEST,
            session_id,
        };
    }

    let expected = expected_response(&user.nt_hash, &req.challenge);
    if expected != req.nt_response {
        return LoginResponse {
            handle: req.handle,
            flags: login_flags::INVALID,
            session_id: 0,
        };
    }

    let session_id = next_session_id();
    ctx.sessions.create(session_id, user.clone());
    LoginResponse {
        handle: req.handle,
        flags: login_flags::SUCCESS,
        session_id,
    }
}

fn next_session_id() -> u64 {
    use std::sync::atomic::{AtomicU64, Ordering};
    static NEXT: AtomicU64 = AtomicU64::new(1);
    NEXT.fetch_add(1, Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ksmbd_dtyp::{SessionRegistry, ShareRegistry, User, UserFlags, UserRegistry};
    use std::sync::Arc;

    fn ctx_with_user(name: &str, nt_hash: [u8; 16], flags: UserFlags) -> Context {
        let users = UserRegistry::from_users(vec![User::new(name, nt_hash, flags)]);
        Context::new(
            Arc::new(ShareRegistry::new()),
            Arc::new(users),
            Arc::new(SessionRegistry::new()),
        )
    }

    fn request(username: &str, challenge: [u8; 8], nt_response: [u8; 24]) -> LoginRequest {
        let mut req = LoginRequest {
            handle: 7,
            username: [0u8; 64],
            challenge,
            nt_response,
        };
        req.username[..username.len()].copy_from_slice(username.as_bytes());
        req
    }

    #[test]
    fn correct_response_succeeds_and_allocates_session() {
        let nt_hash = [0x11u8; 16];
        let ctx = ctx_with_user("alice", nt_hash, UserFlags::new());
        let challenge = [1, 2, 3, 4, 5, 6, 7, 8];
        let response = expected_response(&nt_hash, &challenge);

        let resp = handle_login(&request("alice", challenge, response), &ctx);
        assert_eq!(resp.handle, 7);
        assert_eq!(resp.flags, login_flags::SUCCESS);
        assert_ne!(resp.session_id, 0);
        assert!(ctx.sessions.lookup(resp.session_id).is_some());
    }

    #[test]
    fn wrong_response_is_invalid() {
        let nt_hash = [0x11u8; 16];
        let ctx = ctx_with_user("alice", nt_hash, UserFlags::new());
        let resp = handle_login(&request("alice", [0; 8], [0xFF; 24]), &ctx);
        assert_eq!(resp.flags, login_flags::INVALID);
        assert_eq!(resp.session_id, 0);
    }

    #[test]
    fn unknown_user_is_invalid() {
        let ctx = ctx_with_user("alice", [0; 16], UserFlags::new());
        let resp = handle_login(&request("mallory", [0; 8], [0; 24]), &ctx);
        assert_eq!(resp.flags, login_flags::INVALID);
    }

    #[test]
    fn disabled_user_is_expired() {
        let ctx = ctx_with_user("alice", [0; 16], UserFlags::new().with_disabled(true));
        let resp = handle_login(&request("alice", [0; 8], [0; 24]), &ctx);
        assert_eq!(resp.flags, login_flags::EXPIRED);
    }

    #[test]
    fn guest_user_succeeds_without_checking_response() {
        let ctx = ctx_with_user("guest", [0; 16], UserFlags::new().with_guest(true));
        let resp = handle_login(&request("guest", [0; 8], [0xAA; 24]), &ctx);
        assert_eq!(resp.flags, login_flags::SUCCESS | login_flags::GUEST);
    }
}
