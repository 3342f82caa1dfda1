//! User identity and the in-memory user registry.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::RwLock;

use modular_bitfield::prelude::*;

/// Per-user boolean attributes.
#[bitfield(bits = 8)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UserFlags {
    pub guest: bool,
    pub admin: bool,
    pub disabled: bool,
    #[skip]
    __: B5,
}

/// An account loaded from the password database.
#[derive(Debug)]
pub struct User {
    name: String,
    /// MD4-derived NT hash of the account's password.
    pub nt_hash: [u8; 16],
    flags: UserFlags,
}

impl User {
    pub fn new(name: impl Into<String>, nt_hash: [u8; 16], flags: UserFlags) -> Self {
        User {
            name: name.into(),
            nt_hash,
            flags,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn flags(&self) -> UserFlags {
        self.flags
    }

    pub fn is_guest(&self) -> bool {
        self.flags.guest()
    }

    pub fn is_admin(&self) -> bool {
        self.flags.admin()
    }

    pub fn is_disabled(&self) -> bool {
        self.flags.disabled()
    }
}

/// In-memory set of accounts, replaced atomically on password-db reload.
#[derive(Default)]
pub struct UserRegistry {
    users: RwLock<HashMap<String, Arc<User>>>,
}

impl UserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_users(users: Vec<User>) -> Self {
        let registry = Self::new();
        registry.reload(users);
        registry
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<User>> {
        self.users
            .read()
            .unwrap()
            .get(&name.to_ascii_lowercase())
            .cloned()
    }

    /// Atomically replaces the full account set (password-db reload).
    pub fn reload(&self, users: Vec<User>) {
        let map = users
            .into_iter()
            .map(|u| (u.name().to_ascii_lowercase(), Arc::new(u)))
            .collect();
        *self.users.write().unwrap() = map;
    }

    pub fn len(&self) -> usize {
        self.users.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        let registry = UserRegistry::from_users(vec![User::new(
            "Alice",
            [0u8; 16],
            UserFlags::new(),
        )]);
        assert!(registry.lookup("alice").is_some());
        assert!(registry.lookup("ALICE").is_some());
        assert!(registry.lookup("bob").is_none());
    }

    #[test]
    fn disabled_flag_round_trips() {
        let user = User::new("svc", [1u8; 16], UserFlags::new().with_disabled(true));
        assert!(user.is_disabled());
        assert!(!user.is_admin());
    }
}
