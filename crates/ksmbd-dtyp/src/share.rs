//! Share identity, attributes and the in-memory share registry.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use modular_bitfield::prelude::*;

use crate::error::{DtypError, Result};

/// Default file create mask applied to new files on a share (`0744`).
pub const DEFAULT_CREATE_MASK: u32 = 0o744;
/// Default directory create mask applied to new directories on a share (`0755`).
pub const DEFAULT_DIRECTORY_MASK: u32 = 0o755;

/// Per-share boolean attributes.
///
/// Reference: spec §3 Share Attributes.
#[bitfield(bits = 8)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShareFlags {
    pub browseable: bool,
    pub available: bool,
    pub pipe: bool,
    pub readonly: bool,
    pub guest_ok: bool,
    #[skip]
    __: B3,
}

/// The five user-map categories a share keeps (MS-SRVS / smb.conf `valid users`, etc).
#[derive(Debug, Clone, Default)]
pub struct UserMaps {
    pub admin: HashSet<String>,
    pub valid: HashSet<String>,
    pub invalid: HashSet<String>,
    pub read: HashSet<String>,
    pub write: HashSet<String>,
}

impl UserMaps {
    fn contains(set: &HashSet<String>, name: &str) -> bool {
        set.iter().any(|u| u.eq_ignore_ascii_case(name))
    }

    pub fn is_admin(&self, name: &str) -> bool {
        Self::contains(&self.admin, name)
    }

    pub fn is_valid(&self, name: &str) -> bool {
        self.valid.is_empty() || Self::contains(&self.valid, name)
    }

    pub fn is_invalid(&self, name: &str) -> bool {
        Self::contains(&self.invalid, name)
    }

    pub fn can_read(&self, name: &str) -> bool {
        self.read.is_empty() || Self::contains(&self.read, name)
    }

    pub fn can_write(&self, name: &str) -> bool {
        Self::contains(&self.write, name)
    }
}

/// Host allow/deny lists.
///
/// Only literal hostname matching is implemented; CIDR ranges and
/// wildcards are left as an explicit extension seam (spec §9 Open Questions).
#[derive(Debug, Clone, Default)]
pub struct HostRules {
    pub allow: Vec<String>,
    pub deny: Vec<String>,
}

impl HostRules {
    /// Returns whether `host` may connect, per the allow/deny lists.
    ///
    // TODO(host-match): add CIDR and glob support; today this is a literal
    // hostname comparison, same limitation the original daemon carried.
    pub fn is_allowed(&self, host: &str) -> bool {
        if self.deny.iter().any(|h| h.eq_ignore_ascii_case(host)) {
            return false;
        }
        if self.allow.is_empty() {
            return true;
        }
        self.allow.iter().any(|h| h.eq_ignore_ascii_case(host))
    }
}

/// A configured, exported filesystem subtree (or the special IPC endpoint).
#[derive(Debug)]
pub struct Share {
    name: String,
    pub path: PathBuf,
    pub comment: String,
    flags: ShareFlags,
    pub create_mask: u32,
    pub directory_mask: u32,
    pub max_connections: u32,
    num_connections: AtomicU32,
    pub veto_list: Vec<String>,
    pub user_maps: UserMaps,
    pub host_rules: HostRules,
}

impl Share {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        path: impl Into<PathBuf>,
        comment: impl Into<String>,
        flags: ShareFlags,
        max_connections: u32,
    ) -> Self {
        Share {
            name: name.into(),
            path: path.into(),
            comment: comment.into(),
            flags,
            create_mask: DEFAULT_CREATE_MASK,
            directory_mask: DEFAULT_DIRECTORY_MASK,
            max_connections,
            num_connections: AtomicU32::new(0),
            veto_list: Vec::new(),
            user_maps: UserMaps::default(),
            host_rules: HostRules::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn flags(&self) -> ShareFlags {
        self.flags
    }

    /// Reports the share's DCE/RPC share type category.
    ///
    /// A `PIPE`-flagged share, or one whose name starts with `IPC`
    /// (case-insensitive), is always `IPC` regardless of other flags.
    pub fn is_ipc(&self) -> bool {
        self.flags.pipe() || self.name.len() >= 3 && self.name[..3].eq_ignore_ascii_case("IPC")
    }

    pub fn num_connections(&self) -> u32 {
        self.num_connections.load(Ordering::Acquire)
    }

    /// Attempts to register a new connection against `max_connections`.
    /// `max_connections == 0` means unlimited.
    pub fn try_connect(&self) -> Result<()> {
        loop {
            let current = self.num_connections.load(Ordering::Acquire);
            if self.max_connections > 0 && current >= self.max_connections {
                return Err(DtypError::ConnectionLimitReached(self.name.clone()));
            }
            if self
                .num_connections
                .compare_exchange_weak(
                    current,
                    current + 1,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
            {
                return Ok(());
            }
        }
    }

    /// Releases a connection previously counted by [`Share::try_connect`].
    pub fn disconnect(&self) {
        let _ = self
            .num_connections
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| {
                Some(c.saturating_sub(1))
            });
    }
}

/// In-memory set of configured shares, keyed case-insensitively by name.
///
/// Entries are individually reference-counted ([`Arc<Share>`]) so that a
/// writer (config reload) can swap the whole map while readers holding a
/// share reference from before the swap keep seeing a consistent entry.
#[derive(Default)]
pub struct ShareRegistry {
    shares: std::sync::RwLock<HashMap<String, Arc<Share>>>,
}

impl ShareRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_shares(shares: Vec<Share>) -> Result<Self> {
        let registry = Self::new();
        for share in shares {
            registry.insert(share)?;
        }
        Ok(registry)
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<Share>> {
        self.shares
            .read()
            .unwrap()
            .get(&name.to_ascii_lowercase())
            .cloned()
    }

    pub fn insert(&self, share: Share) -> Result<()> {
        let key = share.name().to_ascii_lowercase();
        let mut guard = self.shares.write().unwrap();
        if guard.contains_key(&key) {
            return Err(DtypError::ShareExists(share.name().to_string()));
        }
        guard.insert(key, Arc::new(share));
        Ok(())
    }

    pub fn remove(&self, name: &str) -> Option<Arc<Share>> {
        self.shares.write().unwrap().remove(&name.to_ascii_lowercase())
    }

    /// A stable point-in-time snapshot of every registered share, in
    /// insertion/iteration order of the underlying map. Callers (e.g. an
    /// in-flight `NetShareEnumAll`) should take this once at invoke time
    /// rather than re-reading the registry per entry, so a concurrent
    /// reload cannot hand back a mixture of old and new entries.
    pub fn snapshot(&self) -> Vec<Arc<Share>> {
        self.shares.read().unwrap().values().cloned().collect()
    }

    /// Atomically replaces the full share set (config reload).
    pub fn reload(&self, shares: Vec<Share>) -> Result<()> {
        let mut map = HashMap::with_capacity(shares.len());
        for share in shares {
            let key = share.name().to_ascii_lowercase();
            if map.contains_key(&key) {
                return Err(DtypError::ShareExists(share.name().to_string()));
            }
            map.insert(key, Arc::new(share));
        }
        *self.shares.write().unwrap() = map;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.shares.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
