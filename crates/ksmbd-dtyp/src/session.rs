//! Session and tree-connect state.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use crate::error::{DtypError, Result};
use crate::user::User;

/// A client's binding of a session to a share.
#[derive(Debug, Clone)]
pub struct TreeConnect {
    pub connect_id: u32,
    pub share: Arc<crate::share::Share>,
    pub writable: bool,
    pub guest_only: bool,
}

/// An authenticated client context, identified by a 64-bit id assigned by
/// the kernel at session-setup time.
pub struct Session {
    id: u64,
    user: Arc<User>,
    tree_connects: Mutex<HashMap<u32, TreeConnect>>,
    next_connect_id: AtomicU32,
}

impl Session {
    pub fn new(id: u64, user: Arc<User>) -> Self {
        Session {
            id,
            user,
            tree_connects: Mutex::new(HashMap::new()),
            next_connect_id: AtomicU32::new(1),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn user(&self) -> &Arc<User> {
        &self.user
    }

    /// Registers a new tree-connect and returns its connect id.
    pub fn add_tree_connect(
        &self,
        share: Arc<crate::share::Share>,
        writable: bool,
        guest_only: bool,
    ) -> u32 {
        let connect_id = self.next_connect_id.fetch_add(1, Ordering::Relaxed);
        self.tree_connects.lock().unwrap().insert(
            connect_id,
            TreeConnect {
                connect_id,
                share,
                writable,
                guest_only,
            },
        );
        connect_id
    }

    pub fn tree_connect(&self, connect_id: u32) -> Option<TreeConnect> {
        self.tree_connects.lock().unwrap().get(&connect_id).cloned()
    }

    /// Removes a tree-connect, releasing the share connection slot it held.
    pub fn remove_tree_connect(&self, connect_id: u32) -> Result<()> {
        let removed = self.tree_connects.lock().unwrap().remove(&connect_id);
        match removed {
            Some(tc) => {
                tc.share.disconnect();
                Ok(())
            }
            None => Err(DtypError::NoSuchTreeConnect(connect_id)),
        }
    }

    pub fn tree_connect_count(&self) -> usize {
        self.tree_connects.lock().unwrap().len()
    }
}

/// Per-connection session state, indexed by the kernel-assigned session id.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<u64, Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates and registers a new session, replacing any existing session
    /// under the same id (a reused id implies the old connection reset).
    pub fn create(&self, id: u64, user: Arc<User>) -> Arc<Session> {
        let session = Arc::new(Session::new(id, user));
        self.sessions.write().unwrap().insert(id, session.clone());
        session
    }

    pub fn lookup(&self, id: u64) -> Option<Arc<Session>> {
        self.sessions.read().unwrap().get(&id).cloned()
    }

    pub fn remove(&self, id: u64) -> Option<Arc<Session>> {
        self.sessions.write().unwrap().remove(&id)
    }

    pub fn len(&self) -> usize {
        self.sessions.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
