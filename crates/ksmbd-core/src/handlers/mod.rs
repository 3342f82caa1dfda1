//! Request handlers: one module per IPC message type (spec §4.4).
//!
//! Every handler takes a parsed, size-checked request and the shared
//! [`Context`], and returns a response struct carrying the same
//! `handle` the request came in with.

mod login;
mod logout;
mod rpc;
mod share_config;
mod tree_connect;
mod tree_disconnect;

pub use login::handle_login;
pub use logout::handle_logout;
pub use rpc::{handle_rpc, PipeTable};
pub use share_config::handle_share_config;
pub use tree_connect::handle_tree_connect;
pub use tree_disconnect::handle_tree_disconnect;

use std::sync::{Arc, RwLock};

use ksmbd_dtyp::{SessionRegistry, ShareRegistry, UserRegistry};

use crate::config::GlobalConfig;

/// Shared, reference-counted state every handler is plumbed with
/// explicitly (spec §9 "Global registries" design note: no hidden
/// process-wide singletons, just an explicit context object).
#[derive(Clone)]
pub struct Context {
    pub shares: Arc<ShareRegistry>,
    pub users: Arc<UserRegistry>,
    pub sessions: Arc<SessionRegistry>,
    pub global: Arc<RwLock<GlobalConfig>>,
}

impl Context {
    pub fn new(
        shares: Arc<ShareRegistry>,
        users: Arc<UserRegistry>,
        sessions: Arc<SessionRegistry>,
    ) -> Self {
        Context {
            shares,
            users,
            sessions,
            global: Arc::new(RwLock::new(GlobalConfig::default())),
        }
    }

    /// Swaps in a newly loaded `[global]` section (startup or `SIGHUP`
    /// reload), applying any CLI `--port` override on top of it.
    pub fn set_global(&self, mut global: GlobalConfig, port_override: Option<u16>) {
        if port_override.is_some() {
            global.tcp_port = port_override;
        }
        *self.global.write().unwrap() = global;
    }
}
