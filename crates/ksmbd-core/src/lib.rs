//! Handlers, worker pool, IPC event loop and process supervisor for the
//! userspace control-plane daemon.
//!
//! `ksmbd-dtyp` and `ksmbd-ndr` stay `#![forbid(unsafe_code)]`; this crate
//! cannot, since [`supervisor`] needs `fork()` and a raw `SIGSEGV` handler
//! to run the manager/worker split. Both uses are narrowly scoped and
//! documented at their call sites.

pub mod config;
pub mod crypto;
pub mod error;
pub mod handlers;
pub mod ipc_loop;
pub mod pool;
pub mod supervisor;

pub use config::{base64_encode, parse_pwddb, parse_smbconf, ConfigSource, FileConfigSource, GlobalConfig, PasswordEntry, SmbConf, StringConfigSource};
pub use crypto::nt_hash;
pub use error::{Error, Result};
pub use handlers::Context;
pub use ipc_loop::{load_initial_context, IpcLoop, ReloadFlag};
pub use pool::{WorkerPool, DEFAULT_WORKERS};
pub use supervisor::{StartupConfig, Supervisor};
