//! Top-level error type tying together the data model, wire codec and
//! IPC layers, plus the failures specific to config parsing and startup.

/// Errors surfaced by handlers, the worker pool, the IPC loop and the
/// supervisor.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Dtyp(#[from] ksmbd_dtyp::DtypError),
    #[error(transparent)]
    Ndr(#[from] ksmbd_ndr::NdrError),
    #[error(transparent)]
    Ipc(#[from] ksmbd_ipc::IpcError),
    #[error("malformed {section} entry at line {line}: {reason}")]
    ConfigParse {
        section: &'static str,
        line: usize,
        reason: String,
    },
    #[error("unsupported method flags on RPC request: {0:#010x}")]
    BadRpcMethod(u32),
    #[error("lock file error: {0}")]
    LockFile(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
