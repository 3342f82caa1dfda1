//! Error type for the data-model crate.

/// Errors raised while looking up or mutating shares, users and sessions.
#[derive(Debug, thiserror::Error)]
pub enum DtypError {
    /// No share with this name is registered.
    #[error("no such share: {0}")]
    NoSuchShare(String),
    /// No user with this account name is registered.
    #[error("no such user: {0}")]
    NoSuchUser(String),
    /// No session with this id is registered.
    #[error("no such session: {0:#x}")]
    NoSuchSession(u64),
    /// No tree-connect with this connect id exists on the session.
    #[error("no such tree connect: {0:#x}")]
    NoSuchTreeConnect(u32),
    /// A share with this name already exists in the registry.
    #[error("share already exists: {0}")]
    ShareExists(String),
    /// The share has reached its configured connection limit.
    #[error("share {0} has reached its connection limit")]
    ConnectionLimitReached(String),
}

/// Result type used throughout `ksmbd-dtyp`.
pub type Result<T> = std::result::Result<T, DtypError>;
