//! Core data model for the ksmbd control-plane daemon.
//!
//! Shares, users and sessions, plus the registries that hold them.
//! Entries are individually reference-counted ([`std::sync::Arc`]) so a
//! config reload can swap a registry's contents while in-flight handlers
//! keep the references they already hold.

#![forbid(unsafe_code)]

pub mod error;
pub mod session;
pub mod share;
pub mod user;

pub use error::{DtypError, Result};
pub use session::{Session, SessionRegistry, TreeConnect};
pub use share::{HostRules, Share, ShareFlags, ShareRegistry, UserMaps};
pub use user::{User, UserFlags, UserRegistry};
