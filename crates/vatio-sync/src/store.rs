//! ---
//! vatio_section: "05-session-sync"
//! vatio_subsection: "module"
//! vatio_type: "source"
//! vatio_scope: "code"
//! vatio_description: "Cross-device reconciliation of the active session record."
//! vatio_version: "v0.1.0"
//! vatio_owner: "tbd"
//! ---
use thiserror::Error;

use vatio_session::ActiveSession;

pub type Result<T> = std::result::Result<T, StoreError>;

/// Failures talking to the shared store. All of them are non-fatal to the
/// caller: reconciliation simply retries on its next interval.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("shared store unavailable: {0}")]
    Unavailable(String),
    #[error("shared store rejected the write: {0}")]
    Rejected(String),
}

/// The shared "active session" record, as seen by every observer.
///
/// Implementations back this with whatever the deployment uses (the REST
/// API's in-memory record, a document store); the synchronizer only needs
/// fetch, overwrite, and clear.
pub trait SessionStore {
    fn fetch_active(&self) -> Result<Option<ActiveSession>>;
    fn put_active(&self, session: &ActiveSession) -> Result<()>;
    fn clear_active(&self) -> Result<()>;
}
