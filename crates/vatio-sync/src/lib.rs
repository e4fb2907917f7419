//! ---
//! vatio_section: "05-session-sync"
//! vatio_subsection: "module"
//! vatio_type: "source"
//! vatio_scope: "code"
//! vatio_description: "Cross-device reconciliation of the active session record."
//! vatio_version: "v0.1.0"
//! vatio_owner: "tbd"
//! ---
//! Cross-device session synchronization. The local accumulator and the
//! shared store are two replicas of the same monotone record; reconciliation
//! is a max-merge on cost plus a staleness predicate for orphan cleanup.
//! Shared-store access is optimistic and unordered; nothing protects
//! read-compare-write, which is safe precisely because cost only increases.

pub mod store;
pub mod synchronizer;

pub use store::{SessionStore, StoreError};
pub use synchronizer::SessionSynchronizer;
