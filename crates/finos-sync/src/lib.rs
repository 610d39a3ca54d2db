//! FinOS Sync - Per-table synchronization for one signed-in identity
//!
//! Provides:
//! - Push of queued local mutations, then incremental pulls for tables the
//!   server is ahead on
//! - Version-based merge of remote rows (higher version wins, newer
//!   `updated_at` breaks ties)
//! - Detection of local writes made while a table was syncing
//! - Observable per-table progress
//! - Periodic, manual and network-regained sync triggers
//!
//! ## Modules
//!
//! - [`session`] - [`SyncSession`], the per-identity sync engine
//! - [`retry`] - Exponential backoff for transient remote failures
//! - [`scheduler`] - [`SyncScheduler`], background sync triggers

pub mod retry;
pub mod scheduler;
pub mod session;

pub use retry::RetryPolicy;
pub use scheduler::{SchedulerHandle, SyncScheduler, SyncTrigger};
pub use session::{FlushReport, PauseGuard, SyncContext, SyncSession};

use thiserror::Error;

/// Errors that can occur during synchronization operations
#[derive(Debug, Error)]
pub enum SyncError {
    /// The session is paused for an identity transition
    #[error("Sync is paused")]
    Paused,

    /// The table is not part of the catalog
    #[error("Unknown table: {0}")]
    UnknownTable(String),

    /// The remote store failed after retries
    #[error("Remote store error: {0}")]
    Remote(String),

    /// The local cache failed
    #[error("Local store error: {0}")]
    Local(String),

    /// A domain-level error propagated from finos-core
    #[error("Domain error: {0}")]
    DomainError(#[from] finos_core::domain::DomainError),
}

impl SyncError {
    pub(crate) fn remote(err: &anyhow::Error) -> Self {
        SyncError::Remote(format!("{err:#}"))
    }

    pub(crate) fn local(err: &anyhow::Error) -> Self {
        SyncError::Local(format!("{err:#}"))
    }
}
