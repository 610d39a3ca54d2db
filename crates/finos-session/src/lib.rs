//! FinOS Session - Identity transitions
//!
//! Moves the local cache from one identity to another through the strictly
//! ordered steps `Checking -> Saving -> Cleaning -> Loading -> Complete`.
//!
//! ## Modules
//!
//! - [`coordinator`] - [`SessionTransitionCoordinator`], the single owner of
//!   the active identity and its [`SyncSession`](finos_sync::SyncSession)
//! - [`snapshot`] - [`TransitionSnapshot`], the read-only view published to
//!   observers

pub mod coordinator;
pub mod snapshot;

pub use coordinator::{SessionTransitionCoordinator, SignInOutcome};
pub use snapshot::TransitionSnapshot;

use finos_core::domain::{ErrorKind, TransitionStep};
use finos_core::usecases::BlockReason;
use thiserror::Error;

/// Errors returned by transition requests
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    /// The connectivity guard refused a destructive transition
    #[error("Transition blocked: {reason}")]
    OfflineBlocked { reason: BlockReason },

    /// Another transition is running or parked in `Loading`
    #[error("A transition is already in progress")]
    TransitionInProgress,

    /// `cancel` was called after `Checking`
    #[error("Transition can no longer be cancelled (at {0})")]
    NotCancellable(TransitionStep),

    /// The authentication gate is locked or rejected the attempt
    #[error("Authentication failed: {0}")]
    AuthFailure(String),

    /// A forced logout was acknowledged for a different identity
    #[error("Data loss warning was issued for {0}, not the active identity")]
    StaleWarning(String),

    /// Pending mutations could not be pushed; nothing was removed
    #[error("Save failed: {0}")]
    SaveFailed(String),

    /// Local data of the outgoing identity could not be removed
    #[error("Purge failed: {0}")]
    PurgeFailed(String),

    /// The incoming identity could not be loaded; the transition is parked
    #[error("Load failed: {0}")]
    LoadFailed(String),

    /// `retry_loading` was called with no parked transition
    #[error("No transition is waiting for a retry")]
    NothingToRetry,
}

impl TransitionError {
    /// Maps onto the shared failure taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransitionError::OfflineBlocked { .. } => ErrorKind::OfflineBlocked,
            TransitionError::TransitionInProgress | TransitionError::NotCancellable(_) => {
                ErrorKind::TransitionInProgress
            }
            TransitionError::AuthFailure(_) | TransitionError::StaleWarning(_) => {
                ErrorKind::AuthFailure
            }
            TransitionError::SaveFailed(_) => ErrorKind::SaveFailed,
            TransitionError::PurgeFailed(_) => ErrorKind::PurgeFailed,
            TransitionError::LoadFailed(_) | TransitionError::NothingToRetry => {
                ErrorKind::LoadFailed
            }
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.kind().is_fatal()
    }

    /// Reason stored on the failed transition
    pub(crate) fn reason(&self) -> String {
        match self {
            TransitionError::OfflineBlocked { reason } => reason.to_string(),
            TransitionError::AuthFailure(r)
            | TransitionError::SaveFailed(r)
            | TransitionError::PurgeFailed(r)
            | TransitionError::LoadFailed(r) => r.clone(),
            other => other.to_string(),
        }
    }
}
