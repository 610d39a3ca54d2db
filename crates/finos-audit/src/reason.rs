//! Reason codes for audit log entries
//!
//! Structured codes explaining why a transition was blocked, why a sync
//! conflicted, or why verification failed.

use std::fmt;

use finos_core::domain::ErrorKind;
use serde::{Deserialize, Serialize};

/// Structured reason codes for blocked or failed operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    /// No network connection while a destructive transition was requested
    Offline,
    /// Another transition already owned the coordinator
    TransitionBusy,
    /// Local rows were written while their table was being synchronized
    LocalWriteDuringSync,
    /// The server holds a newer revision than the pushed mutation
    RemoteVersionNewer,
    /// Queued mutations could not be delivered
    PushFailed,
    /// Downloading the incoming identity's data failed
    LoadFailed,
    /// Rows of the outgoing identity survived the purge
    PurgeIncomplete,
    /// The user was not recognised by the verifier
    VerificationRejected,
}

impl ReasonCode {
    /// The reason code matching a transition failure
    pub fn from_error_kind(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::OfflineBlocked => ReasonCode::Offline,
            ErrorKind::TransitionInProgress => ReasonCode::TransitionBusy,
            ErrorKind::SaveFailed => ReasonCode::PushFailed,
            ErrorKind::SyncConflict => ReasonCode::LocalWriteDuringSync,
            ErrorKind::LoadFailed => ReasonCode::LoadFailed,
            ErrorKind::AuthFailure => ReasonCode::VerificationRejected,
            ErrorKind::PurgeFailed => ReasonCode::PurgeIncomplete,
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReasonCode::Offline => "offline",
            ReasonCode::TransitionBusy => "transition_busy",
            ReasonCode::LocalWriteDuringSync => "local_write_during_sync",
            ReasonCode::RemoteVersionNewer => "remote_version_newer",
            ReasonCode::PushFailed => "push_failed",
            ReasonCode::LoadFailed => "load_failed",
            ReasonCode::PurgeIncomplete => "purge_incomplete",
            ReasonCode::VerificationRejected => "verification_rejected",
        };
        write!(f, "{s}")
    }
}
