//! Domain error types
//!
//! This module defines validation errors raised by domain constructors and
//! the closed [`ErrorKind`] taxonomy shared by every session transition and
//! sync pass.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reason shown to the user when an underlying failure carries no message.
pub const GENERIC_FAILURE_REASON: &str = "secure protocol error";

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid email address format
    #[error("Invalid email format: {0}")]
    InvalidEmail(String),

    /// Invalid table name
    #[error("Invalid table name: {0}")]
    InvalidTableName(String),

    /// Table is not registered in the catalog or version vector
    #[error("Unknown table: {0}")]
    UnknownTable(String),

    /// Invalid state transition attempt
    #[error("Invalid state transition from {from} to {to}")]
    InvalidState {
        /// The current state
        from: String,
        /// The attempted target state
        to: String,
    },

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// ID parsing error
    #[error("Invalid ID format: {0}")]
    InvalidId(String),
}

/// Closed set of failures a transition or sync pass can report.
///
/// Every error surfaced to the presentation layer maps onto exactly one of
/// these kinds. Only [`ErrorKind::PurgeFailed`] is fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A destructive transition was requested while offline
    OfflineBlocked,
    /// Another transition is already running or parked
    TransitionInProgress,
    /// Pending mutations could not be pushed before cleanup
    SaveFailed,
    /// Local writes landed while a table was being synchronized
    SyncConflict,
    /// The incoming identity's data could not be loaded
    LoadFailed,
    /// The authentication gate rejected the attempt
    AuthFailure,
    /// The outgoing identity's local data could not be removed
    PurgeFailed,
}

impl ErrorKind {
    /// Stable code used in audit records
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::OfflineBlocked => "OFFLINE_BLOCKED",
            ErrorKind::TransitionInProgress => "TRANSITION_IN_PROGRESS",
            ErrorKind::SaveFailed => "SAVE_FAILED",
            ErrorKind::SyncConflict => "SYNC_CONFLICT",
            ErrorKind::LoadFailed => "LOAD_FAILED",
            ErrorKind::AuthFailure => "AUTH_FAILURE",
            ErrorKind::PurgeFailed => "PURGE_FAILED",
        }
    }

    /// A fatal failure leaves the cache in an indeterminate state and stops
    /// all further transitions.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ErrorKind::PurgeFailed)
    }

    /// Returns true if the user can act on this failure and try again
    pub fn is_recoverable(&self) -> bool {
        !self.is_fatal()
    }

    /// Short explanation suitable for display
    pub fn user_message(&self) -> &'static str {
        match self {
            ErrorKind::OfflineBlocked => {
                "You are offline. Connect to the internet before switching accounts."
            }
            ErrorKind::TransitionInProgress => "An account change is already in progress.",
            ErrorKind::SaveFailed => {
                "Your pending changes could not be uploaded. Your account was not changed."
            }
            ErrorKind::SyncConflict => "Local changes were made during sync. Sync again.",
            ErrorKind::LoadFailed => "Your data could not be downloaded. Retry to continue.",
            ErrorKind::AuthFailure => "Verification failed. Please try again.",
            ErrorKind::PurgeFailed => {
                "Local data could not be cleared. Restart the application before continuing."
            }
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::OfflineBlocked => "offline_blocked",
            ErrorKind::TransitionInProgress => "transition_in_progress",
            ErrorKind::SaveFailed => "save_failed",
            ErrorKind::SyncConflict => "sync_conflict",
            ErrorKind::LoadFailed => "load_failed",
            ErrorKind::AuthFailure => "auth_failure",
            ErrorKind::PurgeFailed => "purge_failed",
        };
        write!(f, "{}", s)
    }
}

/// Normalizes an opaque failure message into something displayable.
///
/// Blank messages collapse to [`GENERIC_FAILURE_REASON`].
pub fn normalize_reason(message: impl AsRef<str>) -> String {
    let trimmed = message.as_ref().trim();
    if trimmed.is_empty() {
        GENERIC_FAILURE_REASON.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Displayable reason for an error crossing a port boundary
///
/// Uses the outermost context message only; the chain stays in the logs.
pub fn user_facing_reason(err: &anyhow::Error) -> String {
    normalize_reason(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DomainError::InvalidEmail("notanemail".to_string());
        assert_eq!(err.to_string(), "Invalid email format: notanemail");

        let err = DomainError::InvalidState {
            from: "Checking".to_string(),
            to: "Cleaning".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid state transition from Checking to Cleaning"
        );
    }

    #[test]
    fn only_purge_failure_is_fatal() {
        let all = [
            ErrorKind::OfflineBlocked,
            ErrorKind::TransitionInProgress,
            ErrorKind::SaveFailed,
            ErrorKind::SyncConflict,
            ErrorKind::LoadFailed,
            ErrorKind::AuthFailure,
            ErrorKind::PurgeFailed,
        ];
        let fatal: Vec<_> = all.iter().filter(|k| k.is_fatal()).collect();
        assert_eq!(fatal, vec![&ErrorKind::PurgeFailed]);
        assert!(ErrorKind::LoadFailed.is_recoverable());
    }

    #[test]
    fn error_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::OfflineBlocked).unwrap();
        assert_eq!(json, "\"offline_blocked\"");
        assert_eq!(ErrorKind::SaveFailed.to_string(), "save_failed");
        assert_eq!(ErrorKind::SaveFailed.code(), "SAVE_FAILED");
    }

    #[test]
    fn normalize_reason_falls_back_on_blank() {
        assert_eq!(normalize_reason(""), GENERIC_FAILURE_REASON);
        assert_eq!(normalize_reason("   "), GENERIC_FAILURE_REASON);
        assert_eq!(normalize_reason(" sensor busy "), "sensor busy");
    }

    #[test]
    fn user_facing_reason_uses_outer_context() {
        let err = anyhow::anyhow!("socket closed").context("push failed");
        assert_eq!(user_facing_reason(&err), "push failed");
        assert_eq!(user_facing_reason(&anyhow::anyhow!("")), GENERIC_FAILURE_REASON);
    }
}
