//! Audit entry domain entities
//!
//! Audit entries record every identity change, cleanup, switch decision and
//! sync outcome so that "what happened to my data" can be answered after the
//! fact.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::newtypes::{AuditId, IdentityId, TransitionId};

/// Actions that can be recorded in the audit log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// The cache owner changed from one identity to another
    UserSwitch,
    /// An identity signed in on an empty cache
    FirstLogin,
    /// The cache owner signed out
    Logout,
    /// A logout that discarded unsaved data after acknowledgement
    ForcedLogout,
    /// The connectivity guard allowed a destructive transition
    SwitchAllowed,
    /// The connectivity guard blocked a destructive transition
    SwitchBlocked,
    /// A transition stopped before completing
    TransitionFailed,
    /// An identity's local data was purged
    DataCleanup,
    /// A sync pass started
    SyncStart,
    /// A sync pass completed
    SyncComplete,
    /// Local writes raced a table sync
    SyncConflict,
    /// The server refused queued mutations
    PushRejected,
    /// The authentication gate was unlocked
    AuthUnlock,
    /// The authentication gate rejected an attempt
    AuthFailure,
    /// An error occurred
    Error,
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AuditAction::UserSwitch => "user_switch",
            AuditAction::FirstLogin => "first_login",
            AuditAction::Logout => "logout",
            AuditAction::ForcedLogout => "forced_logout",
            AuditAction::SwitchAllowed => "switch_allowed",
            AuditAction::SwitchBlocked => "switch_blocked",
            AuditAction::TransitionFailed => "transition_failed",
            AuditAction::DataCleanup => "data_cleanup",
            AuditAction::SyncStart => "sync_start",
            AuditAction::SyncComplete => "sync_complete",
            AuditAction::SyncConflict => "sync_conflict",
            AuditAction::PushRejected => "push_rejected",
            AuditAction::AuthUnlock => "auth_unlock",
            AuditAction::AuthFailure => "auth_failure",
            AuditAction::Error => "error",
        };
        write!(f, "{}", s)
    }
}

/// Result of an audited action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditResult {
    /// The action completed successfully
    Success,
    /// The action failed with an error code and message
    Failed {
        /// Error code for categorization
        code: String,
        /// Human-readable error message
        message: String,
    },
}

impl AuditResult {
    pub fn success() -> Self {
        AuditResult::Success
    }

    pub fn failed(code: impl Into<String>, message: impl Into<String>) -> Self {
        AuditResult::Failed {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, AuditResult::Success)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, AuditResult::Failed { .. })
    }
}

/// An audit log entry recording a significant operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Assigned by the database on insert
    id: Option<AuditId>,
    timestamp: DateTime<Utc>,
    /// Identity the action concerns, if any
    identity_id: Option<IdentityId>,
    /// Transition the action belongs to, if any
    transition_id: Option<TransitionId>,
    action: AuditAction,
    result: AuditResult,
    details: Value,
    duration_ms: Option<u64>,
}

impl AuditEntry {
    /// Creates a new audit entry with the required fields
    ///
    /// The `id` field is set to `None` and will be assigned by the database
    /// when the entry is persisted.
    ///
    /// # Example
    ///
    /// ```
    /// use finos_core::domain::audit::{AuditAction, AuditEntry, AuditResult};
    ///
    /// let entry = AuditEntry::new(AuditAction::SyncStart, AuditResult::success());
    /// assert!(entry.result().is_success());
    /// assert!(entry.id().is_none());
    /// ```
    pub fn new(action: AuditAction, result: AuditResult) -> Self {
        Self {
            id: None,
            timestamp: Utc::now(),
            identity_id: None,
            transition_id: None,
            action,
            result,
            details: Value::Null,
            duration_ms: None,
        }
    }

    pub fn id(&self) -> Option<AuditId> {
        self.id
    }

    /// Sets the ID for this audit entry (typically called after database insert)
    pub fn with_id(mut self, id: AuditId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Overrides the timestamp, used when rehydrating from storage
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn identity_id(&self) -> Option<&IdentityId> {
        self.identity_id.as_ref()
    }

    pub fn transition_id(&self) -> Option<&TransitionId> {
        self.transition_id.as_ref()
    }

    pub fn action(&self) -> &AuditAction {
        &self.action
    }

    pub fn result(&self) -> &AuditResult {
        &self.result
    }

    pub fn details(&self) -> &Value {
        &self.details
    }

    pub fn duration_ms(&self) -> Option<u64> {
        self.duration_ms
    }

    pub fn with_identity_id(mut self, identity_id: IdentityId) -> Self {
        self.identity_id = Some(identity_id);
        self
    }

    pub fn with_transition_id(mut self, transition_id: TransitionId) -> Self {
        self.transition_id = Some(transition_id);
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_audit_action_serialization() {
        let action = AuditAction::DataCleanup;
        let json = serde_json::to_string(&action).unwrap();
        assert_eq!(json, "\"data_cleanup\"");

        let deserialized: AuditAction = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, action);
    }

    #[test]
    fn test_audit_action_display_matches_serde() {
        for action in [
            AuditAction::UserSwitch,
            AuditAction::SwitchBlocked,
            AuditAction::ForcedLogout,
            AuditAction::PushRejected,
        ] {
            let json = serde_json::to_string(&action).unwrap();
            assert_eq!(json.trim_matches('"'), action.to_string());
        }
    }

    #[test]
    fn test_audit_result_failed() {
        let result = AuditResult::failed("OFFLINE_BLOCKED", "offline");
        assert!(result.is_failed());
        if let AuditResult::Failed { code, message } = result {
            assert_eq!(code, "OFFLINE_BLOCKED");
            assert_eq!(message, "offline");
        } else {
            panic!("Expected Failed variant");
        }
    }

    #[test]
    fn test_audit_entry_builder_pattern() {
        let identity = IdentityId::new();
        let transition = TransitionId::new();
        let details = json!({"old_user": "a", "new_user": "b"});

        let entry = AuditEntry::new(AuditAction::UserSwitch, AuditResult::success())
            .with_identity_id(identity)
            .with_transition_id(transition)
            .with_details(details.clone())
            .with_duration_ms(150);

        assert_eq!(entry.identity_id(), Some(&identity));
        assert_eq!(entry.transition_id(), Some(&transition));
        assert_eq!(*entry.details(), details);
        assert_eq!(entry.duration_ms(), Some(150));
        assert!(entry.id().is_none());
    }
}
