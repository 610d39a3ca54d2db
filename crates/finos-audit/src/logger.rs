//! AuditLogger - high-level audit logging service
//!
//! Wraps `ILocalStore::save_audit()` with convenience methods for each
//! auditable operation. All methods are non-fatal: errors in audit
//! persistence are logged via `tracing::warn!` but never propagated.

use std::sync::Arc;

use chrono::Utc;
use finos_core::{
    domain::{
        audit::{AuditAction, AuditEntry, AuditResult},
        Identity, IdentityId, PurgeReport, TableName, Transition, TransitionId, TransitionKind,
    },
    ports::{ILocalStore, RejectedMutation},
    usecases::SwitchDecision,
};
use serde_json::json;

use crate::reason::ReasonCode;

/// High-level audit logger backed by the local store.
///
/// All methods swallow errors (logging a warning) so audit failures never
/// break a transition or sync pass.
pub struct AuditLogger {
    store: Arc<dyn ILocalStore>,
}

impl AuditLogger {
    /// Creates a new `AuditLogger` backed by the given store.
    pub fn new(store: Arc<dyn ILocalStore>) -> Self {
        Self { store }
    }

    /// Persist an audit entry, swallowing errors with a tracing warning.
    async fn save(&self, entry: &AuditEntry) {
        if let Err(e) = self.store.save_audit(entry).await {
            tracing::warn!(error = %e, action = %entry.action(), "Failed to save audit entry");
        }
    }

    // ========================================================================
    // Identity transitions
    // ========================================================================

    /// Log the connectivity guard's verdict on a destructive transition.
    pub async fn log_switch_decision(
        &self,
        transition_id: TransitionId,
        outgoing: Option<&IdentityId>,
        decision: &SwitchDecision,
        pending: usize,
    ) {
        let (action, result) = match decision {
            SwitchDecision::Allowed => (AuditAction::SwitchAllowed, AuditResult::success()),
            SwitchDecision::Blocked { reason } => (
                AuditAction::SwitchBlocked,
                AuditResult::failed(ReasonCode::Offline.to_string(), reason.to_string()),
            ),
            SwitchDecision::Overridden { .. } => {
                (AuditAction::ForcedLogout, AuditResult::success())
            }
        };
        let mut entry = AuditEntry::new(action, result)
            .with_transition_id(transition_id)
            .with_details(json!({
                "decision": decision,
                "pending_mutations": pending,
            }));
        if let Some(id) = outgoing {
            entry = entry.with_identity_id(*id);
        }
        self.save(&entry).await;
    }

    /// Log a transition that reached `Complete`.
    pub async fn log_transition_complete(&self, transition: &Transition) {
        let action = match transition.kind() {
            TransitionKind::Switch => AuditAction::UserSwitch,
            TransitionKind::FirstLogin => AuditAction::FirstLogin,
            TransitionKind::Logout => AuditAction::Logout,
            TransitionKind::ForcedLogout => AuditAction::ForcedLogout,
        };
        let mut entry = AuditEntry::new(action, AuditResult::success())
            .with_transition_id(*transition.id())
            .with_duration_ms(transition.duration_ms())
            .with_details(json!({
                "old_user": transition.outgoing().map(|i| i.email().as_str()),
                "new_user": transition.incoming().map(|i| i.email().as_str()),
                "save_outcome": transition.save_outcome(),
            }));
        if let Some(id) = transition.incoming().or(transition.outgoing()).map(Identity::id) {
            entry = entry.with_identity_id(*id);
        }
        self.save(&entry).await;
    }

    /// Log a transition that stopped on a failure.
    pub async fn log_transition_failed(&self, transition: &Transition) {
        let Some(failure) = transition.failure() else {
            return;
        };
        let reason = ReasonCode::from_error_kind(failure.kind);
        let mut entry = AuditEntry::new(
            AuditAction::TransitionFailed,
            AuditResult::failed(failure.kind.code(), &failure.reason),
        )
        .with_transition_id(*transition.id())
        .with_duration_ms(transition.duration_ms())
        .with_details(json!({
            "kind": transition.kind(),
            "step": failure.step,
            "reason_code": reason,
            "fatal": failure.kind.is_fatal(),
        }));
        if let Some(outgoing) = transition.outgoing() {
            entry = entry.with_identity_id(*outgoing.id());
        }
        self.save(&entry).await;
    }

    /// Log the removal of an identity's local data.
    pub async fn log_data_cleanup(&self, transition_id: TransitionId, report: &PurgeReport) {
        let result = if report.is_verified() {
            AuditResult::success()
        } else {
            AuditResult::failed(
                ReasonCode::PurgeIncomplete.to_string(),
                report.leftovers().join(", "),
            )
        };
        let entry = AuditEntry::new(AuditAction::DataCleanup, result)
            .with_identity_id(report.identity_id)
            .with_transition_id(transition_id)
            .with_details(json!({
                "rows_deleted": report.total_deleted(),
                "by_area": report.rows_deleted,
            }));
        self.save(&entry).await;
    }

    // ========================================================================
    // Sync lifecycle
    // ========================================================================

    /// Log the start of a sync pass.
    pub async fn log_sync_start(&self, identity: IdentityId, tables: usize) {
        let entry = AuditEntry::new(AuditAction::SyncStart, AuditResult::success())
            .with_identity_id(identity)
            .with_details(json!({ "tables": tables }));
        self.save(&entry).await;
    }

    /// Log the end of a sync pass.
    pub async fn log_sync_complete(
        &self,
        identity: IdentityId,
        duration_ms: u64,
        completed: usize,
        failed: usize,
    ) {
        let result = if failed == 0 {
            AuditResult::success()
        } else {
            AuditResult::failed("SYNC_PARTIAL", format!("{failed} table(s) failed"))
        };
        let entry = AuditEntry::new(AuditAction::SyncComplete, result)
            .with_identity_id(identity)
            .with_duration_ms(duration_ms)
            .with_details(json!({
                "tables_completed": completed,
                "tables_failed": failed,
            }));
        self.save(&entry).await;
    }

    /// Log a table whose sync window saw local writes.
    pub async fn log_sync_conflict(&self, identity: IdentityId, table: &TableName) {
        let entry = AuditEntry::new(
            AuditAction::SyncConflict,
            AuditResult::failed(
                ReasonCode::LocalWriteDuringSync.to_string(),
                format!("local writes to {table} during sync"),
            ),
        )
        .with_identity_id(identity)
        .with_details(json!({ "table": table }));
        self.save(&entry).await;
    }

    /// Log mutations the server refused.
    pub async fn log_push_rejected(
        &self,
        identity: IdentityId,
        table: &TableName,
        rejected: &[RejectedMutation],
    ) {
        if rejected.is_empty() {
            return;
        }
        let entry = AuditEntry::new(
            AuditAction::PushRejected,
            AuditResult::failed(
                ReasonCode::RemoteVersionNewer.to_string(),
                format!("{} mutation(s) rejected", rejected.len()),
            ),
        )
        .with_identity_id(identity)
        .with_details(json!({
            "table": table,
            "rejected": rejected,
        }));
        self.save(&entry).await;
    }

    // ========================================================================
    // Authentication and errors
    // ========================================================================

    /// Log the outcome of an authentication gate attempt.
    pub async fn log_auth_attempt(&self, identity: Option<IdentityId>, failure: Option<&str>) {
        let (action, result) = match failure {
            None => (AuditAction::AuthUnlock, AuditResult::success()),
            Some(reason) => (
                AuditAction::AuthFailure,
                AuditResult::failed(ReasonCode::VerificationRejected.to_string(), reason),
            ),
        };
        let mut entry = AuditEntry::new(action, result);
        if let Some(id) = identity {
            entry = entry.with_identity_id(id);
        }
        self.save(&entry).await;
    }

    /// Log a non-fatal error.
    pub async fn log_error(&self, message: &str, context: Option<&str>) {
        let result = AuditResult::failed("ERROR", message);
        let mut entry = AuditEntry::new(AuditAction::Error, result);
        if let Some(ctx) = context {
            entry = entry.with_details(json!({
                "context": ctx,
                "timestamp": Utc::now().to_rfc3339(),
            }));
        }
        self.save(&entry).await;
    }
}
