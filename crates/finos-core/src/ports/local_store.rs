//! Local store port (driven/secondary port)
//!
//! This module defines the interface to the on-device cache: cached rows,
//! the pending mutation queue, the version vector, the active identity,
//! identity-scoped preferences and the audit log.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because storage errors are adapter-specific.
//! - Rows of static tables live in [`DataScope::Global`] and survive purges.
//!   Everything else is keyed by the owning identity.
//! - `purge_identity` must remove every row the identity owns and report
//!   what it found afterwards; it never touches global rows.

use chrono::{DateTime, Utc};

use crate::domain::{
    AuditEntry, AuditId, DataScope, Identity, IdentityId, MutationId, PendingMutation,
    PendingMutationSet, PurgeReport, Record, TableName, VersionEntry,
};

/// Port trait for the local cache
#[async_trait::async_trait]
pub trait ILocalStore: Send + Sync {
    // --- Records ---

    /// Retrieves a cached row
    async fn get_record(
        &self,
        scope: &DataScope,
        table: &TableName,
        id: &str,
    ) -> anyhow::Result<Option<Record>>;

    /// Inserts or replaces cached rows; returns the number written
    async fn upsert_records(
        &self,
        scope: &DataScope,
        table: &TableName,
        records: &[Record],
    ) -> anyhow::Result<usize>;

    /// Counts live (not deleted) rows of a table
    async fn count_records(&self, scope: &DataScope, table: &TableName) -> anyhow::Result<u64>;

    /// Applies a local write to the cached row and queues it, atomically
    async fn apply_local_mutation(
        &self,
        owner: &IdentityId,
        scope: &DataScope,
        mutation: &PendingMutation,
    ) -> anyhow::Result<()>;

    // --- Pending mutations ---

    /// All queued mutations for `owner`, oldest first
    async fn pending_mutations(&self, owner: &IdentityId) -> anyhow::Result<PendingMutationSet>;

    /// Removes processed mutations; returns the number removed
    async fn remove_mutations(&self, owner: &IdentityId, ids: &[MutationId])
        -> anyhow::Result<u64>;

    // --- Versions ---

    /// Version entries visible to `owner`: global static tables plus the
    /// owner's dynamic tables
    async fn load_versions(&self, owner: &IdentityId) -> anyhow::Result<Vec<VersionEntry>>;

    /// Persists one version entry
    async fn save_version(&self, scope: &DataScope, entry: &VersionEntry) -> anyhow::Result<()>;

    // --- Identity ---

    /// The identity currently owning the cache
    async fn active_identity(&self) -> anyhow::Result<Option<Identity>>;

    /// Replaces (or clears) the identity owning the cache
    async fn set_active_identity(&self, identity: Option<&Identity>) -> anyhow::Result<()>;

    /// Stores an identity-scoped preference
    async fn set_preference(&self, owner: &IdentityId, key: &str, value: &str)
        -> anyhow::Result<()>;

    /// Reads an identity-scoped preference
    async fn get_preference(&self, owner: &IdentityId, key: &str) -> anyhow::Result<Option<String>>;

    // --- Purge ---

    /// Removes every row owned by `id` and verifies nothing is left
    async fn purge_identity(&self, id: &IdentityId) -> anyhow::Result<PurgeReport>;

    // --- Audit ---

    /// Saves an audit entry and returns its assigned id
    async fn save_audit(&self, entry: &AuditEntry) -> anyhow::Result<AuditId>;

    /// Audit entries since `since`, newest first, up to `limit`
    async fn get_audit_since(
        &self,
        since: DateTime<Utc>,
        limit: u32,
    ) -> anyhow::Result<Vec<AuditEntry>>;

    /// Audit entries concerning one identity, oldest first
    async fn get_audit_for_identity(&self, id: &IdentityId) -> anyhow::Result<Vec<AuditEntry>>;
}
