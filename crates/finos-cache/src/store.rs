//! SQLite implementation of ILocalStore
//!
//! Concrete SQLite-backed implementation of the local store port defined in
//! finos-core. Handles domain type mapping and SQL query construction.
//!
//! ## Type Mapping
//!
//! | Domain Type            | SQL Type | Strategy                                   |
//! |------------------------|----------|--------------------------------------------|
//! | IdentityId, MutationId | TEXT     | UUID string via `.to_string()` / `FromStr` |
//! | DataScope              | TEXT     | `"global"` or the owner's UUID             |
//! | TableName              | TEXT     | `.as_str()` / `TableName::new()`           |
//! | DateTime<Utc>          | TEXT     | RFC 3339, microseconds, `Z` suffix         |
//! | u64 versions           | INTEGER  | saturating cast to i64                     |
//! | Record payload, details| TEXT     | serde_json                                 |
//! | Identity               | TEXT     | serde_json                                 |
//! | AuditResult            | TEXT     | serde_json                                 |

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use finos_core::domain::{
    AuditAction, AuditEntry, AuditId, AuditResult, DataScope, Identity, IdentityId, MutationId,
    MutationOp, PendingMutation, PendingMutationSet, PurgeReport, Record, TableKind, TableName,
    TransitionId, VersionEntry,
};
use finos_core::ports::ILocalStore;

use crate::CacheError;

/// Identity-owned storage areas cleared by a purge, besides cached rows
const PURGE_AREAS: &[(&str, &str)] = &[
    (
        "pending_mutations",
        "DELETE FROM pending_mutations WHERE owner_id = ?",
    ),
    ("table_versions", "DELETE FROM table_versions WHERE scope = ?"),
    (
        "identity_preferences",
        "DELETE FROM identity_preferences WHERE owner_id = ?",
    ),
    (
        "active_identity",
        "DELETE FROM active_identity WHERE identity_id = ?",
    ),
];

/// Scans used to verify a purge left nothing behind
const VERIFY_AREAS: &[(&str, &str)] = &[
    ("records", "SELECT COUNT(*) FROM records WHERE scope = ?"),
    (
        "pending_mutations",
        "SELECT COUNT(*) FROM pending_mutations WHERE owner_id = ?",
    ),
    (
        "table_versions",
        "SELECT COUNT(*) FROM table_versions WHERE scope = ?",
    ),
    (
        "identity_preferences",
        "SELECT COUNT(*) FROM identity_preferences WHERE owner_id = ?",
    ),
    (
        "active_identity",
        "SELECT COUNT(*) FROM active_identity WHERE identity_id = ?",
    ),
];

/// SQLite-based implementation of the local store port
pub struct SqliteLocalStore {
    pool: SqlitePool,
}

impl SqliteLocalStore {
    /// Creates a new store with the given connection pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Counts rows still attributed to `owner` in every identity-owned area
    async fn count_identity_rows(&self, owner: &str) -> anyhow::Result<BTreeMap<String, u64>> {
        let mut remaining = BTreeMap::new();
        for (area, sql) in VERIFY_AREAS {
            let count: i64 = sqlx::query_scalar(sql)
                .bind(owner)
                .fetch_one(&self.pool)
                .await?;
            remaining.insert(area.to_string(), count.max(0) as u64);
        }
        Ok(remaining)
    }
}

// ============================================================================
// Helper functions for type conversion
// ============================================================================

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, CacheError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            CacheError::SerializationError(format!("Failed to parse datetime '{}': {}", s, e))
        })
}

fn to_i64(v: u64) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}

fn to_u64(v: i64) -> u64 {
    v.max(0) as u64
}

fn kind_to_str(kind: TableKind) -> &'static str {
    match kind {
        TableKind::Static => "static",
        TableKind::Dynamic => "dynamic",
    }
}

fn kind_from_str(s: &str) -> Result<TableKind, CacheError> {
    match s {
        "static" => Ok(TableKind::Static),
        "dynamic" => Ok(TableKind::Dynamic),
        other => Err(CacheError::SerializationError(format!(
            "Unknown table kind: {}",
            other
        ))),
    }
}

fn table_name(s: String) -> Result<TableName, CacheError> {
    TableName::new(s).map_err(|e| CacheError::SerializationError(e.to_string()))
}

// ============================================================================
// Row mapping functions
// ============================================================================

fn record_from_row(row: &SqliteRow) -> Result<Record, CacheError> {
    let payload_str: String = row.get("payload");
    let payload = serde_json::from_str(&payload_str).map_err(|e| {
        CacheError::SerializationError(format!("Invalid record payload: {}", e))
    })?;
    Ok(Record {
        id: row.get("record_id"),
        payload,
        version: to_u64(row.get("version")),
        updated_at: row.get("updated_at"),
        is_deleted: row.get("is_deleted"),
    })
}

fn mutation_from_row(row: &SqliteRow) -> Result<PendingMutation, CacheError> {
    let id_str: String = row.get("id");
    let op_str: String = row.get("op");
    let payload_str: String = row.get("payload");
    let created_at_str: String = row.get("created_at");

    let id = MutationId::from_str(&id_str)
        .map_err(|e| CacheError::SerializationError(e.to_string()))?;
    let op = MutationOp::from_str(&op_str).map_err(CacheError::SerializationError)?;
    let payload = serde_json::from_str(&payload_str).map_err(|e| {
        CacheError::SerializationError(format!("Invalid mutation payload: {}", e))
    })?;

    Ok(PendingMutation::restore(
        id,
        table_name(row.get("table_name"))?,
        row.get("record_id"),
        op,
        payload,
        parse_datetime(&created_at_str)?,
    ))
}

fn version_from_row(row: &SqliteRow) -> Result<VersionEntry, CacheError> {
    let kind_str: String = row.get("kind");
    Ok(
        VersionEntry::new(table_name(row.get("table_name"))?, kind_from_str(&kind_str)?)
            .with_versions(
                to_u64(row.get("local_version")),
                to_u64(row.get("server_version")),
                to_u64(row.get("base_version")),
            ),
    )
}

fn audit_entry_from_row(row: &SqliteRow) -> Result<AuditEntry, CacheError> {
    let id: i64 = row.get("id");
    let timestamp_str: String = row.get("timestamp");
    let identity_id_str: Option<String> = row.get("identity_id");
    let transition_id_str: Option<String> = row.get("transition_id");
    let action_str: String = row.get("action");
    let result_str: String = row.get("result");
    let details_str: String = row.get("details");
    let duration_ms: Option<i64> = row.get("duration_ms");

    let action: AuditAction =
        serde_json::from_str(&format!("\"{}\"", action_str)).map_err(|e| {
            CacheError::SerializationError(format!("Invalid AuditAction '{}': {}", action_str, e))
        })?;
    let result: AuditResult = serde_json::from_str(&result_str).map_err(|e| {
        CacheError::SerializationError(format!("Invalid AuditResult '{}': {}", result_str, e))
    })?;
    let details: serde_json::Value = serde_json::from_str(&details_str).unwrap_or_default();

    let mut entry = AuditEntry::new(action, result)
        .with_id(AuditId::new(id))
        .with_timestamp(parse_datetime(&timestamp_str)?)
        .with_details(details);

    if let Some(s) = identity_id_str.filter(|s| !s.is_empty()) {
        let identity_id = IdentityId::from_str(&s)
            .map_err(|e| CacheError::SerializationError(e.to_string()))?;
        entry = entry.with_identity_id(identity_id);
    }
    if let Some(s) = transition_id_str.filter(|s| !s.is_empty()) {
        let transition_id = TransitionId::from_str(&s)
            .map_err(|e| CacheError::SerializationError(e.to_string()))?;
        entry = entry.with_transition_id(transition_id);
    }
    if let Some(d) = duration_ms {
        entry = entry.with_duration_ms(to_u64(d));
    }

    Ok(entry)
}

// ============================================================================
// ILocalStore implementation
// ============================================================================

#[async_trait::async_trait]
impl ILocalStore for SqliteLocalStore {
    // --- Records ---

    async fn get_record(
        &self,
        scope: &DataScope,
        table: &TableName,
        id: &str,
    ) -> anyhow::Result<Option<Record>> {
        let row = sqlx::query(
            "SELECT * FROM records WHERE scope = ? AND table_name = ? AND record_id = ?",
        )
        .bind(scope.key())
        .bind(table.as_str())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(record_from_row(r)?)),
            None => Ok(None),
        }
    }

    async fn upsert_records(
        &self,
        scope: &DataScope,
        table: &TableName,
        records: &[Record],
    ) -> anyhow::Result<usize> {
        let scope_key = scope.key();
        let mut tx = self.pool.begin().await?;
        for record in records {
            let payload = serde_json::to_string(&record.payload)?;
            sqlx::query(
                "INSERT INTO records \
                 (scope, table_name, record_id, payload, version, updated_at, is_deleted) \
                 VALUES (?, ?, ?, ?, ?, ?, ?) \
                 ON CONFLICT (scope, table_name, record_id) DO UPDATE SET \
                 payload = excluded.payload, version = excluded.version, \
                 updated_at = excluded.updated_at, is_deleted = excluded.is_deleted",
            )
            .bind(&scope_key)
            .bind(table.as_str())
            .bind(&record.id)
            .bind(&payload)
            .bind(to_i64(record.version))
            .bind(record.updated_at)
            .bind(record.is_deleted)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        tracing::trace!(table = %table, count = records.len(), "Upserted records");
        Ok(records.len())
    }

    async fn count_records(&self, scope: &DataScope, table: &TableName) -> anyhow::Result<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM records \
             WHERE scope = ? AND table_name = ? AND is_deleted = 0",
        )
        .bind(scope.key())
        .bind(table.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(to_u64(count))
    }

    async fn apply_local_mutation(
        &self,
        owner: &IdentityId,
        scope: &DataScope,
        mutation: &PendingMutation,
    ) -> anyhow::Result<()> {
        let scope_key = scope.key();
        let now_ms = Utc::now().timestamp_millis();
        let payload = serde_json::to_string(mutation.payload())?;

        let mut tx = self.pool.begin().await?;
        match mutation.op() {
            MutationOp::Delete => {
                sqlx::query(
                    "UPDATE records SET is_deleted = 1, updated_at = ? \
                     WHERE scope = ? AND table_name = ? AND record_id = ?",
                )
                .bind(now_ms)
                .bind(&scope_key)
                .bind(mutation.table().as_str())
                .bind(mutation.record_id())
                .execute(&mut *tx)
                .await?;
            }
            MutationOp::Insert | MutationOp::Update => {
                sqlx::query(
                    "INSERT INTO records \
                     (scope, table_name, record_id, payload, version, updated_at, is_deleted) \
                     VALUES (?, ?, ?, ?, 0, ?, 0) \
                     ON CONFLICT (scope, table_name, record_id) DO UPDATE SET \
                     payload = excluded.payload, updated_at = excluded.updated_at, is_deleted = 0",
                )
                .bind(&scope_key)
                .bind(mutation.table().as_str())
                .bind(mutation.record_id())
                .bind(&payload)
                .bind(now_ms)
                .execute(&mut *tx)
                .await?;
            }
        }

        sqlx::query(
            "INSERT INTO pending_mutations \
             (id, owner_id, table_name, record_id, op, payload, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(mutation.id().to_string())
        .bind(owner.to_string())
        .bind(mutation.table().as_str())
        .bind(mutation.record_id())
        .bind(mutation.op().to_string())
        .bind(&payload)
        .bind(format_datetime(&mutation.created_at()))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::debug!(
            table = %mutation.table(),
            record = mutation.record_id(),
            op = %mutation.op(),
            "Queued local mutation"
        );
        Ok(())
    }

    // --- Pending mutations ---

    async fn pending_mutations(&self, owner: &IdentityId) -> anyhow::Result<PendingMutationSet> {
        let rows = sqlx::query("SELECT * FROM pending_mutations WHERE owner_id = ? ORDER BY seq")
            .bind(owner.to_string())
            .fetch_all(&self.pool)
            .await?;

        let mut mutations = Vec::with_capacity(rows.len());
        for row in &rows {
            mutations.push(mutation_from_row(row)?);
        }
        Ok(PendingMutationSet::from_vec(mutations))
    }

    async fn remove_mutations(
        &self,
        owner: &IdentityId,
        ids: &[MutationId],
    ) -> anyhow::Result<u64> {
        let owner_str = owner.to_string();
        let mut removed = 0;
        let mut tx = self.pool.begin().await?;
        for id in ids {
            removed += sqlx::query("DELETE FROM pending_mutations WHERE owner_id = ? AND id = ?")
                .bind(&owner_str)
                .bind(id.to_string())
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }
        tx.commit().await?;
        Ok(removed)
    }

    // --- Versions ---

    async fn load_versions(&self, owner: &IdentityId) -> anyhow::Result<Vec<VersionEntry>> {
        let rows = sqlx::query(
            "SELECT * FROM table_versions WHERE scope = ? OR scope = ? ORDER BY table_name",
        )
        .bind(DataScope::Global.key())
        .bind(owner.to_string())
        .fetch_all(&self.pool)
        .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in &rows {
            entries.push(version_from_row(row)?);
        }
        Ok(entries)
    }

    async fn save_version(&self, scope: &DataScope, entry: &VersionEntry) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO table_versions \
             (scope, table_name, kind, local_version, server_version, base_version) \
             VALUES (?, ?, ?, ?, ?, ?) \
             ON CONFLICT (scope, table_name) DO UPDATE SET \
             kind = excluded.kind, local_version = excluded.local_version, \
             server_version = excluded.server_version, base_version = excluded.base_version",
        )
        .bind(scope.key())
        .bind(entry.table().as_str())
        .bind(kind_to_str(entry.kind()))
        .bind(to_i64(entry.local_version()))
        .bind(to_i64(entry.server_version()))
        .bind(to_i64(entry.base_version()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // --- Identity ---

    async fn active_identity(&self) -> anyhow::Result<Option<Identity>> {
        let json: Option<String> =
            sqlx::query_scalar("SELECT identity FROM active_identity WHERE slot = 1")
                .fetch_optional(&self.pool)
                .await?;
        match json {
            Some(s) => {
                let identity = serde_json::from_str(&s).map_err(|e| {
                    CacheError::SerializationError(format!("Invalid stored identity: {}", e))
                })?;
                Ok(Some(identity))
            }
            None => Ok(None),
        }
    }

    async fn set_active_identity(&self, identity: Option<&Identity>) -> anyhow::Result<()> {
        match identity {
            Some(identity) => {
                let json = serde_json::to_string(identity)?;
                sqlx::query(
                    "INSERT INTO active_identity (slot, identity_id, identity, since) \
                     VALUES (1, ?, ?, ?) \
                     ON CONFLICT (slot) DO UPDATE SET \
                     identity_id = excluded.identity_id, identity = excluded.identity, \
                     since = excluded.since",
                )
                .bind(identity.id().to_string())
                .bind(&json)
                .bind(format_datetime(&Utc::now()))
                .execute(&self.pool)
                .await?;
                tracing::info!(identity = %identity.email(), "Active identity set");
            }
            None => {
                sqlx::query("DELETE FROM active_identity WHERE slot = 1")
                    .execute(&self.pool)
                    .await?;
                tracing::info!("Active identity cleared");
            }
        }
        Ok(())
    }

    async fn set_preference(
        &self,
        owner: &IdentityId,
        key: &str,
        value: &str,
    ) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO identity_preferences (owner_id, key, value) VALUES (?, ?, ?) \
             ON CONFLICT (owner_id, key) DO UPDATE SET value = excluded.value",
        )
        .bind(owner.to_string())
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_preference(&self, owner: &IdentityId, key: &str) -> anyhow::Result<Option<String>> {
        let value = sqlx::query_scalar(
            "SELECT value FROM identity_preferences WHERE owner_id = ? AND key = ?",
        )
        .bind(owner.to_string())
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(value)
    }

    // --- Purge ---

    async fn purge_identity(&self, id: &IdentityId) -> anyhow::Result<PurgeReport> {
        let owner = id.to_string();
        let mut report = PurgeReport::new(*id);

        let mut tx = self.pool.begin().await?;

        let tables: Vec<String> =
            sqlx::query_scalar("SELECT DISTINCT table_name FROM records WHERE scope = ?")
                .bind(&owner)
                .fetch_all(&mut *tx)
                .await?;
        for table in tables {
            let deleted = sqlx::query("DELETE FROM records WHERE scope = ? AND table_name = ?")
                .bind(&owner)
                .bind(&table)
                .execute(&mut *tx)
                .await?
                .rows_affected();
            report.rows_deleted.insert(table, deleted);
        }

        for (area, sql) in PURGE_AREAS {
            let deleted = sqlx::query(sql)
                .bind(&owner)
                .execute(&mut *tx)
                .await?
                .rows_affected();
            report.rows_deleted.insert(area.to_string(), deleted);
        }

        tx.commit().await?;

        report.remaining = self.count_identity_rows(&owner).await?;

        tracing::info!(
            identity = %id,
            rows_deleted = report.total_deleted(),
            verified = report.is_verified(),
            "Purged identity data"
        );
        Ok(report)
    }

    // --- Audit ---

    async fn save_audit(&self, entry: &AuditEntry) -> anyhow::Result<AuditId> {
        let timestamp = format_datetime(&entry.timestamp());
        let identity_id = entry.identity_id().map(|i| i.to_string());
        let transition_id = entry.transition_id().map(|t| t.to_string());
        let action = entry.action().to_string();
        let result = serde_json::to_string(entry.result())
            .map_err(|e| anyhow::anyhow!("Failed to serialize audit result: {}", e))?;
        let details = serde_json::to_string(entry.details())
            .map_err(|e| anyhow::anyhow!("Failed to serialize audit details: {}", e))?;
        let duration_ms = entry.duration_ms().map(to_i64);

        let id = sqlx::query(
            "INSERT INTO audit_log \
             (timestamp, identity_id, transition_id, action, result, details, duration_ms) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&timestamp)
        .bind(&identity_id)
        .bind(&transition_id)
        .bind(&action)
        .bind(&result)
        .bind(&details)
        .bind(duration_ms)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        tracing::trace!(action = %action, "Saved audit entry");
        Ok(AuditId::new(id))
    }

    async fn get_audit_since(
        &self,
        since: DateTime<Utc>,
        limit: u32,
    ) -> anyhow::Result<Vec<AuditEntry>> {
        let rows = sqlx::query(
            "SELECT * FROM audit_log WHERE timestamp > ? \
             ORDER BY timestamp DESC, id DESC LIMIT ?",
        )
        .bind(format_datetime(&since))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in &rows {
            entries.push(audit_entry_from_row(row)?);
        }
        Ok(entries)
    }

    async fn get_audit_for_identity(&self, id: &IdentityId) -> anyhow::Result<Vec<AuditEntry>> {
        let rows = sqlx::query("SELECT * FROM audit_log WHERE identity_id = ? ORDER BY id ASC")
            .bind(id.to_string())
            .fetch_all(&self.pool)
            .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in &rows {
            entries.push(audit_entry_from_row(row)?);
        }
        Ok(entries)
    }
}
