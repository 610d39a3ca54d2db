//! Per-identity synchronization session
//!
//! A [`SyncSession`] owns the version vector and the per-table sync states of
//! exactly one signed-in identity. It is created when the identity is loaded
//! and dropped when the identity leaves; nothing carries over between
//! sessions.
//!
//! ## Table Sync Flow
//!
//! 1. **Push**: queued local mutations for the table are sent to the server.
//!    Accepted and rejected mutations both leave the queue.
//! 2. **Pull**: if the server is ahead, rows changed since the last merged
//!    revision are fetched and merged (higher version wins, newer
//!    `updated_at` breaks ties).
//! 3. **Settle**: if no local write touched the table during the window, the
//!    local revision moves to the server's. Otherwise the table ends
//!    `Failed` with `"conflict"` and keeps its local revision.
//!
//! Tables are independent: a full pass runs them concurrently and one
//! failure never rolls back another table.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use tokio::sync::{watch, Mutex, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use tracing::{debug, info, warn};

use finos_audit::AuditLogger;
use finos_core::domain::catalog::sort_by_priority;
use finos_core::domain::{
    normalize_reason, DataScope, Identity, PendingMutation, PendingMutationSet, Record,
    SyncProgress, TableCatalog, TableName, TableSyncState, TableSyncStatus, VersionEntry,
    VersionVector,
};
use finos_core::ports::{ILocalStore, IRemoteStore, PushOutcome};

use crate::{RetryPolicy, SyncError};

/// `last_result` of a table whose sync window saw local writes
pub const CONFLICT_RESULT: &str = "conflict";

/// Default number of tables synchronized at once
const DEFAULT_MAX_CONCURRENT_TABLES: usize = 4;

/// Dependencies shared by every session the application opens
#[derive(Clone)]
pub struct SyncContext {
    pub remote: Arc<dyn IRemoteStore>,
    pub local: Arc<dyn ILocalStore>,
    pub audit: Arc<AuditLogger>,
    pub catalog: TableCatalog,
    pub max_concurrent_tables: usize,
    pub retry: RetryPolicy,
}

impl SyncContext {
    pub fn new(
        remote: Arc<dyn IRemoteStore>,
        local: Arc<dyn ILocalStore>,
        catalog: TableCatalog,
    ) -> Self {
        let audit = Arc::new(AuditLogger::new(Arc::clone(&local)));
        Self {
            remote,
            local,
            audit,
            catalog,
            max_concurrent_tables: DEFAULT_MAX_CONCURRENT_TABLES,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_max_concurrent_tables(mut self, max: usize) -> Self {
        self.max_concurrent_tables = max.max(1);
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Outcome of pushing every queued mutation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FlushReport {
    pub pushed: usize,
    pub rejected: usize,
    /// Mutations still queued after the flush
    pub remaining: usize,
}

impl FlushReport {
    pub fn is_complete(&self) -> bool {
        self.remaining == 0
    }
}

/// Holds the session paused; dropping it resumes syncing
pub struct PauseGuard {
    guard: OwnedRwLockWriteGuard<()>,
}

impl PauseGuard {
    fn holds(&self, gate: &Arc<RwLock<()>>) -> bool {
        Arc::ptr_eq(OwnedRwLockWriteGuard::rwlock(&self.guard), gate)
    }
}

enum TableOutcome {
    Synced { applied: usize },
    Conflict,
}

/// Synchronization state of one signed-in identity
pub struct SyncSession {
    identity: Identity,
    ctx: SyncContext,
    versions: Mutex<VersionVector>,
    states: DashMap<TableName, TableSyncState>,
    /// Bumped on every local write; compared across a table's sync window
    generations: DashMap<TableName, u64>,
    progress_tx: watch::Sender<SyncProgress>,
    /// Syncs hold a read lock; `pause` takes the write lock
    gate: Arc<RwLock<()>>,
}

impl SyncSession {
    /// Opens a session for `identity`
    ///
    /// Starts from the catalog with every table at revision zero, then
    /// restores the revisions persisted for global tables and for this
    /// identity.
    pub async fn open(identity: Identity, ctx: SyncContext) -> Result<Self, SyncError> {
        let persisted = ctx
            .local
            .load_versions(identity.id())
            .await
            .map_err(|e| SyncError::local(&e))?;

        let mut entries: BTreeMap<TableName, VersionEntry> =
            VersionVector::from_catalog(&ctx.catalog)
                .entries()
                .map(|e| (e.table().clone(), e.clone()))
                .collect();
        for entry in persisted {
            if let Some(slot) = entries.get_mut(entry.table()) {
                if slot.kind() == entry.kind() {
                    *slot = entry;
                }
            }
        }
        let versions = VersionVector::from_entries(entries.into_values());

        let states = DashMap::new();
        for table in ctx.catalog.all() {
            states.insert(table.clone(), TableSyncState::new(table));
        }
        let initial = SyncProgress::from_states(states.iter().map(|s| s.value().clone()).collect());
        let (progress_tx, _) = watch::channel(initial);

        info!(
            identity = %identity.email(),
            tables = versions.len(),
            "Sync session opened"
        );

        Ok(Self {
            identity,
            ctx,
            versions: Mutex::new(versions),
            states,
            generations: DashMap::new(),
            progress_tx,
            gate: Arc::new(RwLock::new(())),
        })
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn catalog(&self) -> &TableCatalog {
        &self.ctx.catalog
    }

    /// Snapshot of the version vector
    pub async fn versions(&self) -> VersionVector {
        self.versions.lock().await.clone()
    }

    /// Queued mutations of this identity
    pub async fn pending(&self) -> Result<PendingMutationSet, SyncError> {
        self.ctx
            .local
            .pending_mutations(self.identity.id())
            .await
            .map_err(|e| SyncError::local(&e))
    }

    // ========================================================================
    // Progress
    // ========================================================================

    /// Current per-table states, in-flight tables first
    pub fn status(&self) -> SyncProgress {
        SyncProgress::from_states(self.states.iter().map(|s| s.value().clone()).collect())
    }

    /// Receives a fresh [`SyncProgress`] whenever a table state changes
    pub fn subscribe(&self) -> watch::Receiver<SyncProgress> {
        self.progress_tx.subscribe()
    }

    fn publish(&self) {
        self.progress_tx.send_replace(self.status());
    }

    fn update_state(
        &self,
        table: &TableName,
        f: impl FnOnce(&mut TableSyncState),
    ) -> TableSyncState {
        let snapshot = {
            let mut state = self
                .states
                .entry(table.clone())
                .or_insert_with(|| TableSyncState::new(table.clone()));
            f(&mut state);
            state.clone()
        };
        self.publish();
        snapshot
    }

    // ========================================================================
    // Pause
    // ========================================================================

    /// Stops new syncs and waits for in-flight ones to finish
    ///
    /// While the returned guard lives, every sync entry point and
    /// [`record_local_mutation`](Self::record_local_mutation) fail with
    /// [`SyncError::Paused`].
    pub async fn pause(&self) -> PauseGuard {
        debug!("Pausing sync, draining in-flight tables");
        let guard = Arc::clone(&self.gate).write_owned().await;
        info!(identity = %self.identity.email(), "Sync paused");
        PauseGuard { guard }
    }

    pub fn is_paused(&self) -> bool {
        self.gate.try_read().is_err()
    }

    fn enter(&self) -> Result<OwnedRwLockReadGuard<()>, SyncError> {
        Arc::clone(&self.gate)
            .try_read_owned()
            .map_err(|_| SyncError::Paused)
    }

    // ========================================================================
    // Local writes
    // ========================================================================

    /// Writes a mutation through to the cache and queues it for push
    ///
    /// Bumps the table's local revision and write generation. Returns the
    /// new local revision.
    pub async fn record_local_mutation(&self, mutation: PendingMutation) -> Result<u64, SyncError> {
        let _gate = self.enter()?;
        let table = self.known_table(mutation.table().as_str())?;
        let owner = *self.identity.id();
        let scope = self.ctx.catalog.scope_for(table.as_str(), &owner);

        self.ctx
            .local
            .apply_local_mutation(&owner, &scope, &mutation)
            .await
            .map_err(|e| SyncError::local(&e))?;

        let local_version = self
            .versions
            .lock()
            .await
            .record_local_mutation(table.as_str())?;
        *self.generations.entry(table.clone()).or_insert(0) += 1;
        self.persist_version(&scope, &table).await?;

        debug!(
            table = %table,
            record = mutation.record_id(),
            op = %mutation.op(),
            local_version,
            "Recorded local mutation"
        );
        Ok(local_version)
    }

    fn generation(&self, table: &TableName) -> u64 {
        self.generations.get(table).map(|g| *g).unwrap_or(0)
    }

    // ========================================================================
    // Sync entry points
    // ========================================================================

    /// Synchronizes one table
    ///
    /// Remote and cache failures end the table in `Failed`; they are not
    /// returned as errors.
    ///
    /// # Errors
    /// [`SyncError::UnknownTable`] or [`SyncError::Paused`].
    #[tracing::instrument(skip(self), fields(identity = %self.identity.id()))]
    pub async fn sync_table(&self, table: &str) -> Result<TableSyncState, SyncError> {
        let table = self.known_table(table)?;
        let _gate = self.enter()?;
        Ok(self.run_table(&table).await)
    }

    /// Synchronizes every table that is behind or has queued writes
    ///
    /// Server revisions are refreshed first. Tables run concurrently in
    /// priority order; results keep that order.
    #[tracing::instrument(skip(self), fields(identity = %self.identity.id()))]
    pub async fn sync_all(&self) -> Result<Vec<TableSyncState>, SyncError> {
        let _gate = self.enter()?;
        self.refresh_server_versions().await?;

        let pending_tables = self.pending().await?.tables();
        let candidates: Vec<TableName> = {
            let versions = self.versions.lock().await;
            versions
                .entries()
                .filter(|e| needs_sync(e) || pending_tables.contains(e.table()))
                .map(|e| e.table().clone())
                .collect()
        };
        Ok(self.run_tables(candidates).await)
    }

    /// Synchronizes every catalogued table regardless of revisions
    #[tracing::instrument(skip(self), fields(identity = %self.identity.id()))]
    pub async fn force_sync_now(&self) -> Result<Vec<TableSyncState>, SyncError> {
        let _gate = self.enter()?;
        info!("Manual sync requested");
        self.refresh_server_versions().await?;
        Ok(self.run_tables(self.ctx.catalog.all()).await)
    }

    /// Pushes every queued mutation without pulling
    ///
    /// # Errors
    /// Returns the first push or cache failure. Tables pushed before the
    /// failure stay pushed.
    #[tracing::instrument(skip(self), fields(identity = %self.identity.id()))]
    pub async fn flush_pending(&self) -> Result<FlushReport, SyncError> {
        let _gate = self.enter()?;
        self.flush().await
    }

    /// [`flush_pending`](Self::flush_pending) while this session is paused
    ///
    /// Local writes stay rejected for the whole flush, so `remaining` is
    /// final until `guard` drops.
    ///
    /// # Errors
    /// [`SyncError::Paused`] when `guard` pauses a different session.
    #[tracing::instrument(skip(self, guard), fields(identity = %self.identity.id()))]
    pub async fn flush_while_paused(&self, guard: &PauseGuard) -> Result<FlushReport, SyncError> {
        if !guard.holds(&self.gate) {
            return Err(SyncError::Paused);
        }
        self.flush().await
    }

    async fn flush(&self) -> Result<FlushReport, SyncError> {
        let owner = *self.identity.id();
        let pending = self.pending().await?;
        if pending.is_empty() {
            debug!("No pending mutations to flush");
            return Ok(FlushReport::default());
        }

        let mut report = FlushReport::default();
        for table in pending.tables() {
            let batch = pending.for_table(table.as_str());
            let outcome = self.push_batch(&table, &batch).await?;
            report.pushed += outcome.accepted.len();
            report.rejected += outcome.rejected.len();
            let scope = self.ctx.catalog.scope_for(table.as_str(), &owner);
            self.persist_version(&scope, &table).await?;
        }
        report.remaining = self.pending().await?.len();

        info!(
            pushed = report.pushed,
            rejected = report.rejected,
            remaining = report.remaining,
            "Flushed pending mutations"
        );
        Ok(report)
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn known_table(&self, table: &str) -> Result<TableName, SyncError> {
        if !self.ctx.catalog.contains(table) {
            return Err(SyncError::UnknownTable(table.to_string()));
        }
        Ok(TableName::new(table)?)
    }

    /// In-flight tables first, then core priority, then name
    fn order_tables(&self, mut tables: Vec<TableName>) -> Vec<TableName> {
        sort_by_priority(&mut tables);
        tables.dedup();
        tables.sort_by_key(|t| !self.states.get(t).is_some_and(|s| s.is_in_flight()));
        tables
    }

    async fn refresh_server_versions(&self) -> Result<(), SyncError> {
        let server = self
            .ctx
            .retry
            .run("server_versions", || {
                self.ctx.remote.server_versions(&self.identity)
            })
            .await
            .map_err(|e| SyncError::remote(&e))?;

        let ignored = self
            .versions
            .lock()
            .await
            .apply_server_versions(server.iter());
        if !ignored.is_empty() {
            warn!(tables = ?ignored, "Server announced tables outside the catalog, ignoring");
        }
        Ok(())
    }

    async fn run_tables(&self, tables: Vec<TableName>) -> Vec<TableSyncState> {
        let ordered = self.order_tables(tables);
        if ordered.is_empty() {
            debug!("Nothing to sync");
            return Vec::new();
        }

        let owner = *self.identity.id();
        let started = Instant::now();
        info!(tables = ordered.len(), "Starting sync pass");
        self.ctx.audit.log_sync_start(owner, ordered.len()).await;

        let passes: Vec<_> = ordered.iter().map(|table| self.run_table(table)).collect();
        let results: Vec<TableSyncState> = stream::iter(passes)
            .buffered(self.ctx.max_concurrent_tables.max(1))
            .collect()
            .await;

        let completed = results
            .iter()
            .filter(|s| s.status() == TableSyncStatus::Completed)
            .count();
        let failed = results
            .iter()
            .filter(|s| s.status() == TableSyncStatus::Failed)
            .count();
        let duration = started.elapsed();
        info!(
            completed,
            failed,
            duration_ms = duration_ms(duration),
            "Sync pass finished"
        );
        self.ctx
            .audit
            .log_sync_complete(owner, duration_ms(duration), completed, failed)
            .await;

        results
    }

    async fn run_table(&self, table: &TableName) -> TableSyncState {
        let already_running = {
            let mut state = self
                .states
                .entry(table.clone())
                .or_insert_with(|| TableSyncState::new(table.clone()));
            if state.is_in_flight() {
                Some(state.clone())
            } else {
                state.begin();
                None
            }
        };
        if let Some(state) = already_running {
            debug!(table = %table, "Table already syncing");
            return state;
        }
        self.publish();

        let generation = self.generation(table);
        match self.sync_window(table, generation).await {
            Ok(TableOutcome::Synced { applied }) => {
                debug!(table = %table, applied, "Table synchronized");
                self.update_state(table, |s| s.complete(format!("{applied} row(s) merged")))
            }
            Ok(TableOutcome::Conflict) => {
                self.update_state(table, |s| s.fail(CONFLICT_RESULT))
            }
            Err(e) => {
                warn!(table = %table, error = %e, "Table sync failed");
                let reason = normalize_reason(e.to_string());
                self.update_state(table, |s| s.fail(reason))
            }
        }
    }

    async fn sync_window(
        &self,
        table: &TableName,
        generation: u64,
    ) -> Result<TableOutcome, SyncError> {
        let owner = *self.identity.id();
        let scope = self.ctx.catalog.scope_for(table.as_str(), &owner);

        // Push
        let pending = self.pending().await?.for_table(table.as_str());
        if !pending.is_empty() {
            self.push_batch(table, &pending).await?;
        }
        self.update_state(table, |s| s.advance(40));

        // Pull
        let (needs_pull, since) = {
            let versions = self.versions.lock().await;
            versions
                .get(table.as_str())
                .map(|e| (needs_sync(e), e.base_version()))
                .unwrap_or((false, 0))
        };
        let mut applied = 0;
        if needs_pull {
            let batch = self
                .ctx
                .retry
                .run("pull", || self.ctx.remote.pull(&self.identity, table, since))
                .await
                .map_err(|e| SyncError::remote(&e))?;
            applied = self.merge_records(&scope, table, batch.records).await?;
            self.versions
                .lock()
                .await
                .acknowledge(table.as_str(), batch.server_version)?;
        }
        self.update_state(table, |s| s.advance(80));

        // Settle
        if self.generation(table) != generation {
            warn!(table = %table, "Local writes during sync, keeping local revision");
            self.ctx.audit.log_sync_conflict(owner, table).await;
            self.persist_version(&scope, table).await?;
            return Ok(TableOutcome::Conflict);
        }
        self.versions.lock().await.mark_synced(table.as_str())?;
        self.persist_version(&scope, table).await?;
        Ok(TableOutcome::Synced { applied })
    }

    async fn push_batch(
        &self,
        table: &TableName,
        mutations: &[PendingMutation],
    ) -> Result<PushOutcome, SyncError> {
        let owner = *self.identity.id();
        let outcome = self
            .ctx
            .retry
            .run("push", || {
                self.ctx.remote.push(&self.identity, table, mutations)
            })
            .await
            .map_err(|e| SyncError::remote(&e))?;

        self.ctx
            .local
            .remove_mutations(&owner, &outcome.processed_ids())
            .await
            .map_err(|e| SyncError::local(&e))?;
        self.versions
            .lock()
            .await
            .acknowledge(table.as_str(), outcome.server_version)?;

        if !outcome.rejected.is_empty() {
            warn!(
                table = %table,
                rejected = outcome.rejected.len(),
                "Server rejected mutations with newer remote versions"
            );
            self.ctx
                .audit
                .log_push_rejected(owner, table, &outcome.rejected)
                .await;
        }
        info!(
            table = %table,
            accepted = outcome.accepted.len(),
            rejected = outcome.rejected.len(),
            server_version = outcome.server_version,
            "Pushed local mutations"
        );
        Ok(outcome)
    }

    async fn merge_records(
        &self,
        scope: &DataScope,
        table: &TableName,
        records: Vec<Record>,
    ) -> Result<usize, SyncError> {
        let mut winners = Vec::with_capacity(records.len());
        for record in records {
            let current = self
                .ctx
                .local
                .get_record(scope, table, &record.id)
                .await
                .map_err(|e| SyncError::local(&e))?;
            if record.should_apply_over(current.as_ref()) {
                winners.push(record);
            } else {
                debug!(table = %table, record = %record.id, "Cached row is newer, skipping");
            }
        }
        if winners.is_empty() {
            return Ok(0);
        }
        self.ctx
            .local
            .upsert_records(scope, table, &winners)
            .await
            .map_err(|e| SyncError::local(&e))
    }

    async fn persist_version(&self, scope: &DataScope, table: &TableName) -> Result<(), SyncError> {
        let entry = self.versions.lock().await.get(table.as_str()).cloned();
        if let Some(entry) = entry {
            self.ctx
                .local
                .save_version(scope, &entry)
                .await
                .map_err(|e| SyncError::local(&e))?;
        }
        Ok(())
    }
}

/// The server holds revisions the cache has not merged
fn needs_sync(entry: &VersionEntry) -> bool {
    entry.is_behind() || entry.server_version() > entry.base_version()
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Tables of `states` that did not complete
pub fn unfinished_tables(states: &[TableSyncState]) -> BTreeSet<TableName> {
    states
        .iter()
        .filter(|s| s.status() != TableSyncStatus::Completed)
        .map(|s| s.table().clone())
        .collect()
}
