//! Shared fixtures for transition tests
//!
//! Ports are mocked by hand: the remote store and network monitor keep their
//! state behind `std::sync::Mutex`/atomics and can be told to fail or to
//! block at a given call. The local cache is a real in-memory SQLite store.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde_json::json;
use tokio::sync::Notify;

use finos_cache::{DatabasePool, SqliteLocalStore};
use finos_core::domain::{
    AuditAction, AuditEntry, AuditId, DataScope, Email, Identity, IdentityId, MutationId,
    MutationOp, PendingMutation, PendingMutationSet, PurgeReport, Record, TableCatalog,
    TableName, VersionEntry,
};
use finos_core::ports::{
    BiometricAvailability, BiometricKind, IBiometricProvider, ILocalStore, INetworkMonitor,
    IRemoteStore, PullBatch, PushOutcome,
};
use finos_core::usecases::AuthGate;
use finos_session::SessionTransitionCoordinator;
use finos_sync::{RetryPolicy, SyncContext};

/// Pauses a mocked call until the test releases it
#[derive(Clone, Default)]
pub struct Hold {
    pub entered: Arc<Notify>,
    pub release: Arc<Notify>,
}

impl Hold {
    async fn wait(&self) {
        self.entered.notify_one();
        self.release.notified().await;
    }
}

// ============================================================================
// Remote store
// ============================================================================

#[derive(Default)]
pub struct MockRemote {
    versions: Mutex<BTreeMap<TableName, u64>>,
    rows: Mutex<BTreeMap<TableName, Vec<Record>>>,
    pushes: Mutex<Vec<(String, usize)>>,
    pub fail_pushes: AtomicBool,
    pub fail_pulls: AtomicBool,
    hold_push: Mutex<Option<Hold>>,
}

impl MockRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Publishes one row of `table` at `version`
    pub fn add_row(&self, table: &str, id: &str, version: u64) {
        let table = TableName::new(table).unwrap();
        self.rows
            .lock()
            .unwrap()
            .entry(table.clone())
            .or_default()
            .push(Record::new(id, json!({ "id": id }), version, 1_700_000_000_000));
        let mut versions = self.versions.lock().unwrap();
        let current = versions.entry(table).or_insert(0);
        *current = (*current).max(version);
    }

    /// Makes the next push block until the returned hold is released
    pub fn hold_next_push(&self) -> Hold {
        let hold = Hold::default();
        *self.hold_push.lock().unwrap() = Some(hold.clone());
        hold
    }

    /// Mutations received so far, across all pushes
    pub fn pushed(&self) -> usize {
        self.pushes.lock().unwrap().iter().map(|(_, n)| n).sum()
    }

    pub fn push_calls(&self) -> usize {
        self.pushes.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl IRemoteStore for MockRemote {
    async fn server_versions(&self, _identity: &Identity) -> anyhow::Result<BTreeMap<TableName, u64>> {
        Ok(self.versions.lock().unwrap().clone())
    }

    async fn pull(
        &self,
        _identity: &Identity,
        table: &TableName,
        since: u64,
    ) -> anyhow::Result<PullBatch> {
        if self.fail_pulls.load(Ordering::SeqCst) {
            anyhow::bail!("503 Service Unavailable");
        }
        let records = self
            .rows
            .lock()
            .unwrap()
            .get(table)
            .map(|rows| rows.iter().filter(|r| r.version > since).cloned().collect())
            .unwrap_or_default();
        let server_version = self.versions.lock().unwrap().get(table).copied().unwrap_or(0);
        Ok(PullBatch {
            records,
            server_version,
        })
    }

    async fn push(
        &self,
        _identity: &Identity,
        table: &TableName,
        mutations: &[PendingMutation],
    ) -> anyhow::Result<PushOutcome> {
        let hold = self.hold_push.lock().unwrap().take();
        if let Some(hold) = hold {
            hold.wait().await;
        }
        if self.fail_pushes.load(Ordering::SeqCst) {
            anyhow::bail!("503 Service Unavailable");
        }
        self.pushes
            .lock()
            .unwrap()
            .push((table.to_string(), mutations.len()));
        let mut versions = self.versions.lock().unwrap();
        let version = versions.entry(table.clone()).or_insert(0);
        *version += mutations.len() as u64;
        Ok(PushOutcome {
            server_version: *version,
            accepted: mutations.iter().map(|m| *m.id()).collect(),
            rejected: Vec::new(),
        })
    }

    async fn resolve_identity(&self, email: &Email) -> anyhow::Result<Identity> {
        Ok(Identity::new(IdentityId::new(), email.clone(), "Mock"))
    }
}

// ============================================================================
// Network monitor
// ============================================================================

pub struct MockNetwork {
    online: AtomicBool,
    hold: Mutex<Option<Hold>>,
}

impl MockNetwork {
    pub fn new(online: bool) -> Arc<Self> {
        Arc::new(Self {
            online: AtomicBool::new(online),
            hold: Mutex::new(None),
        })
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Makes the next probe block until the returned hold is released
    pub fn hold_next_probe(&self) -> Hold {
        let hold = Hold::default();
        *self.hold.lock().unwrap() = Some(hold.clone());
        hold
    }
}

#[async_trait::async_trait]
impl INetworkMonitor for MockNetwork {
    async fn is_online(&self) -> bool {
        let hold = self.hold.lock().unwrap().take();
        if let Some(hold) = hold {
            hold.wait().await;
        }
        self.online.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Biometric provider
// ============================================================================

pub struct MockBiometric {
    pub verified: bool,
}

#[async_trait::async_trait]
impl IBiometricProvider for MockBiometric {
    async fn check_availability(&self) -> anyhow::Result<BiometricAvailability> {
        Ok(BiometricAvailability {
            available: true,
            kind: BiometricKind::Fingerprint,
        })
    }

    async fn verify_identity(&self, _prompt: &str) -> anyhow::Result<bool> {
        Ok(self.verified)
    }
}

// ============================================================================
// Local store whose purge always fails
// ============================================================================

pub struct PurgeFailingStore {
    inner: Arc<SqliteLocalStore>,
}

#[async_trait::async_trait]
impl ILocalStore for PurgeFailingStore {
    async fn get_record(
        &self,
        scope: &DataScope,
        table: &TableName,
        id: &str,
    ) -> anyhow::Result<Option<Record>> {
        self.inner.get_record(scope, table, id).await
    }

    async fn upsert_records(
        &self,
        scope: &DataScope,
        table: &TableName,
        records: &[Record],
    ) -> anyhow::Result<usize> {
        self.inner.upsert_records(scope, table, records).await
    }

    async fn count_records(&self, scope: &DataScope, table: &TableName) -> anyhow::Result<u64> {
        self.inner.count_records(scope, table).await
    }

    async fn apply_local_mutation(
        &self,
        owner: &IdentityId,
        scope: &DataScope,
        mutation: &PendingMutation,
    ) -> anyhow::Result<()> {
        self.inner.apply_local_mutation(owner, scope, mutation).await
    }

    async fn pending_mutations(&self, owner: &IdentityId) -> anyhow::Result<PendingMutationSet> {
        self.inner.pending_mutations(owner).await
    }

    async fn remove_mutations(&self, owner: &IdentityId, ids: &[MutationId]) -> anyhow::Result<u64> {
        self.inner.remove_mutations(owner, ids).await
    }

    async fn load_versions(&self, owner: &IdentityId) -> anyhow::Result<Vec<VersionEntry>> {
        self.inner.load_versions(owner).await
    }

    async fn save_version(&self, scope: &DataScope, entry: &VersionEntry) -> anyhow::Result<()> {
        self.inner.save_version(scope, entry).await
    }

    async fn active_identity(&self) -> anyhow::Result<Option<Identity>> {
        self.inner.active_identity().await
    }

    async fn set_active_identity(&self, identity: Option<&Identity>) -> anyhow::Result<()> {
        self.inner.set_active_identity(identity).await
    }

    async fn set_preference(&self, owner: &IdentityId, key: &str, value: &str) -> anyhow::Result<()> {
        self.inner.set_preference(owner, key, value).await
    }

    async fn get_preference(&self, owner: &IdentityId, key: &str) -> anyhow::Result<Option<String>> {
        self.inner.get_preference(owner, key).await
    }

    async fn purge_identity(&self, _id: &IdentityId) -> anyhow::Result<PurgeReport> {
        anyhow::bail!("disk I/O error")
    }

    async fn save_audit(&self, entry: &AuditEntry) -> anyhow::Result<AuditId> {
        self.inner.save_audit(entry).await
    }

    async fn get_audit_since(
        &self,
        since: DateTime<Utc>,
        limit: u32,
    ) -> anyhow::Result<Vec<AuditEntry>> {
        self.inner.get_audit_since(since, limit).await
    }

    async fn get_audit_for_identity(&self, id: &IdentityId) -> anyhow::Result<Vec<AuditEntry>> {
        self.inner.get_audit_for_identity(id).await
    }
}

// ============================================================================
// Harness
// ============================================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct Options {
    pub lock_enabled: bool,
    pub purge_fails: bool,
    pub offline: bool,
}

pub struct Harness {
    pub remote: Arc<MockRemote>,
    pub network: Arc<MockNetwork>,
    pub store: Arc<SqliteLocalStore>,
    pub coordinator: Arc<SessionTransitionCoordinator>,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_options(Options::default()).await
    }

    pub async fn with_options(options: Options) -> Self {
        let pool = DatabasePool::in_memory().await.unwrap();
        let store = Arc::new(SqliteLocalStore::new(pool.pool().clone()));
        let remote = MockRemote::new();
        let network = MockNetwork::new(!options.offline);
        let coordinator = Arc::new(build_coordinator(&remote, &network, &store, options));
        Self {
            remote,
            network,
            store,
            coordinator,
        }
    }

    /// A second coordinator over the same cache, as after a restart
    pub fn restart(&self) -> SessionTransitionCoordinator {
        build_coordinator(&self.remote, &self.network, &self.store, Options::default())
    }

    /// Signs `identity` in on an empty cache
    pub async fn first_login(&self, identity: &Identity) {
        self.coordinator.sign_in(identity.clone()).await.unwrap();
    }

    /// Records a local insert for the active identity
    pub async fn write(&self, table: &str, id: &str) {
        let session = self.coordinator.active_sync().await.unwrap();
        session
            .record_local_mutation(PendingMutation::new(
                TableName::new(table).unwrap(),
                id,
                MutationOp::Insert,
                json!({ "id": id }),
            ))
            .await
            .unwrap();
    }

    /// Live rows of a dynamic table owned by `identity`
    pub async fn rows(&self, identity: &Identity, table: &str) -> u64 {
        self.store
            .count_records(
                &DataScope::Identity(*identity.id()),
                &TableName::new(table).unwrap(),
            )
            .await
            .unwrap()
    }

    pub async fn pending(&self, identity: &Identity) -> usize {
        self.store.pending_mutations(identity.id()).await.unwrap().len()
    }

    pub async fn audit_actions(&self, identity: &Identity) -> Vec<AuditAction> {
        self.store
            .get_audit_for_identity(identity.id())
            .await
            .unwrap()
            .iter()
            .map(|e| e.action().clone())
            .collect()
    }
}

fn build_coordinator(
    remote: &Arc<MockRemote>,
    network: &Arc<MockNetwork>,
    store: &Arc<SqliteLocalStore>,
    options: Options,
) -> SessionTransitionCoordinator {
    let local: Arc<dyn ILocalStore> = if options.purge_fails {
        Arc::new(PurgeFailingStore {
            inner: Arc::clone(store),
        })
    } else {
        Arc::clone(store) as Arc<dyn ILocalStore>
    };
    let ctx = SyncContext::new(Arc::clone(remote) as Arc<dyn IRemoteStore>, local, catalog())
        .with_retry_policy(RetryPolicy::none());
    let auth = Arc::new(AuthGate::new(
        Arc::new(MockBiometric { verified: true }),
        options.lock_enabled,
    ));
    SessionTransitionCoordinator::new(ctx, Arc::clone(network) as Arc<dyn INetworkMonitor>, auth)
}

pub fn catalog() -> TableCatalog {
    TableCatalog::new(
        &["categories_global", "channel_types", "plan_suggestions"],
        &["wallets", "transactions"],
    )
    .unwrap()
}

pub fn identity(email: &str) -> Identity {
    Identity::new(IdentityId::new(), Email::new(email.to_string()).unwrap(), "Test User")
}
