//! Remote store port (driven/secondary port)
//!
//! This module defines the interface to the authoritative FinOS backend:
//! per-table revisions, incremental pulls, mutation pushes and identity
//! lookup.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because transport errors are adapter-specific.
//! - The server is authoritative. A push may be partially rejected when the
//!   server holds a newer revision of a row; rejections are reported in
//!   [`PushOutcome`], not as errors.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::{Email, Identity, MutationId, PendingMutation, Record, TableName};

/// Rows changed on the server since a given revision
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PullBatch {
    pub records: Vec<Record>,
    /// Server revision of the table at the time of the pull
    pub server_version: u64,
}

/// A mutation the server refused to apply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedMutation {
    pub id: MutationId,
    pub reason: String,
}

/// Server response to a push
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushOutcome {
    /// Server revision of the table after applying the batch
    pub server_version: u64,
    #[serde(default)]
    pub accepted: Vec<MutationId>,
    #[serde(default)]
    pub rejected: Vec<RejectedMutation>,
}

impl PushOutcome {
    /// Ids the server processed either way; both leave the local queue
    pub fn processed_ids(&self) -> Vec<MutationId> {
        self.accepted
            .iter()
            .copied()
            .chain(self.rejected.iter().map(|r| r.id))
            .collect()
    }
}

/// Port trait for the authoritative backend
#[async_trait::async_trait]
pub trait IRemoteStore: Send + Sync {
    /// Current server revision of every table visible to `identity`
    async fn server_versions(&self, identity: &Identity)
        -> anyhow::Result<BTreeMap<TableName, u64>>;

    /// Rows of `table` changed after revision `since`
    async fn pull(
        &self,
        identity: &Identity,
        table: &TableName,
        since: u64,
    ) -> anyhow::Result<PullBatch>;

    /// Sends queued mutations for one table
    async fn push(
        &self,
        identity: &Identity,
        table: &TableName,
        mutations: &[PendingMutation],
    ) -> anyhow::Result<PushOutcome>;

    /// Looks up the identity registered under `email`
    async fn resolve_identity(&self, email: &Email) -> anyhow::Result<Identity>;
}
