//! Pending local mutations
//!
//! Local writes are queued as [`PendingMutation`]s until the server
//! acknowledges them. A non-empty [`PendingMutationSet`] means the cache holds
//! data that exists nowhere else.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::newtypes::{MutationId, TableName};

/// Kind of write captured by a mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationOp {
    Insert,
    Update,
    Delete,
}

impl std::fmt::Display for MutationOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MutationOp::Insert => "insert",
            MutationOp::Update => "update",
            MutationOp::Delete => "delete",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for MutationOp {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "insert" => Ok(MutationOp::Insert),
            "update" => Ok(MutationOp::Update),
            "delete" => Ok(MutationOp::Delete),
            other => Err(format!("unknown mutation op: {other}")),
        }
    }
}

/// A local write not yet acknowledged by the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingMutation {
    id: MutationId,
    table: TableName,
    record_id: String,
    op: MutationOp,
    payload: Value,
    created_at: DateTime<Utc>,
}

impl PendingMutation {
    pub fn new(table: TableName, record_id: impl Into<String>, op: MutationOp, payload: Value) -> Self {
        Self {
            id: MutationId::new(),
            table,
            record_id: record_id.into(),
            op,
            payload,
            created_at: Utc::now(),
        }
    }

    /// Rebuilds a mutation read back from storage
    pub fn restore(
        id: MutationId,
        table: TableName,
        record_id: String,
        op: MutationOp,
        payload: Value,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            table,
            record_id,
            op,
            payload,
            created_at,
        }
    }

    pub fn id(&self) -> &MutationId {
        &self.id
    }

    pub fn table(&self) -> &TableName {
        &self.table
    }

    pub fn record_id(&self) -> &str {
        &self.record_id
    }

    pub fn op(&self) -> MutationOp {
        self.op
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Counts of unsaved rows grouped the way users think about them
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsavedSummary {
    pub transactions: usize,
    pub wallets: usize,
    pub plans: usize,
    pub other: usize,
}

impl UnsavedSummary {
    pub fn total(&self) -> usize {
        self.transactions + self.wallets + self.plans + self.other
    }
}

/// Ordered queue of pending mutations for one identity
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PendingMutationSet {
    mutations: Vec<PendingMutation>,
}

impl PendingMutationSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_vec(mut mutations: Vec<PendingMutation>) -> Self {
        mutations.sort_by_key(|m| m.created_at);
        Self { mutations }
    }

    pub fn push(&mut self, mutation: PendingMutation) {
        self.mutations.push(mutation);
    }

    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.mutations.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingMutation> {
        self.mutations.iter()
    }

    /// Mutations for one table, oldest first
    pub fn for_table(&self, table: &str) -> Vec<PendingMutation> {
        self.mutations
            .iter()
            .filter(|m| m.table.as_str() == table)
            .cloned()
            .collect()
    }

    /// Distinct tables with pending writes
    pub fn tables(&self) -> BTreeSet<TableName> {
        self.mutations.iter().map(|m| m.table.clone()).collect()
    }

    /// Drops mutations the server has processed
    pub fn remove(&mut self, ids: &[MutationId]) {
        self.mutations.retain(|m| !ids.contains(&m.id));
    }

    /// Groups pending rows for the data-loss warning
    pub fn summarize(&self) -> UnsavedSummary {
        let mut summary = UnsavedSummary::default();
        for m in &self.mutations {
            match m.table.as_str() {
                "transactions" | "transfers" => summary.transactions += 1,
                "wallets" | "channels" => summary.wallets += 1,
                t if t.starts_with("financial_plan") || t == "budgets" => summary.plans += 1,
                _ => summary.other += 1,
            }
        }
        summary
    }
}

impl IntoIterator for PendingMutationSet {
    type Item = PendingMutation;
    type IntoIter = std::vec::IntoIter<PendingMutation>;

    fn into_iter(self) -> Self::IntoIter {
        self.mutations.into_iter()
    }
}
