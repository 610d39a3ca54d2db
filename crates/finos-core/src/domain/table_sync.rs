//! Per-table sync state
//!
//! [`TableSyncState`] is the observable status of one table inside a
//! sync session. Only the sync session mutates it; everything else reads
//! snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::newtypes::TableName;

/// Status of a single table within a sync session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableSyncStatus {
    #[default]
    Idle,
    Syncing,
    Completed,
    Failed,
}

impl std::fmt::Display for TableSyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TableSyncStatus::Idle => "idle",
            TableSyncStatus::Syncing => "syncing",
            TableSyncStatus::Completed => "completed",
            TableSyncStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Observable sync status of one table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSyncState {
    table: TableName,
    status: TableSyncStatus,
    progress_percent: u8,
    last_result: Option<String>,
    updated_at: DateTime<Utc>,
}

impl TableSyncState {
    pub fn new(table: TableName) -> Self {
        Self {
            table,
            status: TableSyncStatus::Idle,
            progress_percent: 0,
            last_result: None,
            updated_at: Utc::now(),
        }
    }

    pub fn table(&self) -> &TableName {
        &self.table
    }

    pub fn status(&self) -> TableSyncStatus {
        self.status
    }

    pub fn progress_percent(&self) -> u8 {
        self.progress_percent
    }

    pub fn last_result(&self) -> Option<&str> {
        self.last_result.as_deref()
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn is_in_flight(&self) -> bool {
        self.status == TableSyncStatus::Syncing
    }

    /// Enters `Syncing` at 0%
    pub fn begin(&mut self) {
        self.status = TableSyncStatus::Syncing;
        self.progress_percent = 0;
        self.touch();
    }

    /// Updates progress while syncing; values are clamped to 0..=100 and
    /// never decrease
    pub fn advance(&mut self, percent: u8) {
        self.progress_percent = self.progress_percent.max(percent.min(100));
        self.touch();
    }

    pub fn complete(&mut self, result: impl Into<String>) {
        self.status = TableSyncStatus::Completed;
        self.progress_percent = 100;
        self.last_result = Some(result.into());
        self.touch();
    }

    /// Progress is kept where the failure happened
    pub fn fail(&mut self, reason: impl Into<String>) {
        self.status = TableSyncStatus::Failed;
        self.last_result = Some(reason.into());
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Aggregate view over all table states of a session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncProgress {
    pub completed: usize,
    pub failed: usize,
    pub total: usize,
    /// In-flight tables first, then by table name
    pub tables: Vec<TableSyncState>,
}

impl SyncProgress {
    pub fn from_states(mut tables: Vec<TableSyncState>) -> Self {
        tables.sort_by(|a, b| {
            b.is_in_flight()
                .cmp(&a.is_in_flight())
                .then_with(|| a.table.cmp(&b.table))
        });
        let completed = tables
            .iter()
            .filter(|t| t.status == TableSyncStatus::Completed)
            .count();
        let failed = tables
            .iter()
            .filter(|t| t.status == TableSyncStatus::Failed)
            .count();
        Self {
            completed,
            failed,
            total: tables.len(),
            tables,
        }
    }

    /// Overall percentage: 10% for setup, 80% spread across tables, the rest
    /// once every table has finished
    pub fn overall_percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        let finished = self.completed + self.failed;
        if finished == self.total {
            return 100;
        }
        (10 + finished * 80 / self.total) as u8
    }

    pub fn in_flight(&self) -> impl Iterator<Item = &TableSyncState> {
        self.tables.iter().filter(|t| t.is_in_flight())
    }
}
