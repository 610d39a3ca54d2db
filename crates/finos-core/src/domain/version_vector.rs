//! Version vector
//!
//! Tracks, per table, the revision the local cache holds and the latest
//! revision the server has announced. A table is *behind* when the server is
//! ahead of the cache and *ahead* when local writes have not been
//! acknowledged yet.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::catalog::{TableCatalog, TableKind};
use super::errors::DomainError;
use super::newtypes::TableName;

/// Revision pair for a single table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionEntry {
    table: TableName,
    kind: TableKind,
    local_version: u64,
    server_version: u64,
    /// Server revision the cache last merged completely; pulls resume here
    #[serde(default)]
    base_version: u64,
}

impl VersionEntry {
    pub fn new(table: TableName, kind: TableKind) -> Self {
        Self {
            table,
            kind,
            local_version: 0,
            server_version: 0,
            base_version: 0,
        }
    }

    /// Rebuilds an entry from persisted values
    pub fn with_versions(mut self, local: u64, server: u64, base: u64) -> Self {
        self.local_version = local;
        self.server_version = server;
        self.base_version = base;
        self
    }

    pub fn table(&self) -> &TableName {
        &self.table
    }

    pub fn kind(&self) -> TableKind {
        self.kind
    }

    pub fn local_version(&self) -> u64 {
        self.local_version
    }

    pub fn server_version(&self) -> u64 {
        self.server_version
    }

    pub fn base_version(&self) -> u64 {
        self.base_version
    }

    /// The server holds revisions the cache has not merged
    pub fn is_behind(&self) -> bool {
        self.server_version > self.local_version
    }

    /// The cache holds writes the server has not acknowledged
    pub fn is_ahead(&self) -> bool {
        self.local_version > self.server_version
    }

    pub fn is_in_sync(&self) -> bool {
        self.local_version == self.server_version
    }
}

/// Local and server revisions for one table, as reported by diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionDiff {
    pub local: u64,
    pub server: u64,
}

/// Sum of revisions across a group of tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VersionSum {
    pub local: u64,
    pub server: u64,
}

impl VersionSum {
    pub fn is_behind(&self) -> bool {
        self.server > self.local
    }

    pub fn differs(&self) -> bool {
        self.server != self.local
    }
}

/// Per-table revision map for the signed-in identity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionVector {
    entries: BTreeMap<TableName, VersionEntry>,
}

impl VersionVector {
    pub fn new() -> Self {
        Self::default()
    }

    /// A vector with every catalogued table at revision zero
    pub fn from_catalog(catalog: &TableCatalog) -> Self {
        let mut vector = Self::new();
        for table in catalog.static_tables() {
            vector.register(table.clone(), TableKind::Static);
        }
        for table in catalog.dynamic_tables() {
            vector.register(table.clone(), TableKind::Dynamic);
        }
        vector
    }

    /// Restores a vector from persisted entries
    pub fn from_entries(entries: impl IntoIterator<Item = VersionEntry>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|e| (e.table.clone(), e))
                .collect(),
        }
    }

    /// Adds a table at revision zero; existing entries are left untouched
    pub fn register(&mut self, table: TableName, kind: TableKind) {
        self.entries
            .entry(table.clone())
            .or_insert_with(|| VersionEntry::new(table, kind));
    }

    pub fn get(&self, table: &str) -> Option<&VersionEntry> {
        self.entries.get(table)
    }

    pub fn entries(&self) -> impl Iterator<Item = &VersionEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Unknown tables are never behind
    pub fn is_behind(&self, table: &str) -> bool {
        self.get(table).is_some_and(VersionEntry::is_behind)
    }

    pub fn is_ahead(&self, table: &str) -> bool {
        self.get(table).is_some_and(VersionEntry::is_ahead)
    }

    /// Tables whose local and server revisions differ
    pub fn diff_summary(&self) -> BTreeMap<TableName, VersionDiff> {
        self.entries
            .values()
            .filter(|e| !e.is_in_sync())
            .map(|e| {
                (
                    e.table.clone(),
                    VersionDiff {
                        local: e.local_version,
                        server: e.server_version,
                    },
                )
            })
            .collect()
    }

    fn sum_of(&self, kind: TableKind) -> VersionSum {
        self.entries
            .values()
            .filter(|e| e.kind == kind)
            .fold(VersionSum::default(), |acc, e| VersionSum {
                local: acc.local.saturating_add(e.local_version),
                server: acc.server.saturating_add(e.server_version),
            })
    }

    /// Sum of static table revisions
    pub fn static_sum(&self) -> VersionSum {
        self.sum_of(TableKind::Static)
    }

    /// Sum of dynamic table revisions, used as the per-user sync token
    pub fn user_sync_token(&self) -> VersionSum {
        self.sum_of(TableKind::Dynamic)
    }

    /// Static reference data differs from the server
    pub fn has_static_drift(&self) -> bool {
        self.static_sum().differs()
    }

    /// Tables the server is ahead on, in table-name order
    pub fn tables_needing_pull(&self) -> Vec<TableName> {
        self.entries
            .values()
            .filter(|e| e.is_behind())
            .map(|e| e.table.clone())
            .collect()
    }

    /// Tables carrying unacknowledged local writes
    pub fn tables_with_local_changes(&self) -> Vec<TableName> {
        self.entries
            .values()
            .filter(|e| e.is_ahead())
            .map(|e| e.table.clone())
            .collect()
    }

    /// Applies server-announced revisions and returns tables that are not
    /// registered and were ignored
    pub fn apply_server_versions<'a>(
        &mut self,
        versions: impl IntoIterator<Item = (&'a TableName, &'a u64)>,
    ) -> Vec<TableName> {
        let mut ignored = Vec::new();
        for (table, version) in versions {
            match self.entries.get_mut(table.as_str()) {
                Some(entry) => entry.server_version = *version,
                None => ignored.push(table.clone()),
            }
        }
        ignored
    }

    /// Records a local write, returning the new local revision
    ///
    /// # Errors
    /// Returns [`DomainError::UnknownTable`] if the table is not registered
    pub fn record_local_mutation(&mut self, table: &str) -> Result<u64, DomainError> {
        let entry = self.entry_mut(table)?;
        entry.local_version += 1;
        Ok(entry.local_version)
    }

    /// Records the revision the server acknowledged after a push
    ///
    /// The server revision never moves backwards.
    pub fn acknowledge(&mut self, table: &str, server_version: u64) -> Result<(), DomainError> {
        let entry = self.entry_mut(table)?;
        entry.server_version = entry.server_version.max(server_version);
        Ok(())
    }

    /// Marks a table as fully merged: local and base move to the server
    /// revision
    pub fn mark_synced(&mut self, table: &str) -> Result<u64, DomainError> {
        let entry = self.entry_mut(table)?;
        entry.local_version = entry.server_version;
        entry.base_version = entry.server_version;
        Ok(entry.local_version)
    }

    fn entry_mut(&mut self, table: &str) -> Result<&mut VersionEntry, DomainError> {
        self.entries
            .get_mut(table)
            .ok_or_else(|| DomainError::UnknownTable(table.to_string()))
    }
}
