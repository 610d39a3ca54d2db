//! Purge reporting
//!
//! A purge removes everything the outgoing identity left in the local
//! cache. [`PurgeReport`] describes what was deleted and whether a follow-up
//! scan found anything left behind.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::newtypes::IdentityId;

/// Outcome of removing one identity's local data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurgeReport {
    pub identity_id: IdentityId,
    /// Rows deleted per storage area (tables, queue, secrets, preferences)
    pub rows_deleted: BTreeMap<String, u64>,
    /// Rows still present for the identity after the purge
    pub remaining: BTreeMap<String, u64>,
}

impl PurgeReport {
    pub fn new(identity_id: IdentityId) -> Self {
        Self {
            identity_id,
            rows_deleted: BTreeMap::new(),
            remaining: BTreeMap::new(),
        }
    }

    pub fn total_deleted(&self) -> u64 {
        self.rows_deleted.values().sum()
    }

    /// The identity has no rows left anywhere in the cache
    pub fn is_verified(&self) -> bool {
        self.remaining.values().all(|count| *count == 0)
    }

    /// Areas that still hold rows for the identity
    pub fn leftovers(&self) -> Vec<String> {
        self.remaining
            .iter()
            .filter(|(_, count)| **count > 0)
            .map(|(area, count)| format!("{area}={count}"))
            .collect()
    }
}
