//! Cached table rows
//!
//! A [`Record`] is one row of a synchronized table as held in the local
//! cache. The payload is opaque JSON; only the versioning metadata matters to
//! reconciliation.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One cached row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub payload: Value,
    pub version: u64,
    /// Last modification time in milliseconds since the Unix epoch
    pub updated_at: i64,
    #[serde(default)]
    pub is_deleted: bool,
}

impl Record {
    pub fn new(id: impl Into<String>, payload: Value, version: u64, updated_at: i64) -> Self {
        Self {
            id: id.into(),
            payload,
            version,
            updated_at,
            is_deleted: false,
        }
    }

    pub fn deleted(mut self) -> Self {
        self.is_deleted = true;
        self
    }

    /// Returns true if this row should replace `other`
    ///
    /// A higher version wins; on equal versions the more recent
    /// `updated_at` wins. Ties keep `other`.
    pub fn supersedes(&self, other: &Record) -> bool {
        self.version > other.version
            || (self.version == other.version && self.updated_at > other.updated_at)
    }

    /// Decides whether an incoming remote row replaces the cached one
    pub fn should_apply_over(&self, local: Option<&Record>) -> bool {
        match local {
            None => true,
            Some(local) => self.supersedes(local),
        }
    }
}
