//! Domain entities and business logic
//!
//! This module contains the core domain types for FinOS:
//! - Newtypes for type-safe identifiers and validated values
//! - Identities and switch detection
//! - The table catalog and per-table version vector
//! - Pending mutations and cached records
//! - The session transition state machine
//! - Audit entries and purge reports
//! - Domain-specific error types

pub mod audit;
pub mod catalog;
pub mod cleanup;
pub mod errors;
pub mod identity;
pub mod mutation;
pub mod newtypes;
pub mod record;
pub mod table_sync;
pub mod transition;
pub mod version_vector;

// Re-export commonly used types
pub use audit::{AuditAction, AuditEntry, AuditResult};
pub use catalog::{DataScope, TableCatalog, TableKind};
pub use cleanup::PurgeReport;
pub use errors::{
    normalize_reason, user_facing_reason, DomainError, ErrorKind, GENERIC_FAILURE_REASON,
};
pub use identity::{Identity, Role, SwitchDetection};
pub use mutation::{MutationOp, PendingMutation, PendingMutationSet, UnsavedSummary};
pub use newtypes::*;
pub use record::Record;
pub use table_sync::{SyncProgress, TableSyncState, TableSyncStatus};
pub use transition::{SaveOutcome, Transition, TransitionFailure, TransitionKind, TransitionStep};
pub use version_vector::{VersionDiff, VersionEntry, VersionSum, VersionVector};
