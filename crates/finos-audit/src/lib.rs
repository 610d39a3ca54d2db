//! FinOS Audit - Audit trail for identity transitions and sync
//!
//! Provides:
//! - `AuditLogger`: High-level service for recording audit entries
//! - `ReasonCode`: Structured reason codes for blocked, failed or conflicting operations
//! - Integration with `ILocalStore` for persistent audit storage

pub mod logger;
pub mod reason;

pub use logger::AuditLogger;
pub use reason::ReasonCode;
