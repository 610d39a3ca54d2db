//! FinOS Core - Domain logic and business rules
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `Identity`, `VersionVector`, `TableSyncState`, `PendingMutationSet`, `Transition`, `AuditEntry`
//! - **Use cases** - `ConnectivityGuard`, `AuthGate`
//! - **Port definitions** - Traits for adapters: `IRemoteStore`, `ILocalStore`, `IBiometricProvider`, `INetworkMonitor`
//! - **Configuration** - YAML-backed settings with validation
//!
//! # Architecture
//!
//! The domain module contains pure business logic with no I/O.
//! Ports define trait interfaces that adapter crates implement.
//! Use cases orchestrate domain entities through port interfaces.

pub mod config;
pub mod domain;
pub mod ports;
pub mod usecases;
