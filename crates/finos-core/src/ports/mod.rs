//! Port definitions (hexagonal architecture interfaces)
//!
//! Ports are the interfaces the domain core depends on; adapter crates
//! provide the implementations.
//!
//! ## Ports Overview
//!
//! - [`IRemoteStore`] - The authoritative backend (versions, pull, push)
//! - [`ILocalStore`] - The on-device cache, mutation queue and audit log
//! - [`IBiometricProvider`] - Strong user verification
//! - [`INetworkMonitor`] - Connectivity probe

pub mod biometric;
pub mod local_store;
pub mod network;
pub mod remote_store;

pub use biometric::{BiometricAvailability, BiometricKind, IBiometricProvider};
pub use local_store::ILocalStore;
pub use network::INetworkMonitor;
pub use remote_store::{IRemoteStore, PullBatch, PushOutcome, RejectedMutation};
