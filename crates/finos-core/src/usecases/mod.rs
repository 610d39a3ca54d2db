//! Use cases (interactors) for FinOS
//!
//! Thin coordinators that apply domain rules at the edges of a session.
//!
//! ## Use Cases
//!
//! - [`ConnectivityGuard`] - Decides whether an identity-destructive transition may run
//! - [`AuthGate`] - Single-attempt biometric unlock required before any session

pub mod auth_gate;
pub mod connectivity_guard;

pub use auth_gate::{AuthFailure, AuthGate, AuthGrant};
pub use connectivity_guard::{
    AcknowledgedDataLoss, BlockReason, ConnectivityGuard, DataLossWarning, SwitchDecision,
};
