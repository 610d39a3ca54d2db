//! Integration tests for finos-session
//!
//! Drives the SessionTransitionCoordinator against mocked remote, network
//! and biometric ports and a real in-memory SQLite cache, covering every
//! step of switch, logout, forced logout and first login.

mod common;

mod test_failures;
mod test_guards;
mod test_logout;
mod test_switch;
