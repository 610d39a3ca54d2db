//! Integration tests for finos-remote
//!
//! Uses wiremock to simulate the FinOS sync API and verifies the REST
//! store, the 429 handling of the client and the reachability probe.

mod common;

mod test_identity;
mod test_pull_push;
mod test_reachability;
mod test_versions;
