//! Shared helpers for the FinOS API mocks

use std::time::Duration;

use wiremock::MockServer;

use finos_core::domain::{Email, Identity, IdentityId, TableName};
use finos_remote::{RestClient, RestRemoteStore};

pub const API_KEY: &str = "test-api-key";

/// Starts a mock server and returns a store pointed at it
pub async fn setup_store() -> (MockServer, RestRemoteStore) {
    let server = MockServer::start().await;
    let client = RestClient::new(server.uri(), Duration::from_secs(5))
        .unwrap()
        .with_api_key(API_KEY)
        .with_max_retries(2);
    (server, RestRemoteStore::new(client))
}

pub fn identity(email: &str) -> Identity {
    Identity::new(
        IdentityId::new(),
        Email::new(email.to_string()).unwrap(),
        "Test User",
    )
}

pub fn table(name: &str) -> TableName {
    TableName::new(name).unwrap()
}
