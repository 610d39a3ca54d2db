//! Server version vector fetch

use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, ResponseTemplate};

use finos_core::ports::IRemoteStore;

use crate::common::{identity, setup_store, table, API_KEY};

#[tokio::test]
async fn versions_are_scoped_to_identity() {
    let (server, store) = setup_store().await;
    let alice = identity("alice@example.com");

    Mock::given(method("GET"))
        .and(path("/v1/sync/versions"))
        .and(header("authorization", format!("Bearer {API_KEY}").as_str()))
        .and(header("x-identity-id", alice.id().to_string().as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "versions": { "wallets": 4, "transactions": 12 }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let versions = store.server_versions(&alice).await.unwrap();
    assert_eq!(versions.len(), 2);
    assert_eq!(versions[&table("wallets")], 4);
    assert_eq!(versions[&table("transactions")], 12);
}

#[tokio::test]
async fn invalid_table_names_are_ignored() {
    let (server, store) = setup_store().await;

    Mock::given(method("GET"))
        .and(path("/v1/sync/versions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "versions": { "wallets": 1, "Bad Table!": 9 }
        })))
        .mount(&server)
        .await;

    let versions = store
        .server_versions(&identity("alice@example.com"))
        .await
        .unwrap();
    assert_eq!(versions.len(), 1);
    assert!(versions.contains_key(&table("wallets")));
}

#[tokio::test]
async fn server_error_keeps_status_in_message() {
    let (server, store) = setup_store().await;

    Mock::given(method("GET"))
        .and(path("/v1/sync/versions"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let err = store
        .server_versions(&identity("alice@example.com"))
        .await
        .unwrap_err();
    assert!(format!("{err:#}").contains("503"));
}

#[tokio::test]
async fn throttled_request_is_retried() {
    let (server, store) = setup_store().await;

    Mock::given(method("GET"))
        .and(path("/v1/sync/versions"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/sync/versions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "versions": { "wallets": 2 }
        })))
        .with_priority(2)
        .mount(&server)
        .await;

    let versions = store
        .server_versions(&identity("alice@example.com"))
        .await
        .unwrap();
    assert_eq!(versions[&table("wallets")], 2);
}

#[tokio::test]
async fn throttling_gives_up_after_max_retries() {
    let (server, store) = setup_store().await;

    Mock::given(method("GET"))
        .and(path("/v1/sync/versions"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
        .expect(3)
        .mount(&server)
        .await;

    let err = store
        .server_versions(&identity("alice@example.com"))
        .await
        .unwrap_err();
    assert!(format!("{err:#}").contains("429"));
}
