//! Incremental pulls and mutation pushes

use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

use finos_core::domain::{MutationOp, PendingMutation};
use finos_core::ports::IRemoteStore;

use crate::common::{identity, setup_store, table};

#[tokio::test]
async fn pull_sends_since_and_parses_records() {
    let (server, store) = setup_store().await;

    Mock::given(method("GET"))
        .and(path("/v1/tables/wallets"))
        .and(query_param("since", "3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "records": [
                {
                    "id": "w-1",
                    "payload": { "name": "Cash", "balance": 120 },
                    "version": 4,
                    "updated_at": 1_700_000_000_000_i64
                },
                {
                    "id": "w-2",
                    "payload": {},
                    "version": 5,
                    "updated_at": 1_700_000_100_000_i64,
                    "is_deleted": true
                }
            ],
            "server_version": 5
        })))
        .expect(1)
        .mount(&server)
        .await;

    let batch = store
        .pull(&identity("alice@example.com"), &table("wallets"), 3)
        .await
        .unwrap();
    assert_eq!(batch.server_version, 5);
    assert_eq!(batch.records.len(), 2);
    assert_eq!(batch.records[0].id, "w-1");
    assert_eq!(batch.records[0].payload["name"], "Cash");
    assert!(!batch.records[0].is_deleted);
    assert!(batch.records[1].is_deleted);
}

#[tokio::test]
async fn pull_of_missing_table_fails() {
    let (server, store) = setup_store().await;

    Mock::given(method("GET"))
        .and(path("/v1/tables/budgets"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such table"))
        .mount(&server)
        .await;

    let err = store
        .pull(&identity("alice@example.com"), &table("budgets"), 0)
        .await
        .unwrap_err();
    assert!(format!("{err:#}").contains("Not found"));
}

#[tokio::test]
async fn push_sends_batch_and_reads_outcome() {
    let (server, store) = setup_store().await;
    let wallets = table("wallets");
    let accepted = PendingMutation::new(
        wallets.clone(),
        "w-1",
        MutationOp::Update,
        json!({ "balance": 80 }),
    );
    let rejected = PendingMutation::new(wallets.clone(), "w-2", MutationOp::Delete, json!({}));

    Mock::given(method("POST"))
        .and(path("/v1/tables/wallets/mutations"))
        .and(body_partial_json(json!({
            "mutations": [
                { "record_id": "w-1", "op": "update" },
                { "record_id": "w-2", "op": "delete" }
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "server_version": 7,
            "accepted": [accepted.id()],
            "rejected": [{ "id": rejected.id(), "reason": "remote version is newer" }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = store
        .push(
            &identity("alice@example.com"),
            &wallets,
            &[accepted.clone(), rejected.clone()],
        )
        .await
        .unwrap();
    assert_eq!(outcome.server_version, 7);
    assert_eq!(outcome.accepted, vec![*accepted.id()]);
    assert_eq!(outcome.rejected.len(), 1);
    assert_eq!(outcome.processed_ids().len(), 2);
}

#[tokio::test]
async fn push_with_malformed_response_fails() {
    let (server, store) = setup_store().await;

    Mock::given(method("POST"))
        .and(path("/v1/tables/wallets/mutations"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>ok</html>"))
        .mount(&server)
        .await;

    let mutation = PendingMutation::new(table("wallets"), "w-1", MutationOp::Insert, json!({}));
    let err = store
        .push(&identity("alice@example.com"), &table("wallets"), &[mutation])
        .await
        .unwrap_err();
    assert!(format!("{err:#}").contains("Invalid response"));
}
