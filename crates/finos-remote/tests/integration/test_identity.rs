//! Identity lookup by email

use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

use finos_core::domain::{Email, Role};
use finos_core::ports::IRemoteStore;

use crate::common::setup_store;

#[tokio::test]
async fn resolves_identity_by_email() {
    let (server, store) = setup_store().await;

    Mock::given(method("GET"))
        .and(path("/v1/identities"))
        .and(query_param("email", "bob@example.com"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "6f1c1f0e-8f5e-4d55-9a43-0c1f3f0d2b11",
            "email": "bob@example.com",
            "display_name": "Bob",
            "role": "admin"
        })))
        .mount(&server)
        .await;

    let email = Email::new("bob@example.com".to_string()).unwrap();
    let identity = store.resolve_identity(&email).await.unwrap();
    assert_eq!(identity.email(), &email);
    assert_eq!(identity.display_name(), "Bob");
    assert_eq!(identity.role(), Role::Admin);
    assert!(!identity.is_super_admin());
}

#[tokio::test]
async fn unknown_email_fails_with_context() {
    let (server, store) = setup_store().await;

    Mock::given(method("GET"))
        .and(path("/v1/identities"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let email = Email::new("ghost@example.com".to_string()).unwrap();
    let err = store.resolve_identity(&email).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "Failed to resolve identity for ghost@example.com"
    );
}

#[tokio::test]
async fn rejected_api_key_is_unauthorized() {
    let (server, store) = setup_store().await;

    Mock::given(method("GET"))
        .and(path("/v1/identities"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
        .mount(&server)
        .await;

    let email = Email::new("bob@example.com".to_string()).unwrap();
    let err = store.resolve_identity(&email).await.unwrap_err();
    assert!(format!("{err:#}").contains("Unauthorized"));
}
