//! Health endpoint probe

use std::time::Duration;

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use finos_core::ports::INetworkMonitor;
use finos_remote::HttpReachability;

#[tokio::test]
async fn healthy_backend_is_online() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/health"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let probe = HttpReachability::new(&server.uri(), Duration::from_secs(2)).unwrap();
    assert!(probe.is_online().await);
}

#[tokio::test]
async fn failing_health_check_is_offline() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/health"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let probe = HttpReachability::new(&server.uri(), Duration::from_secs(2)).unwrap();
    assert!(!probe.is_online().await);
}

#[tokio::test]
async fn slow_backend_is_offline() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/health"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;

    let probe = HttpReachability::new(&server.uri(), Duration::from_millis(100)).unwrap();
    assert!(!probe.is_online().await);
}

#[tokio::test]
async fn unreachable_backend_is_offline() {
    let probe = HttpReachability::new("http://127.0.0.1:9", Duration::from_millis(200)).unwrap();
    assert!(!probe.is_online().await);
}
