//! Network monitor port (driven/secondary port)

/// Port trait for connectivity checks
///
/// Implementations should answer quickly; a probe that cannot complete is
/// reported as offline.
#[async_trait::async_trait]
pub trait INetworkMonitor: Send + Sync {
    async fn is_online(&self) -> bool;
}
