//! Backend reachability probe
//!
//! "Online" means the FinOS backend answered its health endpoint with a
//! success status within the probe timeout. Interface state alone is not
//! trusted: a captive portal or a dead upstream looks connected.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use tracing::debug;
use url::Url;

use finos_core::ports::INetworkMonitor;

/// Default probe timeout
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(3);

const HEALTH_PATH: &str = "v1/health";

/// `INetworkMonitor` that probes `GET {base}/v1/health`
#[derive(Debug, Clone)]
pub struct HttpReachability {
    client: Client,
    health_url: Url,
}

impl HttpReachability {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let mut base = Url::parse(base_url)
            .with_context(|| format!("Invalid backend URL: {base_url}"))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let health_url = base
            .join(HEALTH_PATH)
            .context("Failed to build health check URL")?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client, health_url })
    }

    pub fn health_url(&self) -> &Url {
        &self.health_url
    }
}

#[async_trait::async_trait]
impl INetworkMonitor for HttpReachability {
    async fn is_online(&self) -> bool {
        match self.client.get(self.health_url.clone()).send().await {
            Ok(response) => {
                let online = response.status().is_success();
                debug!(status = %response.status(), online, "Reachability probe");
                online
            }
            Err(e) => {
                debug!(error = %e, "Reachability probe failed");
                false
            }
        }
    }
}
