//! Adapter wiring shared by every command
//!
//! 1. Loads configuration
//! 2. Opens the local database
//! 3. Creates the backend, reachability and unlock adapters
//! 4. Builds the transition coordinator and resumes the stored identity

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

use finos_cache::{DatabasePool, SqliteLocalStore};
use finos_core::config::Config;
use finos_core::domain::Identity;
use finos_core::usecases::AuthGate;
use finos_remote::reachability::DEFAULT_PROBE_TIMEOUT;
use finos_remote::{
    HttpReachability, KeyringCredentialProvider, KeyringSecret, RestClient, RestRemoteStore,
};
use finos_session::SessionTransitionCoordinator;
use finos_sync::SyncContext;

use crate::output::OutputFormatter;

/// Account name of the unlock secret inside the keyring service
const UNLOCK_ACCOUNT: &str = "unlock";

/// Resolves the configuration file path from `--config` or the default
pub fn config_path(explicit: Option<&str>) -> PathBuf {
    explicit
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_path)
}

/// Fully wired adapters for one CLI invocation
pub struct App {
    pub config: Config,
    pub store: Arc<SqliteLocalStore>,
    pub remote: Arc<RestRemoteStore>,
    pub network: Arc<HttpReachability>,
    pub credentials: Arc<KeyringCredentialProvider>,
    pub coordinator: Arc<SessionTransitionCoordinator>,
}

impl App {
    pub async fn open(config_path: &Path) -> Result<Self> {
        let config = Config::load_or_default(config_path);
        info!(config_path = %config_path.display(), "Loaded configuration");

        let pool = DatabasePool::new(&config.storage.database_path)
            .await
            .context("Failed to open database")?;
        let store = Arc::new(SqliteLocalStore::new(pool.pool().clone()));

        let mut client = RestClient::new(
            config.remote.base_url.clone(),
            Duration::from_secs(config.remote.timeout_secs),
        )?;
        if let Some(key) = &config.remote.api_key {
            client = client.with_api_key(key.clone());
        }
        let remote = Arc::new(RestRemoteStore::new(client));
        let network = Arc::new(HttpReachability::new(
            &config.remote.base_url,
            DEFAULT_PROBE_TIMEOUT,
        )?);

        let secret = KeyringSecret::new(config.security.keyring_service.clone(), UNLOCK_ACCOUNT);
        let credentials = Arc::new(KeyringCredentialProvider::new(
            Arc::new(secret),
            Arc::new(|prompt: &str| read_secret(prompt)),
        ));
        let auth = Arc::new(AuthGate::new(
            credentials.clone(),
            config.security.biometric_lock,
        ));

        let catalog = config
            .table_catalog()
            .context("Invalid table configuration")?;
        let ctx = SyncContext::new(remote.clone(), store.clone(), catalog)
            .with_max_concurrent_tables(config.sync.max_concurrent_tables);
        let coordinator = Arc::new(SessionTransitionCoordinator::new(ctx, network.clone(), auth));

        Ok(Self {
            config,
            store,
            remote,
            network,
            credentials,
            coordinator,
        })
    }

    /// Reopens the session of the identity stored on this device
    pub async fn resume(&self) -> Result<Option<Identity>> {
        let identity = self
            .coordinator
            .resume_active()
            .await
            .context("Failed to resume the stored session")?;
        if let Some(identity) = &identity {
            info!(email = %identity.email(), "Resumed session");
        }
        Ok(identity)
    }

    /// Unlocks the gate, prompting the user when the lock is enabled
    ///
    /// Returns `false` after reporting the failure.
    pub async fn unlock(&self, formatter: &dyn OutputFormatter) -> bool {
        match self.coordinator.unlock().await {
            Ok(_) => true,
            Err(e) => {
                formatter.error(&e.to_string());
                if self.config.security.biometric_lock {
                    formatter.info("Run 'finos enroll' to set an unlock secret.");
                }
                false
            }
        }
    }
}

/// Prompts on stderr and reads one line from stdin
///
/// An empty line counts as a dismissed prompt.
pub fn read_secret(prompt: &str) -> Result<Option<String>> {
    let mut stderr = std::io::stderr();
    write!(stderr, "{}: ", prompt).context("Failed to write prompt")?;
    stderr.flush().context("Failed to flush prompt")?;

    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read from stdin")?;
    let secret = line.trim_end_matches(['\r', '\n']).to_string();
    Ok((!secret.is_empty()).then_some(secret))
}
