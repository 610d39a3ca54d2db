//! Keyring-backed unlock for platforms without biometrics
//!
//! The user enrolls an unlock secret which is kept in the OS credential
//! store (GNOME Keyring, KDE Wallet, macOS Keychain). Verification prompts
//! for the secret and compares it with the stored one.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use finos_core::ports::{BiometricAvailability, BiometricKind, IBiometricProvider};

/// Keyring service name for FinOS secrets
pub const KEYRING_SERVICE: &str = "finos";

/// Storage for a single secret
pub trait SecretStore: Send + Sync {
    fn get(&self) -> Result<Option<String>>;
    fn set(&self, secret: &str) -> Result<()>;
    /// Removes the secret; succeeds when nothing is stored
    fn delete(&self) -> Result<()>;
}

/// [`SecretStore`] entry in the system keyring
#[derive(Debug, Clone)]
pub struct KeyringSecret {
    service: String,
    account: String,
}

impl KeyringSecret {
    pub fn new(service: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            account: account.into(),
        }
    }

    /// Unlock secret of the local FinOS installation
    pub fn unlock_secret() -> Self {
        Self::new(KEYRING_SERVICE, "unlock")
    }

    fn entry(&self) -> Result<keyring::Entry> {
        keyring::Entry::new(&self.service, &self.account).context("Failed to create keyring entry")
    }
}

impl SecretStore for KeyringSecret {
    fn get(&self) -> Result<Option<String>> {
        match self.entry()?.get_password() {
            Ok(secret) => Ok(Some(secret)),
            Err(keyring::Error::NoEntry) => {
                debug!(account = %self.account, "No secret in keyring");
                Ok(None)
            }
            Err(e) => Err(anyhow::Error::new(e).context("Failed to read from keyring")),
        }
    }

    fn set(&self, secret: &str) -> Result<()> {
        self.entry()?
            .set_password(secret)
            .context("Failed to store secret in keyring")
    }

    fn delete(&self) -> Result<()> {
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(anyhow::Error::new(e).context("Failed to delete from keyring")),
        }
    }
}

/// Asks the user for the secret; `None` means the prompt was dismissed
pub type Prompter = Arc<dyn Fn(&str) -> Result<Option<String>> + Send + Sync>;

/// `IBiometricProvider` that verifies a keyring-held secret
pub struct KeyringCredentialProvider {
    store: Arc<dyn SecretStore>,
    prompter: Prompter,
}

impl KeyringCredentialProvider {
    pub fn new(store: Arc<dyn SecretStore>, prompter: Prompter) -> Self {
        Self { store, prompter }
    }

    /// Stores a new unlock secret, replacing any previous one
    pub fn enroll(&self, secret: &str) -> Result<()> {
        if secret.is_empty() {
            anyhow::bail!("Unlock secret must not be empty");
        }
        self.store.set(secret)?;
        info!("Enrolled unlock secret");
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        self.store.delete()?;
        info!("Cleared unlock secret");
        Ok(())
    }
}

#[async_trait::async_trait]
impl IBiometricProvider for KeyringCredentialProvider {
    async fn check_availability(&self) -> Result<BiometricAvailability> {
        Ok(match self.store.get()? {
            Some(_) => BiometricAvailability {
                available: true,
                kind: BiometricKind::Credential,
            },
            None => BiometricAvailability::unavailable(),
        })
    }

    async fn verify_identity(&self, prompt: &str) -> Result<bool> {
        let Some(expected) = self.store.get()? else {
            warn!("Verification requested with no enrolled secret");
            return Ok(false);
        };
        let Some(given) = (self.prompter)(prompt)? else {
            debug!("Unlock prompt dismissed");
            return Ok(false);
        };
        Ok(constant_time_eq(given.as_bytes(), expected.as_bytes()))
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
