//! Biometric provider port (driven/secondary port)
//!
//! Abstracts the platform's strong-authentication facility (fingerprint,
//! face, or a keyring-held secret on desktops).

use serde::{Deserialize, Serialize};

/// Kind of verifier offered by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BiometricKind {
    Fingerprint,
    Face,
    /// A secret held in the OS credential store
    Credential,
    None,
}

/// What the platform can verify right now
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BiometricAvailability {
    pub available: bool,
    pub kind: BiometricKind,
}

impl BiometricAvailability {
    pub fn unavailable() -> Self {
        Self {
            available: false,
            kind: BiometricKind::None,
        }
    }
}

/// Port trait for strong user verification
#[async_trait::async_trait]
pub trait IBiometricProvider: Send + Sync {
    /// Reports whether a verifier is enrolled and usable
    async fn check_availability(&self) -> anyhow::Result<BiometricAvailability>;

    /// Prompts the user once; `Ok(false)` means the user was not verified
    async fn verify_identity(&self, prompt: &str) -> anyhow::Result<bool>;
}
