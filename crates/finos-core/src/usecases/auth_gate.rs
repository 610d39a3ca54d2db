//! Authentication gate
//!
//! Every session starts locked. The gate runs one verification attempt per
//! call against the biometric provider and never retries on its own; the
//! caller decides whether to prompt again or impose a timeout.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::domain::normalize_reason;
use crate::ports::{BiometricKind, IBiometricProvider};

/// Prompt passed to the platform verifier
const UNLOCK_PROMPT: &str = "Unlock FinOS";

/// Reason reported when the platform has no usable verifier
pub const REASON_UNAVAILABLE: &str = "biometric unavailable";

/// Reason reported when the user was not recognised
pub const REASON_VERIFICATION_FAILED: &str = "verification failed";

/// A rejected authentication attempt
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("authentication failed: {reason}")]
pub struct AuthFailure {
    pub reason: String,
}

impl AuthFailure {
    fn new(reason: impl AsRef<str>) -> Self {
        Self {
            reason: normalize_reason(reason),
        }
    }
}

/// Proof of a successful unlock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthGrant {
    pub method: BiometricKind,
    pub granted_at: DateTime<Utc>,
}

/// Gate that must be unlocked before any session is usable
pub struct AuthGate {
    provider: Arc<dyn IBiometricProvider>,
    lock_enabled: bool,
    unlocked: AtomicBool,
}

impl AuthGate {
    /// Creates a locked gate
    ///
    /// With `lock_enabled == false` every attempt succeeds without
    /// prompting.
    pub fn new(provider: Arc<dyn IBiometricProvider>, lock_enabled: bool) -> Self {
        Self {
            provider,
            lock_enabled,
            unlocked: AtomicBool::new(false),
        }
    }

    pub fn lock_enabled(&self) -> bool {
        self.lock_enabled
    }

    pub fn is_unlocked(&self) -> bool {
        !self.lock_enabled || self.unlocked.load(Ordering::SeqCst)
    }

    /// Re-locks the gate, e.g. when the app is backgrounded
    pub fn lock(&self) {
        if self.unlocked.swap(false, Ordering::SeqCst) {
            debug!("Authentication gate locked");
        }
    }

    /// Runs a single verification attempt
    pub async fn authenticate(&self) -> Result<AuthGrant, AuthFailure> {
        if !self.lock_enabled {
            self.unlocked.store(true, Ordering::SeqCst);
            return Ok(AuthGrant {
                method: BiometricKind::None,
                granted_at: Utc::now(),
            });
        }

        let availability = match self.provider.check_availability().await {
            Ok(availability) => availability,
            Err(e) => {
                warn!(error = %e, "Biometric availability check failed");
                return Err(AuthFailure::new(e.to_string()));
            }
        };

        if !availability.available {
            warn!("No biometric verifier available");
            return Err(AuthFailure::new(REASON_UNAVAILABLE));
        }

        match self.provider.verify_identity(UNLOCK_PROMPT).await {
            Ok(true) => {
                self.unlocked.store(true, Ordering::SeqCst);
                info!(method = ?availability.kind, "Authentication gate unlocked");
                Ok(AuthGrant {
                    method: availability.kind,
                    granted_at: Utc::now(),
                })
            }
            Ok(false) => {
                warn!("Biometric verification rejected");
                Err(AuthFailure::new(REASON_VERIFICATION_FAILED))
            }
            Err(e) => {
                warn!(error = %e, "Biometric verification errored");
                Err(AuthFailure::new(e.to_string()))
            }
        }
    }
}
