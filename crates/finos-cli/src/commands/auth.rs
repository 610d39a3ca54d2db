//! Unlock and enroll commands
//!
//! `finos unlock` checks that the configured verifier accepts the user.
//! `finos enroll` stores the unlock secret in the system keyring, or
//! removes it with `--clear`.

use anyhow::Result;
use clap::Args;
use tracing::info;

use finos_core::ports::IBiometricProvider;

use crate::app::{read_secret, App};
use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Args)]
pub struct UnlockCommand {}

impl UnlockCommand {
    pub async fn execute(&self, app: &App, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format);
        app.resume().await?;

        if !app.config.security.biometric_lock {
            formatter.info("The unlock gate is disabled in the configuration");
        }

        match app.coordinator.unlock().await {
            Ok(grant) => {
                if format.is_json() {
                    formatter.print_json(&serde_json::json!({
                        "success": true,
                        "method": grant.method,
                        "granted_at": grant.granted_at.to_rfc3339(),
                    }));
                } else {
                    formatter.success("Unlocked");
                }
            }
            Err(e) => {
                if format.is_json() {
                    formatter.print_json(&serde_json::json!({
                        "success": false,
                        "error": e.to_string(),
                    }));
                } else {
                    formatter.error(&e.to_string());
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Args)]
pub struct EnrollCommand {
    /// Remove the stored unlock secret instead
    #[arg(long)]
    pub clear: bool,
}

impl EnrollCommand {
    pub async fn execute(&self, app: &App, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format);

        if self.clear {
            app.credentials.clear()?;
            formatter.success("Unlock secret removed");
            return Ok(());
        }

        if app.credentials.check_availability().await?.available {
            formatter.info("Replacing the existing unlock secret");
        }

        let Some(first) = read_secret("New unlock secret")? else {
            formatter.error("No secret entered");
            return Ok(());
        };
        let second = read_secret("Repeat unlock secret")?;
        if second.as_deref() != Some(first.as_str()) {
            formatter.error("Secrets do not match");
            return Ok(());
        }

        app.credentials.enroll(&first)?;
        info!(service = %app.config.security.keyring_service, "Unlock secret enrolled");
        formatter.success("Unlock secret stored in the system keyring");
        Ok(())
    }
}
