//! Switch command - Sign in, replacing whoever owns the local cache
//!
//! `finos switch <email>`:
//! 1. Resumes the stored session and unlocks the gate
//! 2. Resolves the identity registered under `email`
//! 3. Runs first login, switch, or nothing, depending on who owns the cache
//! 4. Retries `Loading` up to `--retries` times if the new data could not be
//!    downloaded
//!
//! Ctrl-C while the transition is still checking cancels it.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use tracing::{info, warn};

use finos_core::domain::{Email, SwitchDetection};
use finos_core::ports::IRemoteStore;
use finos_session::{SessionTransitionCoordinator, TransitionError};

use crate::app::App;
use crate::commands::{follow_steps, report_error, report_snapshot};
use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Args)]
pub struct SwitchCommand {
    /// Email of the identity to sign in
    pub email: String,

    /// Extra attempts at loading the new identity's data
    #[arg(long, default_value = "0")]
    pub retries: u32,
}

impl SwitchCommand {
    pub async fn execute(&self, app: &App, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format);

        let email = Email::new(self.email.trim().to_string())
            .with_context(|| format!("Invalid email address: '{}'", self.email))?;

        app.resume().await?;
        if !app.unlock(&*formatter).await {
            return Ok(());
        }

        let identity = app
            .remote
            .resolve_identity(&email)
            .await
            .context("Could not look up the identity on the server")?;
        info!(email = %identity.email(), "Resolved identity");

        let follower = (!format.is_json()).then(|| follow_steps(app.coordinator.subscribe()));
        let interrupt = spawn_cancel_on_ctrl_c(Arc::clone(&app.coordinator));

        let mut result = app
            .coordinator
            .sign_in(identity)
            .await
            .map(|outcome| {
                if outcome.detection == SwitchDetection::SameUser && !format.is_json() {
                    formatter.info(&format!("{} is already signed in", email));
                }
                outcome.snapshot
            });

        let mut attempt = 0;
        while matches!(result, Err(TransitionError::LoadFailed(_))) && attempt < self.retries {
            attempt += 1;
            warn!(attempt, "Loading failed, retrying");
            formatter.warn(&format!("Loading failed, retrying ({}/{})", attempt, self.retries));
            result = app.coordinator.retry_loading().await;
        }

        interrupt.abort();
        if let Some(follower) = follower {
            follower.abort();
        }

        match result {
            Ok(snapshot) => report_snapshot(&snapshot, format, &*formatter),
            Err(e) => report_error(&e, format, &*formatter),
        }
        Ok(())
    }
}

/// Cancels the running transition on Ctrl-C
pub(crate) fn spawn_cancel_on_ctrl_c(
    coordinator: Arc<SessionTransitionCoordinator>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            match coordinator.cancel() {
                Ok(true) => info!("Cancellation requested"),
                Ok(false) => info!("Nothing to cancel"),
                Err(e) => eprintln!("\u{26a0} Warning: {}", e),
            }
        }
    })
}
