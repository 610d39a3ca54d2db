//! Logout command - Remove the signed-in identity from this device
//!
//! A normal logout saves pending changes first and is refused while they
//! cannot be saved. `--force` shows what would be lost, asks for
//! confirmation, and logs out anyway.

use std::sync::Arc;

use anyhow::Result;
use clap::Args;

use finos_core::usecases::AcknowledgedDataLoss;
use finos_session::TransitionError;

use crate::app::{read_secret, App};
use crate::commands::switch::spawn_cancel_on_ctrl_c;
use crate::commands::{follow_steps, report_error, report_snapshot};
use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Args)]
pub struct LogoutCommand {
    /// Log out even if unsaved changes will be lost
    #[arg(long)]
    pub force: bool,

    /// Do not ask for confirmation with --force
    #[arg(long, short = 'y', requires = "force")]
    pub yes: bool,
}

impl LogoutCommand {
    pub async fn execute(&self, app: &App, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format);

        if app.resume().await?.is_none() {
            formatter.info("Not signed in");
            return Ok(());
        }
        if !app.unlock(&*formatter).await {
            return Ok(());
        }

        let ack = if self.force {
            match self.confirm_data_loss(app, format).await? {
                Some(ack) => Some(ack),
                None => {
                    formatter.info("Logout aborted");
                    return Ok(());
                }
            }
        } else {
            None
        };

        let follower = (!format.is_json()).then(|| follow_steps(app.coordinator.subscribe()));
        let interrupt = spawn_cancel_on_ctrl_c(Arc::clone(&app.coordinator));

        let result = match ack {
            Some(ack) => app.coordinator.force_logout(ack).await,
            None => app.coordinator.request_logout().await,
        };

        interrupt.abort();
        if let Some(follower) = follower {
            follower.abort();
        }

        match result {
            Ok(snapshot) => report_snapshot(&snapshot, format, &*formatter),
            Err(e) => {
                report_error(&e, format, &*formatter);
                if matches!(e, TransitionError::OfflineBlocked { .. }) && !format.is_json() {
                    formatter.info("Use 'finos logout --force' to log out without saving.");
                }
            }
        }
        Ok(())
    }

    /// Shows the data loss warning and asks for confirmation
    ///
    /// `None` when the user declined.
    async fn confirm_data_loss(
        &self,
        app: &App,
        format: OutputFormat,
    ) -> Result<Option<AcknowledgedDataLoss>> {
        let formatter = get_formatter(format);

        let Some(warning) = app.coordinator.data_loss_warning().await? else {
            anyhow::bail!("No active session to log out");
        };

        if format.is_json() {
            formatter.print_json(&serde_json::json!({ "warning": warning }));
        } else {
            for line in warning.message() {
                formatter.warn(&line);
            }
        }

        if !self.yes {
            let answer = read_secret("Type 'yes' to continue")?;
            if answer.as_deref() != Some("yes") {
                return Ok(None);
            }
        }
        Ok(Some(warning.acknowledge()))
    }
}
