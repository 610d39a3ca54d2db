//! Status command - Show who owns the local cache and how fresh it is
//!
//! Displays:
//! 1. The signed-in identity
//! 2. Unsaved changes grouped by kind
//! 3. Per-table sync state and local revision
//! 4. Whether the backend is reachable

use anyhow::Result;
use clap::Args;

use finos_core::ports::INetworkMonitor;

use crate::app::App;
use crate::output::{get_formatter, plural, OutputFormat};

#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Skip the backend reachability probe
    #[arg(long)]
    pub offline: bool,
}

impl StatusCommand {
    pub async fn execute(&self, app: &App, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format);

        let identity = app.resume().await?;
        let online = if self.offline {
            None
        } else {
            Some(app.network.is_online().await)
        };

        let Some(identity) = identity else {
            if format.is_json() {
                formatter.print_json(&serde_json::json!({
                    "signed_in": false,
                    "online": online,
                }));
            } else {
                formatter.info("Not signed in. Run 'finos switch <email>' to sign in.");
            }
            return Ok(());
        };

        let Some(session) = app.coordinator.active_sync().await else {
            formatter.error("Stored identity has no session");
            return Ok(());
        };
        let pending = session.pending().await?;
        let summary = pending.summarize();
        let versions = session.versions().await;
        let progress = session.status();

        if format.is_json() {
            formatter.print_json(&serde_json::json!({
                "signed_in": true,
                "identity": {
                    "email": identity.email(),
                    "display_name": identity.display_name(),
                    "role": identity.role(),
                },
                "online": online,
                "unsaved": summary,
                "versions": versions,
                "tables": progress.tables,
            }));
            return Ok(());
        }

        formatter.success(&format!(
            "Signed in as {} ({})",
            identity.email(),
            identity.display_name()
        ));
        match online {
            Some(true) => formatter.info("Backend:  reachable"),
            Some(false) => formatter.info("Backend:  unreachable"),
            None => {}
        }

        if summary.total() == 0 {
            formatter.info("Unsaved:  none");
        } else {
            formatter.info(&format!("Unsaved:  {}", plural(summary.total(), "change")));
            if summary.transactions > 0 {
                formatter.info(&format!("  {}", plural(summary.transactions, "transaction")));
            }
            if summary.wallets > 0 {
                formatter.info(&format!("  {}", plural(summary.wallets, "wallet change")));
            }
            if summary.plans > 0 {
                formatter.info(&format!("  {}", plural(summary.plans, "plan change")));
            }
            if summary.other > 0 {
                formatter.info(&format!("  {}", plural(summary.other, "other change")));
            }
        }

        formatter.info("");
        formatter.info("  Table                    Local    Server   Status");
        formatter.info("  ------------------------ -------- -------- ----------");
        for entry in versions.entries() {
            let status = progress
                .tables
                .iter()
                .find(|s| s.table() == entry.table())
                .map(|s| s.status().to_string())
                .unwrap_or_else(|| "-".to_string());
            formatter.info(&format!(
                "  {:<24} {:>8} {:>8} {}",
                entry.table().as_str(),
                entry.local_version(),
                entry.server_version(),
                status
            ));
        }
        Ok(())
    }
}
