//! Watch command - Keep the signed-in identity in sync until interrupted
//!
//! Runs the [`SyncScheduler`] in the foreground: a pass every poll
//! interval while online, and one as soon as connectivity returns.
//! Ctrl-C stops the loop after the current pass.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use finos_sync::scheduler::DEFAULT_PROBE_INTERVAL;
use finos_sync::{SyncScheduler, SyncTrigger};

use crate::app::App;
use crate::commands::sync::run_pass;
use crate::output::{get_formatter, plural, OutputFormat};

#[derive(Debug, Args)]
pub struct WatchCommand {
    /// Seconds between periodic passes (overrides the configuration)
    #[arg(long)]
    pub interval: Option<u64>,

    /// Run one pass immediately on start
    #[arg(long)]
    pub now: bool,
}

impl WatchCommand {
    pub async fn execute(&self, app: &App, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format);

        let Some(identity) = app.resume().await? else {
            formatter.error("Not signed in. Run 'finos switch <email>' first.");
            return Ok(());
        };

        let poll = Duration::from_secs(
            self.interval
                .unwrap_or(app.config.sync.poll_interval_secs)
                .max(1),
        );
        let (mut scheduler, handle) =
            SyncScheduler::new(app.network.clone(), poll, DEFAULT_PROBE_INTERVAL);

        let cancel = CancellationToken::new();
        let stop = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupt received, stopping");
                stop.cancel();
            }
        });

        formatter.success(&format!(
            "Watching {} (every {}s, Ctrl-C to stop)",
            identity.email(),
            poll.as_secs()
        ));
        if self.now {
            handle.request_sync();
        }

        let coordinator = Arc::clone(&app.coordinator);
        let formatter = &*formatter;
        scheduler
            .run(cancel, |trigger: SyncTrigger| {
                let coordinator = Arc::clone(&coordinator);
                async move {
                    let Some(session) = coordinator.active_sync().await else {
                        warn!(?trigger, "No active session, skipping pass");
                        return;
                    };
                    match run_pass(&session, trigger.is_forced()).await {
                        Ok(summary) => {
                            if format.is_json() {
                                formatter.print_json(&serde_json::json!({
                                    "trigger": trigger,
                                    "pushed": summary.flush.pushed,
                                    "rejected": summary.flush.rejected,
                                    "remaining": summary.flush.remaining,
                                    "unfinished": summary.unfinished,
                                    "duration_ms": summary.duration_ms,
                                }));
                            } else if summary.unfinished.is_empty() {
                                formatter.info(&format!(
                                    "[{}] synced, {} uploaded",
                                    chrono::Local::now().format("%H:%M:%S"),
                                    plural(summary.flush.pushed, "change")
                                ));
                            } else {
                                formatter.warn(&format!(
                                    "{} not loaded",
                                    plural(summary.unfinished.len(), "table")
                                ));
                            }
                        }
                        Err(e) => {
                            error!(error = %e, ?trigger, "Sync pass failed");
                            formatter.error(&format!("Sync failed: {:#}", e));
                        }
                    }
                }
            })
            .await;

        formatter.success("Stopped");
        Ok(())
    }
}
