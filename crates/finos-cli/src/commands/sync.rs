//! Sync command - Push unsaved changes and pull server updates
//!
//! `finos sync` pushes every queued mutation, then pulls the tables whose
//! server revision moved. `--force` pulls every table regardless.

use std::time::Instant;

use anyhow::Result;
use clap::Args;
use tracing::info;

use finos_core::domain::{TableName, TableSyncState};
use finos_sync::session::unfinished_tables;
use finos_sync::{FlushReport, SyncSession};

use crate::app::App;
use crate::output::{get_formatter, plural, OutputFormat};

#[derive(Debug, Args)]
pub struct SyncCommand {
    /// Pull every table, not only the ones that changed on the server
    #[arg(long)]
    pub force: bool,
}

/// Result of one push-then-pull pass
#[derive(Debug)]
pub(crate) struct PassSummary {
    pub flush: FlushReport,
    pub tables: Vec<TableSyncState>,
    pub unfinished: Vec<TableName>,
    pub duration_ms: u64,
}

/// Pushes pending mutations, then pulls
pub(crate) async fn run_pass(session: &SyncSession, force: bool) -> Result<PassSummary> {
    let started = Instant::now();
    let flush = session.flush_pending().await?;
    let tables = if force {
        session.force_sync_now().await?
    } else {
        session.sync_all().await?
    };
    let unfinished = unfinished_tables(&tables).into_iter().collect();
    let duration_ms = started.elapsed().as_millis() as u64;
    info!(
        pushed = flush.pushed,
        rejected = flush.rejected,
        tables = tables.len(),
        duration_ms,
        "Sync pass finished"
    );
    Ok(PassSummary {
        flush,
        tables,
        unfinished,
        duration_ms,
    })
}

impl SyncCommand {
    pub async fn execute(&self, app: &App, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format);

        if app.resume().await?.is_none() {
            formatter.error("Not signed in. Run 'finos switch <email>' first.");
            return Ok(());
        }
        let Some(session) = app.coordinator.active_sync().await else {
            formatter.error("Stored identity has no session");
            return Ok(());
        };

        formatter.info("Starting synchronization...");
        let summary = run_pass(&session, self.force).await?;

        if format.is_json() {
            formatter.print_json(&serde_json::json!({
                "pushed": summary.flush.pushed,
                "rejected": summary.flush.rejected,
                "remaining": summary.flush.remaining,
                "tables": summary.tables,
                "unfinished": summary.unfinished,
                "duration_ms": summary.duration_ms,
            }));
            return Ok(());
        }

        let duration_display = if summary.duration_ms >= 1000 {
            format!("{:.1}s", summary.duration_ms as f64 / 1000.0)
        } else {
            format!("{}ms", summary.duration_ms)
        };

        if summary.unfinished.is_empty() && summary.flush.is_complete() {
            formatter.success(&format!("Sync completed in {}", duration_display));
        } else {
            formatter.warn(&format!("Sync finished with problems in {}", duration_display));
        }
        if summary.flush.pushed > 0 {
            formatter.info(&format!("Uploaded:   {}", plural(summary.flush.pushed, "change")));
        }
        if summary.flush.rejected > 0 {
            formatter.info(&format!(
                "Rejected:   {} (server copy kept)",
                plural(summary.flush.rejected, "change")
            ));
        }
        if summary.flush.remaining > 0 {
            formatter.info(&format!(
                "Unsaved:    {}",
                plural(summary.flush.remaining, "change")
            ));
        }
        formatter.info(&format!("Checked:    {}", plural(summary.tables.len(), "table")));
        for table in &summary.unfinished {
            let reason = summary
                .tables
                .iter()
                .find(|s| s.table() == table)
                .and_then(|s| s.last_result())
                .unwrap_or("not loaded");
            formatter.info(&format!("  - {}: {}", table, reason));
        }
        Ok(())
    }
}
