//! Audit command - View the audit trail
//!
//! Lists decisions, transitions, cleanups and sync events recorded on this
//! device, newest first. The trail survives logouts.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use clap::Args;
use tracing::info;

use finos_core::ports::ILocalStore;

use crate::app::App;
use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Args)]
pub struct AuditCommand {
    /// Show entries since this time (e.g., "1h", "2d", "2024-01-01")
    #[arg(long)]
    pub since: Option<String>,

    /// Only show actions containing this text (e.g., "user_switch")
    #[arg(long)]
    pub action: Option<String>,

    /// Only show failed entries
    #[arg(long)]
    pub failed: bool,

    /// Maximum number of entries to show
    #[arg(long, default_value = "50")]
    pub limit: u32,
}

impl AuditCommand {
    pub async fn execute(&self, app: &App, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format);

        let since = match &self.since {
            Some(since_str) => parse_since(since_str).with_context(|| {
                format!(
                    "Invalid --since value: '{}'. Expected formats: '1h', '30m', '2d', '1w', '2024-01-01', '2024-01-01T12:00:00'",
                    since_str
                )
            })?,
            None => Utc::now() - chrono::Duration::days(7),
        };
        info!(since = %since, "Querying audit entries");

        let entries = app
            .store
            .get_audit_since(since, self.limit)
            .await
            .context("Failed to query audit entries")?;

        let shown: Vec<_> = entries
            .iter()
            .filter(|entry| {
                self.action
                    .as_deref()
                    .map_or(true, |a| entry.action().to_string().contains(a))
            })
            .filter(|entry| !self.failed || entry.result().is_failed())
            .collect();

        if format.is_json() {
            formatter.print_json(&serde_json::json!({
                "since": since.to_rfc3339(),
                "limit": self.limit,
                "count": shown.len(),
                "entries": shown,
            }));
            return Ok(());
        }

        if shown.is_empty() {
            formatter.info("No audit entries found for the specified criteria.");
            return Ok(());
        }

        formatter.success(&format!("Audit Log ({} entries)", shown.len()));
        formatter.info("");
        formatter.info("  Timestamp           Action               Result   Details");
        formatter.info("  ------------------- -------------------- -------- -------");
        for entry in &shown {
            let result = if entry.result().is_success() {
                "OK      "
            } else {
                "FAILED  "
            };
            formatter.info(&format!(
                "  {} {:<20} {} {}",
                entry.timestamp().format("%Y-%m-%d %H:%M:%S"),
                entry.action().to_string(),
                result,
                format_details(entry.details())
            ));
        }

        if shown.len() as u32 >= self.limit {
            formatter.info("");
            formatter.info(&format!(
                "Showing {} entries (limit). Use --limit to show more.",
                self.limit
            ));
        }
        Ok(())
    }
}

/// Parses `--since` as a relative ("30m", "1h", "2d", "1w") or absolute time
fn parse_since(input: &str) -> Result<DateTime<Utc>> {
    let input = input.trim();

    if let Some(duration) = parse_relative_duration(input) {
        return Ok(Utc::now() - duration);
    }
    if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        let datetime = date
            .and_hms_opt(0, 0, 0)
            .context("Failed to create datetime from date")?;
        return Ok(DateTime::<Utc>::from_naive_utc_and_offset(datetime, Utc));
    }
    if let Ok(datetime) = NaiveDateTime::parse_from_str(input, "%Y-%m-%dT%H:%M:%S") {
        return Ok(DateTime::<Utc>::from_naive_utc_and_offset(datetime, Utc));
    }

    anyhow::bail!("Could not parse '{}' as a time", input)
}

fn parse_relative_duration(input: &str) -> Option<chrono::Duration> {
    if input.len() < 2 {
        return None;
    }
    let (num_str, unit) = input.split_at(input.len() - 1);
    let num: i64 = num_str.parse().ok()?;
    match unit {
        "m" => Some(chrono::Duration::minutes(num)),
        "h" => Some(chrono::Duration::hours(num)),
        "d" => Some(chrono::Duration::days(num)),
        "w" => Some(chrono::Duration::weeks(num)),
        _ => None,
    }
}

/// One-line summary of the JSON details of an entry
fn format_details(details: &serde_json::Value) -> String {
    const KEYS: [&str; 5] = ["outgoing", "incoming", "reason", "table", "message"];

    match details {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => truncate(s, 40),
        serde_json::Value::Object(map) => {
            let parts: Vec<String> = KEYS
                .iter()
                .filter_map(|key| {
                    map.get(*key).map(|v| match v.as_str() {
                        Some(s) => format!("{}={}", key, s),
                        None => format!("{}={}", key, v),
                    })
                })
                .collect();
            if parts.is_empty() {
                map.iter()
                    .next()
                    .map(|(k, v)| truncate(&format!("{}={}", k, v), 40))
                    .unwrap_or_default()
            } else {
                truncate(&parts.join(", "), 60)
            }
        }
        other => truncate(&other.to_string(), 40),
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_chars - 3).collect();
        format!("{}...", head)
    }
}
