//! CLI subcommands
//!
//! Every command loads the configuration through [`crate::app::App`] and
//! reports through an [`OutputFormatter`](crate::output::OutputFormatter).

pub mod audit;
pub mod auth;
pub mod config;
pub mod logout;
pub mod status;
pub mod switch;
pub mod sync;
pub mod watch;

use finos_core::domain::{SaveOutcome, TransitionStep};
use finos_session::{TransitionError, TransitionSnapshot};
use tokio::sync::watch as tokio_watch;
use tokio::task::JoinHandle;

use crate::output::{plural, OutputFormatter, OutputFormat};

/// Prints each new step of a running transition until the channel closes
///
/// Only used for human output; JSON callers print the final snapshot.
pub(crate) fn follow_steps(mut rx: tokio_watch::Receiver<TransitionSnapshot>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut printed: Option<TransitionStep> = None;
        while rx.changed().await.is_ok() {
            let snapshot = rx.borrow_and_update().clone();
            if snapshot.step != printed && snapshot.error.is_none() && !snapshot.cancelled {
                if let Some(label) = snapshot.step_label {
                    println!("  \u{2192} {}", label);
                }
                printed = snapshot.step;
            }
        }
    })
}

/// Reports the final state of a transition
pub(crate) fn report_snapshot(
    snapshot: &TransitionSnapshot,
    format: OutputFormat,
    formatter: &dyn OutputFormatter,
) {
    if format.is_json() {
        formatter.print_json(&serde_json::to_value(snapshot).unwrap_or_default());
        return;
    }

    if let Some(failure) = &snapshot.error {
        formatter.error(&format!(
            "{} failed during {}: {}",
            snapshot.kind.map(|k| k.to_string()).unwrap_or_default(),
            failure.step,
            failure.reason
        ));
        if snapshot.parked {
            formatter.info("Loading can be retried with --retries.");
        }
        return;
    }
    if snapshot.cancelled {
        formatter.warn("Transition cancelled");
        return;
    }

    match snapshot.save_outcome {
        Some(SaveOutcome::Flushed { pushed, rejected }) => {
            formatter.info(&format!("Saved {}", plural(pushed, "change")));
            if rejected > 0 {
                formatter.warn(&format!(
                    "{} rejected by the server",
                    plural(rejected, "change")
                ));
            }
        }
        Some(SaveOutcome::Abandoned { pending }) => {
            formatter.warn(&format!("Discarded {}", plural(pending, "unsaved change")));
        }
        Some(SaveOutcome::NothingPending) | None => {}
    }

    match &snapshot.active {
        Some(email) => formatter.success(&format!("Signed in as {}", email)),
        None => formatter.success("Signed out"),
    }
}

/// Reports a rejected request
pub(crate) fn report_error(
    err: &TransitionError,
    format: OutputFormat,
    formatter: &dyn OutputFormatter,
) {
    if format.is_json() {
        formatter.print_json(&serde_json::json!({
            "success": false,
            "kind": err.kind(),
            "error": err.to_string(),
        }));
    } else {
        formatter.error(&err.to_string());
        if err.is_fatal() {
            formatter.info("Local data may be incomplete. Reinstall or clear the data directory.");
        }
    }
}
