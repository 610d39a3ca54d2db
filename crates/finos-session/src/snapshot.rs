//! Read-only view of the coordinator's state
//!
//! Observers receive a [`TransitionSnapshot`] through a `watch` channel every
//! time a step starts, fails, or completes. Snapshots are plain values; the
//! only way to change the session is through the coordinator.

use serde::Serialize;

use finos_core::domain::{
    Email, SaveOutcome, Transition, TransitionFailure, TransitionId, TransitionKind,
    TransitionStep,
};

/// State of the most recent transition and the active identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransitionSnapshot {
    pub transition_id: Option<TransitionId>,
    pub kind: Option<TransitionKind>,
    pub step: Option<TransitionStep>,
    pub step_label: Option<&'static str>,
    /// Steps entered so far, starting with `Checking`
    pub history: Vec<TransitionStep>,
    pub error: Option<TransitionFailure>,
    pub save_outcome: Option<SaveOutcome>,
    pub outgoing: Option<Email>,
    pub incoming: Option<Email>,
    /// Waiting at `Loading` for `retry_loading`
    pub parked: bool,
    pub cancelled: bool,
    /// Identity owning the cache right now
    pub active: Option<Email>,
    /// Set once a purge failed; no further transition will run
    pub fatal: Option<String>,
}

impl TransitionSnapshot {
    /// No transition has run yet
    pub fn idle(active: Option<Email>) -> Self {
        Self {
            transition_id: None,
            kind: None,
            step: None,
            step_label: None,
            history: Vec::new(),
            error: None,
            save_outcome: None,
            outgoing: None,
            incoming: None,
            parked: false,
            cancelled: false,
            active,
            fatal: None,
        }
    }

    pub fn of(transition: &Transition, active: Option<Email>, fatal: Option<String>) -> Self {
        Self {
            transition_id: Some(*transition.id()),
            kind: Some(transition.kind()),
            step: Some(transition.step()),
            step_label: Some(transition.step().label()),
            history: transition.history().to_vec(),
            error: transition.failure().cloned(),
            save_outcome: transition.save_outcome(),
            outgoing: transition.outgoing().map(|i| i.email().clone()),
            incoming: transition.incoming().map(|i| i.email().clone()),
            parked: transition.is_parked(),
            cancelled: transition.is_cancelled(),
            active,
            fatal,
        }
    }

    /// A transition is executing (not finished, failed, or cancelled)
    pub fn is_running(&self) -> bool {
        self.step.is_some_and(|s| s != TransitionStep::Complete)
            && self.error.is_none()
            && !self.cancelled
    }

    pub fn is_complete(&self) -> bool {
        self.step == Some(TransitionStep::Complete)
    }
}
