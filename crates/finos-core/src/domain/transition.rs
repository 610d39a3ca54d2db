//! Session transition state machine
//!
//! A [`Transition`] moves the cache from one identity to another (or to
//! none) through the strictly ordered steps
//! `Checking -> Saving -> Cleaning -> Loading -> Complete`. Steps are never
//! skipped or revisited; the only way back to `Checking` is a new
//! transition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::{DomainError, ErrorKind};
use super::identity::Identity;
use super::newtypes::TransitionId;

/// One step of a session transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionStep {
    Checking,
    Saving,
    Cleaning,
    Loading,
    Complete,
}

impl TransitionStep {
    /// All steps in execution order
    pub const ORDER: [TransitionStep; 5] = [
        TransitionStep::Checking,
        TransitionStep::Saving,
        TransitionStep::Cleaning,
        TransitionStep::Loading,
        TransitionStep::Complete,
    ];

    /// The step that follows this one, or `None` after `Complete`
    pub fn next(&self) -> Option<TransitionStep> {
        match self {
            TransitionStep::Checking => Some(TransitionStep::Saving),
            TransitionStep::Saving => Some(TransitionStep::Cleaning),
            TransitionStep::Cleaning => Some(TransitionStep::Loading),
            TransitionStep::Loading => Some(TransitionStep::Complete),
            TransitionStep::Complete => None,
        }
    }

    /// Zero-based position in [`TransitionStep::ORDER`]
    pub fn ordinal(&self) -> usize {
        *self as usize
    }

    /// Progress label shown while the step runs
    pub fn label(&self) -> &'static str {
        match self {
            TransitionStep::Checking => "Verifying security",
            TransitionStep::Saving => "Uploading pending changes",
            TransitionStep::Cleaning => "Clearing local storage",
            TransitionStep::Loading => "Downloading your data",
            TransitionStep::Complete => "Complete",
        }
    }
}

impl std::fmt::Display for TransitionStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TransitionStep::Checking => "checking",
            TransitionStep::Saving => "saving",
            TransitionStep::Cleaning => "cleaning",
            TransitionStep::Loading => "loading",
            TransitionStep::Complete => "complete",
        };
        write!(f, "{}", s)
    }
}

/// What a transition is doing to the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    /// Replace the current identity with another one
    Switch,
    /// Remove the current identity, leaving no session
    Logout,
    /// Logout that proceeds even if pending data cannot be saved
    ForcedLogout,
    /// Install the first identity on an empty cache
    FirstLogin,
}

impl TransitionKind {
    /// Destructive transitions purge an outgoing identity
    pub fn is_destructive(&self) -> bool {
        !matches!(self, TransitionKind::FirstLogin)
    }
}

impl std::fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TransitionKind::Switch => "switch",
            TransitionKind::Logout => "logout",
            TransitionKind::ForcedLogout => "forced_logout",
            TransitionKind::FirstLogin => "first_login",
        };
        write!(f, "{}", s)
    }
}

/// Result of the `Saving` step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum SaveOutcome {
    /// Nothing was queued
    NothingPending,
    /// Every queued mutation was processed by the server
    Flushed { pushed: usize, rejected: usize },
    /// The user acknowledged data loss; these mutations were discarded
    Abandoned { pending: usize },
}

/// Why a transition stopped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionFailure {
    pub kind: ErrorKind,
    pub reason: String,
    pub step: TransitionStep,
}

/// A single identity swap, from request to completion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    id: TransitionId,
    kind: TransitionKind,
    outgoing: Option<Identity>,
    incoming: Option<Identity>,
    step: TransitionStep,
    history: Vec<TransitionStep>,
    failure: Option<TransitionFailure>,
    save_outcome: Option<SaveOutcome>,
    cancelled: bool,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl Transition {
    /// Starts a transition at `Checking`
    pub fn begin(
        kind: TransitionKind,
        outgoing: Option<Identity>,
        incoming: Option<Identity>,
    ) -> Self {
        Self {
            id: TransitionId::new(),
            kind,
            outgoing,
            incoming,
            step: TransitionStep::Checking,
            history: vec![TransitionStep::Checking],
            failure: None,
            save_outcome: None,
            cancelled: false,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn id(&self) -> &TransitionId {
        &self.id
    }

    pub fn kind(&self) -> TransitionKind {
        self.kind
    }

    pub fn outgoing(&self) -> Option<&Identity> {
        self.outgoing.as_ref()
    }

    pub fn incoming(&self) -> Option<&Identity> {
        self.incoming.as_ref()
    }

    pub fn step(&self) -> TransitionStep {
        self.step
    }

    /// Steps entered so far, in order
    pub fn history(&self) -> &[TransitionStep] {
        &self.history
    }

    pub fn failure(&self) -> Option<&TransitionFailure> {
        self.failure.as_ref()
    }

    pub fn save_outcome(&self) -> Option<SaveOutcome> {
        self.save_outcome
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn is_complete(&self) -> bool {
        self.step == TransitionStep::Complete
    }

    /// Stopped at `Loading` and waiting for a retry
    pub fn is_parked(&self) -> bool {
        self.step == TransitionStep::Loading
            && self
                .failure
                .as_ref()
                .is_some_and(|f| f.kind == ErrorKind::LoadFailed)
    }

    /// Still owns the coordinator: running or parked
    pub fn is_active(&self) -> bool {
        !self.is_complete() && !self.cancelled && (self.failure.is_none() || self.is_parked())
    }

    /// Moves to the next step
    ///
    /// # Errors
    /// Fails if the transition has a recorded failure, was cancelled, or is
    /// already complete.
    pub fn advance(&mut self) -> Result<TransitionStep, DomainError> {
        if self.failure.is_some() || self.cancelled {
            return Err(DomainError::InvalidState {
                from: self.step.to_string(),
                to: self
                    .step
                    .next()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "none".to_string()),
            });
        }
        let next = self.step.next().ok_or_else(|| DomainError::InvalidState {
            from: self.step.to_string(),
            to: "none".to_string(),
        })?;
        self.step = next;
        self.history.push(next);
        if next == TransitionStep::Complete {
            self.completed_at = Some(Utc::now());
        }
        Ok(next)
    }

    /// Records a failure at the current step
    pub fn fail(&mut self, kind: ErrorKind, reason: impl Into<String>) {
        self.failure = Some(TransitionFailure {
            kind,
            reason: reason.into(),
            step: self.step,
        });
    }

    /// Clears a `LoadFailed` so `Loading` can run again
    pub fn resume_loading(&mut self) -> Result<(), DomainError> {
        if !self.is_parked() {
            return Err(DomainError::InvalidState {
                from: self.step.to_string(),
                to: TransitionStep::Loading.to_string(),
            });
        }
        self.failure = None;
        Ok(())
    }

    pub fn record_save(&mut self, outcome: SaveOutcome) {
        self.save_outcome = Some(outcome);
    }

    /// Abandons the transition; only possible while `Checking`
    pub fn cancel(&mut self) -> Result<(), DomainError> {
        if self.step != TransitionStep::Checking || self.failure.is_some() {
            return Err(DomainError::InvalidState {
                from: self.step.to_string(),
                to: "cancelled".to_string(),
            });
        }
        self.cancelled = true;
        Ok(())
    }

    /// Wall-clock duration so far, or total once complete
    pub fn duration_ms(&self) -> u64 {
        let end = self.completed_at.unwrap_or_else(Utc::now);
        (end - self.started_at).num_milliseconds().max(0) as u64
    }
}
