//! Session transition coordinator
//!
//! The [`SessionTransitionCoordinator`] is the only component allowed to
//! change which identity owns the local cache. Every change runs the same
//! strictly ordered steps:
//!
//! 1. **Checking**: the auth gate must be unlocked and the connectivity guard
//!    must allow the transition. Cancellable.
//! 2. **Saving**: every pending mutation of the outgoing identity is pushed.
//!    Anything left over stops the transition with the old identity intact.
//! 3. **Cleaning**: background sync is paused and the outgoing identity's
//!    local data is purged. There is no rollback; a failed purge is fatal.
//! 4. **Loading**: a fresh [`SyncSession`] is opened for the incoming
//!    identity and every table is pulled. A failure parks the transition
//!    here until [`retry_loading`](SessionTransitionCoordinator::retry_loading).
//! 5. **Complete**
//!
//! Only one transition runs at a time. Observers follow along through
//! [`subscribe`](SessionTransitionCoordinator::subscribe).

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};

use serde::Serialize;
use tokio::sync::{watch, Mutex, MutexGuard, RwLock};
use tracing::{debug, error, info, warn};

use finos_core::domain::{
    normalize_reason, user_facing_reason, Identity, PendingMutationSet, SaveOutcome,
    SwitchDetection, TableName, Transition, TransitionKind,
};
use finos_core::ports::INetworkMonitor;
use finos_core::usecases::{
    AcknowledgedDataLoss, AuthGate, AuthGrant, ConnectivityGuard, DataLossWarning, SwitchDecision,
};
use finos_sync::session::unfinished_tables;
use finos_sync::{FlushReport, PauseGuard, SyncContext, SyncError, SyncSession};

use crate::{TransitionError, TransitionSnapshot};

/// Failure reason when a transition is requested behind a locked gate
pub const REASON_LOCKED: &str = "locked";

const WINDOW_CLOSED: u8 = 0;
const WINDOW_OPEN: u8 = 1;
const CANCEL_REQUESTED: u8 = 2;

/// Result of [`SessionTransitionCoordinator::sign_in`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignInOutcome {
    pub detection: SwitchDetection,
    pub snapshot: TransitionSnapshot,
}

/// What `Checking` learned about the outgoing identity
struct Checked {
    pending: usize,
    online: bool,
}

/// Owns the active identity and runs identity transitions one at a time
pub struct SessionTransitionCoordinator {
    ctx: SyncContext,
    network: Arc<dyn INetworkMonitor>,
    auth: Arc<AuthGate>,
    guard: ConnectivityGuard,
    /// Held for the whole run of a transition; holds it while parked
    slot: Mutex<Option<Transition>>,
    active: RwLock<Option<Arc<SyncSession>>>,
    fatal: OnceLock<String>,
    cancel_window: AtomicU8,
    snapshot_tx: watch::Sender<TransitionSnapshot>,
}

impl SessionTransitionCoordinator {
    /// Creates a coordinator with no active identity
    pub fn new(ctx: SyncContext, network: Arc<dyn INetworkMonitor>, auth: Arc<AuthGate>) -> Self {
        let (snapshot_tx, _) = watch::channel(TransitionSnapshot::idle(None));
        Self {
            ctx,
            network,
            auth,
            guard: ConnectivityGuard::new(),
            slot: Mutex::new(None),
            active: RwLock::new(None),
            fatal: OnceLock::new(),
            cancel_window: AtomicU8::new(WINDOW_CLOSED),
            snapshot_tx,
        }
    }

    // ========================================================================
    // Observation
    // ========================================================================

    pub fn snapshot(&self) -> TransitionSnapshot {
        self.snapshot_tx.borrow().clone()
    }

    /// Receives a fresh snapshot on every step change
    pub fn subscribe(&self) -> watch::Receiver<TransitionSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub async fn active_identity(&self) -> Option<Identity> {
        self.active
            .read()
            .await
            .as_ref()
            .map(|s| s.identity().clone())
    }

    /// Sync session of the active identity
    pub async fn active_sync(&self) -> Option<Arc<SyncSession>> {
        self.active.read().await.clone()
    }

    /// A purge failed earlier; every request is refused
    pub fn is_fatal(&self) -> bool {
        self.fatal.get().is_some()
    }

    // ========================================================================
    // Authentication
    // ========================================================================

    /// Runs one unlock attempt and records its outcome
    pub async fn unlock(&self) -> Result<AuthGrant, TransitionError> {
        let identity = self.active_identity().await.map(|i| *i.id());
        match self.auth.authenticate().await {
            Ok(grant) => {
                self.ctx.audit.log_auth_attempt(identity, None).await;
                Ok(grant)
            }
            Err(failure) => {
                self.ctx
                    .audit
                    .log_auth_attempt(identity, Some(&failure.reason))
                    .await;
                Err(TransitionError::AuthFailure(failure.reason))
            }
        }
    }

    /// Re-locks the gate
    pub fn lock(&self) {
        self.auth.lock();
    }

    // ========================================================================
    // Requests
    // ========================================================================

    /// Reinstalls the identity recorded by a previous run, if any
    pub async fn resume_active(&self) -> Result<Option<Identity>, TransitionError> {
        let _slot = self.acquire()?;
        let stored = self
            .ctx
            .local
            .active_identity()
            .await
            .map_err(|e| TransitionError::LoadFailed(user_facing_reason(&e)))?;
        let Some(identity) = stored else {
            debug!("No stored identity to resume");
            return Ok(None);
        };

        let session = SyncSession::open(identity.clone(), self.ctx.clone())
            .await
            .map_err(load_failed)?;
        *self.active.write().await = Some(Arc::new(session));
        self.snapshot_tx
            .send_modify(|s| s.active = Some(identity.email().clone()));
        info!(identity = %identity.email(), "Resumed stored identity");
        Ok(Some(identity))
    }

    /// Classifies a sign-in and runs whatever transition it needs
    ///
    /// No active identity runs a first login; a different identity runs a
    /// full switch; the same identity changes nothing.
    #[tracing::instrument(skip(self, identity), fields(incoming = %identity.email()))]
    pub async fn sign_in(&self, identity: Identity) -> Result<SignInOutcome, TransitionError> {
        let slot = self.acquire()?;
        let current = self.active_identity().await;
        let detection = SwitchDetection::detect(current.as_ref(), &identity);

        let snapshot = match detection {
            SwitchDetection::SameUser => {
                debug!("Identity already active");
                self.snapshot()
            }
            SwitchDetection::FirstLogin => {
                let transition = Transition::begin(TransitionKind::FirstLogin, None, Some(identity));
                self.execute(slot, transition, None).await?
            }
            SwitchDetection::Switch { .. } => {
                let transition = Transition::begin(TransitionKind::Switch, current, Some(identity));
                self.execute(slot, transition, None).await?
            }
        };
        Ok(SignInOutcome {
            detection,
            snapshot,
        })
    }

    /// Replaces the active identity with `target`
    pub async fn request_switch(&self, target: Identity) -> Result<TransitionSnapshot, TransitionError> {
        self.sign_in(target).await.map(|outcome| outcome.snapshot)
    }

    /// Removes the active identity, leaving no session
    #[tracing::instrument(skip(self))]
    pub async fn request_logout(&self) -> Result<TransitionSnapshot, TransitionError> {
        let slot = self.acquire()?;
        let Some(current) = self.active_identity().await else {
            debug!("No active identity, nothing to log out");
            return Ok(self.snapshot());
        };
        let transition = Transition::begin(TransitionKind::Logout, Some(current), None);
        self.execute(slot, transition, None).await
    }

    /// What a forced logout of the active identity would discard
    pub async fn data_loss_warning(&self) -> Result<Option<DataLossWarning>, SyncError> {
        let Some(session) = self.active_sync().await else {
            return Ok(None);
        };
        let pending = session.pending().await?;
        Ok(Some(
            self.guard.data_loss_warning(&pending, session.identity()),
        ))
    }

    /// Logs out even when pending mutations cannot be saved
    ///
    /// Requires a warning acknowledged for the active identity.
    #[tracing::instrument(skip(self, ack), fields(outgoing = %ack.outgoing()))]
    pub async fn force_logout(
        &self,
        ack: AcknowledgedDataLoss,
    ) -> Result<TransitionSnapshot, TransitionError> {
        let slot = self.acquire()?;
        let Some(current) = self.active_identity().await else {
            debug!("No active identity, nothing to log out");
            return Ok(self.snapshot());
        };
        if ack.outgoing() != current.email() {
            return Err(TransitionError::StaleWarning(ack.outgoing().to_string()));
        }
        let transition = Transition::begin(TransitionKind::ForcedLogout, Some(current), None);
        self.execute(slot, transition, Some(&ack)).await
    }

    /// Re-runs `Loading` of a parked transition
    ///
    /// Saving and cleaning are not repeated.
    #[tracing::instrument(skip(self))]
    pub async fn retry_loading(&self) -> Result<TransitionSnapshot, TransitionError> {
        if let Some(reason) = self.fatal.get() {
            return Err(TransitionError::PurgeFailed(reason.clone()));
        }
        let mut slot = self
            .slot
            .try_lock()
            .map_err(|_| TransitionError::TransitionInProgress)?;
        let Some(mut transition) = slot.take() else {
            return Err(TransitionError::NothingToRetry);
        };
        if let Err(e) = transition.resume_loading() {
            warn!(error = %e, "Stored transition is not parked");
            return Err(TransitionError::NothingToRetry);
        }

        info!(transition = %transition.id(), "Retrying Loading");
        self.publish(&transition).await;
        self.finish_loading(slot, transition).await
    }

    /// Requests cancellation of the running transition
    ///
    /// Returns `Ok(true)` if the request landed while `Checking`, `Ok(false)`
    /// if nothing is running.
    pub fn cancel(&self) -> Result<bool, TransitionError> {
        match self.cancel_window.compare_exchange(
            WINDOW_OPEN,
            CANCEL_REQUESTED,
            Ordering::SeqCst,
            Ordering::SeqCst,
        ) {
            Ok(_) | Err(CANCEL_REQUESTED) => {
                info!("Transition cancellation requested");
                Ok(true)
            }
            Err(_) => {
                let snapshot = self.snapshot();
                match snapshot.step {
                    Some(step) if snapshot.is_running() || snapshot.parked => {
                        Err(TransitionError::NotCancellable(step))
                    }
                    _ => Ok(false),
                }
            }
        }
    }

    // ========================================================================
    // Steps
    // ========================================================================

    fn acquire(&self) -> Result<MutexGuard<'_, Option<Transition>>, TransitionError> {
        if let Some(reason) = self.fatal.get() {
            return Err(TransitionError::PurgeFailed(reason.clone()));
        }
        let slot = self
            .slot
            .try_lock()
            .map_err(|_| TransitionError::TransitionInProgress)?;
        if slot.as_ref().is_some_and(Transition::is_parked) {
            return Err(TransitionError::TransitionInProgress);
        }
        Ok(slot)
    }

    async fn execute(
        &self,
        slot: MutexGuard<'_, Option<Transition>>,
        mut transition: Transition,
        ack: Option<&AcknowledgedDataLoss>,
    ) -> Result<TransitionSnapshot, TransitionError> {
        info!(
            transition = %transition.id(),
            kind = %transition.kind(),
            "Transition started"
        );
        let outgoing = self.active_sync().await;

        // Checking
        self.cancel_window.store(WINDOW_OPEN, Ordering::SeqCst);
        self.publish(&transition).await;
        let checked = self.check(&transition, outgoing.as_deref(), ack).await;
        let window = self.cancel_window.swap(WINDOW_CLOSED, Ordering::SeqCst);
        let checked = match checked {
            Ok(checked) => checked,
            Err(e) => return Err(self.abort(&mut transition, e).await),
        };
        if window == CANCEL_REQUESTED {
            if let Err(e) = transition.cancel() {
                warn!(error = %e, "Cancellation arrived too late");
            } else {
                info!(transition = %transition.id(), "Transition cancelled");
                self.publish(&transition).await;
                return Ok(self.snapshot());
            }
        }

        // Saving; the outgoing session stays paused until the purge is done
        self.enter_step(&mut transition).await;
        let paused = match outgoing.as_deref() {
            Some(session) => Some((session, session.pause().await)),
            None => None,
        };
        let saving = paused.as_ref().map(|(session, guard)| (*session, guard));
        let outcome = match self.save(transition.kind(), saving, &checked).await {
            Ok(outcome) => outcome,
            Err(e) => return Err(self.abort(&mut transition, e).await),
        };
        transition.record_save(outcome);

        // Cleaning
        self.enter_step(&mut transition).await;
        if let Err(e) = self.clean(&transition, paused).await {
            return Err(self.abort(&mut transition, e).await);
        }
        drop(outgoing);

        // Loading
        self.enter_step(&mut transition).await;
        self.finish_loading(slot, transition).await
    }

    async fn check(
        &self,
        transition: &Transition,
        session: Option<&SyncSession>,
        ack: Option<&AcknowledgedDataLoss>,
    ) -> Result<Checked, TransitionError> {
        if !self.auth.is_unlocked() {
            return Err(TransitionError::AuthFailure(REASON_LOCKED.to_string()));
        }

        let pending = match session {
            Some(session) => session.pending().await.map_err(save_failed)?,
            None => PendingMutationSet::new(),
        };
        if !transition.kind().is_destructive() {
            return Ok(Checked {
                pending: 0,
                online: true,
            });
        }

        let online = self.network.is_online().await;
        let decision = match ack {
            Some(ack) => self.guard.force_logout(ack),
            None => self.guard.can_switch_user(&pending, online),
        };
        self.ctx
            .audit
            .log_switch_decision(
                *transition.id(),
                transition.outgoing().map(Identity::id),
                &decision,
                pending.len(),
            )
            .await;

        if let SwitchDecision::Blocked { reason } = decision {
            return Err(TransitionError::OfflineBlocked { reason });
        }
        Ok(Checked {
            pending: pending.len(),
            online,
        })
    }

    async fn save(
        &self,
        kind: TransitionKind,
        session: Option<(&SyncSession, &PauseGuard)>,
        checked: &Checked,
    ) -> Result<SaveOutcome, TransitionError> {
        let Some((session, paused)) = session else {
            return Ok(SaveOutcome::NothingPending);
        };

        if kind == TransitionKind::ForcedLogout {
            if !checked.online {
                warn!(pending = checked.pending, "Offline, abandoning pending mutations");
                return Ok(abandoned(checked.pending));
            }
            return Ok(match session.flush_while_paused(paused).await {
                Ok(report) if report.is_complete() => flushed(&report),
                Ok(report) => {
                    warn!(
                        remaining = report.remaining,
                        "Abandoning mutations the server did not process"
                    );
                    abandoned(report.remaining)
                }
                Err(e) => {
                    warn!(error = %e, "Flush failed, abandoning pending mutations");
                    abandoned(checked.pending)
                }
            });
        }

        let report = session
            .flush_while_paused(paused)
            .await
            .map_err(save_failed)?;
        if !report.is_complete() {
            return Err(TransitionError::SaveFailed(format!(
                "{} mutation(s) still pending",
                report.remaining
            )));
        }
        Ok(flushed(&report))
    }

    async fn clean(
        &self,
        transition: &Transition,
        _paused: Option<(&SyncSession, PauseGuard)>,
    ) -> Result<(), TransitionError> {
        let Some(outgoing) = transition.outgoing() else {
            debug!("No outgoing identity, nothing to purge");
            return Ok(());
        };

        let purged = self.ctx.local.purge_identity(outgoing.id()).await;
        *self.active.write().await = None;

        let report = match purged {
            Ok(report) => report,
            Err(e) => return Err(self.poison(user_facing_reason(&e))),
        };
        self.ctx
            .audit
            .log_data_cleanup(*transition.id(), &report)
            .await;
        if !report.is_verified() {
            return Err(self.poison(format!(
                "rows left in {}",
                report.leftovers().join(", ")
            )));
        }

        info!(
            identity = %outgoing.email(),
            rows = report.total_deleted(),
            "Outgoing identity purged"
        );
        Ok(())
    }

    async fn load(&self, transition: &Transition) -> Result<(), TransitionError> {
        let Some(incoming) = transition.incoming() else {
            self.ctx
                .local
                .set_active_identity(None)
                .await
                .map_err(|e| TransitionError::LoadFailed(user_facing_reason(&e)))?;
            return Ok(());
        };

        let session = SyncSession::open(incoming.clone(), self.ctx.clone())
            .await
            .map_err(load_failed)?;
        let states = session.force_sync_now().await.map_err(load_failed)?;
        let unfinished = unfinished_tables(&states);
        if !unfinished.is_empty() {
            let names: Vec<&str> = unfinished.iter().map(TableName::as_str).collect();
            return Err(TransitionError::LoadFailed(format!(
                "tables not loaded: {}",
                names.join(", ")
            )));
        }

        self.ctx
            .local
            .set_active_identity(Some(incoming))
            .await
            .map_err(|e| TransitionError::LoadFailed(user_facing_reason(&e)))?;
        *self.active.write().await = Some(Arc::new(session));
        info!(
            identity = %incoming.email(),
            tables = states.len(),
            "Incoming identity loaded"
        );
        Ok(())
    }

    /// Runs `Loading`, then completes or parks the transition
    async fn finish_loading(
        &self,
        mut slot: MutexGuard<'_, Option<Transition>>,
        mut transition: Transition,
    ) -> Result<TransitionSnapshot, TransitionError> {
        match self.load(&transition).await {
            Ok(()) => {
                self.enter_step(&mut transition).await;
                self.ctx.audit.log_transition_complete(&transition).await;
                info!(
                    transition = %transition.id(),
                    kind = %transition.kind(),
                    duration_ms = transition.duration_ms(),
                    "Transition complete"
                );
                *slot = None;
                Ok(self.snapshot())
            }
            Err(e) => {
                let err = self.abort(&mut transition, e).await;
                warn!(transition = %transition.id(), "Transition parked at Loading");
                *slot = Some(transition);
                Err(err)
            }
        }
    }

    async fn enter_step(&self, transition: &mut Transition) {
        match transition.advance() {
            Ok(step) => debug!(
                transition = %transition.id(),
                step = %step,
                label = step.label(),
                "Entering step"
            ),
            Err(e) => error!(transition = %transition.id(), error = %e, "Step order violated"),
        }
        self.publish(transition).await;
    }

    async fn abort(&self, transition: &mut Transition, err: TransitionError) -> TransitionError {
        self.cancel_window.store(WINDOW_CLOSED, Ordering::SeqCst);
        transition.fail(err.kind(), err.reason());
        warn!(
            transition = %transition.id(),
            step = %transition.step(),
            kind = %err.kind(),
            error = %err,
            "Transition stopped"
        );
        self.ctx.audit.log_transition_failed(transition).await;
        self.publish(transition).await;
        err
    }

    /// Records a purge failure; no transition runs after this
    fn poison(&self, reason: String) -> TransitionError {
        error!(reason = %reason, "Local data purge failed, refusing further transitions");
        if self.fatal.set(reason.clone()).is_err() {
            debug!("Purge failure already recorded");
        }
        TransitionError::PurgeFailed(reason)
    }

    async fn publish(&self, transition: &Transition) {
        let active = self.active_identity().await.map(|i| i.email().clone());
        let fatal = self.fatal.get().cloned();
        self.snapshot_tx
            .send_replace(TransitionSnapshot::of(transition, active, fatal));
    }
}

fn flushed(report: &FlushReport) -> SaveOutcome {
    if report.pushed + report.rejected == 0 {
        SaveOutcome::NothingPending
    } else {
        SaveOutcome::Flushed {
            pushed: report.pushed,
            rejected: report.rejected,
        }
    }
}

fn abandoned(pending: usize) -> SaveOutcome {
    if pending == 0 {
        SaveOutcome::NothingPending
    } else {
        SaveOutcome::Abandoned { pending }
    }
}

fn save_failed(err: SyncError) -> TransitionError {
    TransitionError::SaveFailed(normalize_reason(err.to_string()))
}

fn load_failed(err: SyncError) -> TransitionError {
    TransitionError::LoadFailed(normalize_reason(err.to_string()))
}
