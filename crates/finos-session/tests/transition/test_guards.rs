//! Connectivity guard, auth gate, single-flight and cancellation

use std::sync::Arc;

use finos_core::domain::{
    AuditAction, ErrorKind, MutationOp, PendingMutation, SaveOutcome, TableName, TransitionStep,
};
use finos_core::usecases::BlockReason;
use finos_session::TransitionError;
use finos_sync::SyncError;
use serde_json::json;

use crate::common::{identity, Harness, Options};

#[tokio::test]
async fn test_offline_switch_is_blocked_and_nothing_is_removed() {
    let h = Harness::new().await;
    let alice = identity("alice@example.com");
    let bob = identity("bob@example.com");
    h.first_login(&alice).await;
    h.write("transactions", "t-1").await;
    h.network.set_online(false);

    let err = h.coordinator.request_switch(bob.clone()).await.unwrap_err();

    assert_eq!(
        err,
        TransitionError::OfflineBlocked {
            reason: BlockReason::Offline
        }
    );
    assert_eq!(err.kind(), ErrorKind::OfflineBlocked);
    assert_eq!(h.coordinator.active_identity().await, Some(alice.clone()));
    assert_eq!(h.pending(&alice).await, 1);
    assert_eq!(h.rows(&alice, "transactions").await, 1);
    assert_eq!(h.remote.push_calls(), 0);

    let snapshot = h.coordinator.snapshot();
    assert_eq!(snapshot.history, vec![TransitionStep::Checking]);
    assert_eq!(snapshot.error.unwrap().reason, "offline");
    assert!(h
        .audit_actions(&alice)
        .await
        .contains(&AuditAction::SwitchBlocked));
}

#[tokio::test]
async fn test_offline_blocks_even_without_pending_writes() {
    let h = Harness::new().await;
    let alice = identity("alice@example.com");
    h.first_login(&alice).await;
    h.network.set_online(false);

    let err = h.coordinator.request_logout().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::OfflineBlocked);
    assert_eq!(h.coordinator.active_identity().await, Some(alice));
}

#[tokio::test]
async fn test_blocked_transition_releases_the_coordinator() {
    let h = Harness::new().await;
    let alice = identity("alice@example.com");
    let bob = identity("bob@example.com");
    h.first_login(&alice).await;
    h.network.set_online(false);
    assert!(h.coordinator.request_switch(bob.clone()).await.is_err());

    h.network.set_online(true);
    let snapshot = h.coordinator.request_switch(bob.clone()).await.unwrap();

    assert!(snapshot.is_complete());
    assert_eq!(h.coordinator.active_identity().await, Some(bob));
}

#[tokio::test]
async fn test_concurrent_request_is_rejected_without_touching_state() {
    let h = Harness::new().await;
    let alice = identity("alice@example.com");
    let bob = identity("bob@example.com");
    let carol = identity("carol@example.com");
    h.first_login(&alice).await;
    h.write("transactions", "t-1").await;

    let hold = h.remote.hold_next_push();
    let task = {
        let coordinator = Arc::clone(&h.coordinator);
        let bob = bob.clone();
        tokio::spawn(async move { coordinator.request_switch(bob).await })
    };
    hold.entered.notified().await;

    let before = h.coordinator.snapshot();
    assert_eq!(before.step, Some(TransitionStep::Saving));
    assert_eq!(
        h.coordinator.request_logout().await.unwrap_err(),
        TransitionError::TransitionInProgress
    );
    assert_eq!(
        h.coordinator.sign_in(carol).await.unwrap_err(),
        TransitionError::TransitionInProgress
    );
    assert_eq!(
        h.coordinator.cancel().unwrap_err(),
        TransitionError::NotCancellable(TransitionStep::Saving)
    );
    assert_eq!(h.coordinator.snapshot(), before);

    hold.release.notify_one();
    let snapshot = task.await.unwrap().unwrap();
    assert!(snapshot.is_complete());
    assert_eq!(h.coordinator.active_identity().await, Some(bob));
}

#[tokio::test]
async fn test_writes_during_saving_are_refused_not_purged() {
    let h = Harness::new().await;
    let alice = identity("alice@example.com");
    let bob = identity("bob@example.com");
    h.first_login(&alice).await;
    h.write("transactions", "t-1").await;
    let outgoing = h.coordinator.active_sync().await.unwrap();

    let hold = h.remote.hold_next_push();
    let task = {
        let coordinator = Arc::clone(&h.coordinator);
        let bob = bob.clone();
        tokio::spawn(async move { coordinator.request_switch(bob).await })
    };
    hold.entered.notified().await;

    assert!(outgoing.is_paused());
    let late = outgoing
        .record_local_mutation(PendingMutation::new(
            TableName::new("transactions").unwrap(),
            "t-2",
            MutationOp::Insert,
            json!({ "id": "t-2" }),
        ))
        .await;
    assert!(matches!(late, Err(SyncError::Paused)));

    hold.release.notify_one();
    let snapshot = task.await.unwrap().unwrap();
    assert!(snapshot.is_complete());
    assert!(matches!(
        snapshot.save_outcome,
        Some(SaveOutcome::Flushed { .. })
    ));
    assert_eq!(h.remote.pushed(), 1);
    assert_eq!(h.coordinator.active_identity().await, Some(bob));
}

#[tokio::test]
async fn test_cancel_during_checking_keeps_identity() {
    let h = Harness::new().await;
    let alice = identity("alice@example.com");
    let bob = identity("bob@example.com");
    h.first_login(&alice).await;
    h.write("transactions", "t-1").await;

    let hold = h.network.hold_next_probe();
    let task = {
        let coordinator = Arc::clone(&h.coordinator);
        let bob = bob.clone();
        tokio::spawn(async move { coordinator.request_switch(bob).await })
    };
    hold.entered.notified().await;

    assert_eq!(h.coordinator.snapshot().step, Some(TransitionStep::Checking));
    assert!(h.coordinator.cancel().unwrap());
    hold.release.notify_one();

    let snapshot = task.await.unwrap().unwrap();
    assert!(snapshot.cancelled);
    assert_eq!(snapshot.history, vec![TransitionStep::Checking]);
    assert_eq!(h.coordinator.active_identity().await, Some(alice.clone()));
    assert_eq!(h.pending(&alice).await, 1);
    assert_eq!(h.remote.push_calls(), 0);
    assert!(!h.coordinator.cancel().unwrap(), "nothing left to cancel");
}

#[tokio::test]
async fn test_cancel_with_nothing_running() {
    let h = Harness::new().await;
    assert_eq!(h.coordinator.cancel(), Ok(false));
}

#[tokio::test]
async fn test_locked_gate_refuses_transitions() {
    let h = Harness::with_options(Options {
        lock_enabled: true,
        ..Options::default()
    })
    .await;
    let alice = identity("alice@example.com");

    let err = h.coordinator.sign_in(alice.clone()).await.unwrap_err();
    assert_eq!(err, TransitionError::AuthFailure("locked".into()));
    assert_eq!(h.coordinator.active_identity().await, None);

    h.coordinator.unlock().await.unwrap();
    h.first_login(&alice).await;

    h.coordinator.lock();
    let err = h.coordinator.request_logout().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AuthFailure);
    assert_eq!(h.coordinator.active_identity().await, Some(alice.clone()));

    h.coordinator.unlock().await.unwrap();
    assert!(h
        .audit_actions(&alice)
        .await
        .contains(&AuditAction::AuthUnlock));
    assert!(h.coordinator.request_logout().await.unwrap().is_complete());
}

fn assert_send<T: Send>(_: &T) {}

#[tokio::test]
async fn test_transition_futures_can_be_spawned() {
    let h = Harness::new().await;
    let alice = identity("alice@example.com");
    let bob = identity("bob@example.com");
    h.first_login(&alice).await;
    h.write("transactions", "t-1").await;

    assert_send(&h.coordinator.sign_in(bob.clone()));
    assert_send(&h.coordinator.request_switch(bob.clone()));
    assert_send(&h.coordinator.request_logout());
    assert_send(&h.coordinator.retry_loading());
    let warning = h.coordinator.data_loss_warning().await.unwrap().unwrap();
    assert_send(&h.coordinator.force_logout(warning.acknowledge()));

    let session = h.coordinator.active_sync().await.unwrap();
    assert_send(&session.sync_all());
    assert_send(&session.force_sync_now());

    let snapshot = tokio::spawn({
        let coordinator = Arc::clone(&h.coordinator);
        async move { coordinator.request_switch(bob).await }
    })
    .await
    .unwrap()
    .unwrap();
    assert!(snapshot.is_complete());
}
