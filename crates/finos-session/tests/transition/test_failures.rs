//! Save, load and purge failures

use finos_core::domain::{AuditAction, ErrorKind, SaveOutcome, TransitionStep};
use finos_core::ports::ILocalStore;
use finos_session::TransitionError;
use std::sync::atomic::Ordering;

use crate::common::{identity, Harness, Options};

#[tokio::test]
async fn test_save_failure_keeps_old_identity_and_never_cleans() {
    let h = Harness::new().await;
    let alice = identity("alice@example.com");
    let bob = identity("bob@example.com");
    h.first_login(&alice).await;
    h.write("transactions", "t-1").await;
    h.remote.fail_pushes.store(true, Ordering::SeqCst);

    let err = h.coordinator.request_switch(bob.clone()).await.unwrap_err();

    assert!(matches!(err, TransitionError::SaveFailed(_)));
    let snapshot = h.coordinator.snapshot();
    assert_eq!(
        snapshot.history,
        vec![TransitionStep::Checking, TransitionStep::Saving]
    );
    assert_eq!(snapshot.error.unwrap().kind, ErrorKind::SaveFailed);
    assert!(!snapshot.parked);
    assert_eq!(h.coordinator.active_identity().await, Some(alice.clone()));
    assert_eq!(h.pending(&alice).await, 1);
    assert_eq!(h.rows(&alice, "transactions").await, 1);
    assert!(!h
        .audit_actions(&alice)
        .await
        .contains(&AuditAction::DataCleanup));

    h.remote.fail_pushes.store(false, Ordering::SeqCst);
    let snapshot = h.coordinator.request_switch(bob.clone()).await.unwrap();
    assert!(snapshot.is_complete());
    assert_eq!(h.coordinator.active_identity().await, Some(bob));
}

#[tokio::test]
async fn test_load_failure_parks_until_retry() {
    let h = Harness::new().await;
    h.remote.add_row("wallets", "w-1", 3);
    let alice = identity("alice@example.com");
    let bob = identity("bob@example.com");
    let carol = identity("carol@example.com");
    h.first_login(&alice).await;
    h.write("transactions", "t-1").await;
    h.remote.fail_pulls.store(true, Ordering::SeqCst);

    let err = h.coordinator.request_switch(bob.clone()).await.unwrap_err();

    assert!(matches!(err, TransitionError::LoadFailed(_)));
    let parked = h.coordinator.snapshot();
    assert!(parked.parked);
    assert_eq!(parked.step, Some(TransitionStep::Loading));
    assert_eq!(parked.history, TransitionStep::ORDER[..4].to_vec());
    assert_eq!(parked.error.unwrap().kind, ErrorKind::LoadFailed);

    // the outgoing cache is already gone
    assert_eq!(h.coordinator.active_identity().await, None);
    assert_eq!(h.rows(&alice, "wallets").await, 0);
    assert_eq!(h.rows(&alice, "transactions").await, 0);
    assert_eq!(h.pending(&alice).await, 0);
    assert_eq!(h.remote.pushed(), 1);

    assert_eq!(
        h.coordinator.sign_in(carol).await.unwrap_err(),
        TransitionError::TransitionInProgress
    );
    assert_eq!(
        h.coordinator.request_logout().await.unwrap_err(),
        TransitionError::TransitionInProgress
    );

    h.remote.fail_pulls.store(false, Ordering::SeqCst);
    let snapshot = h.coordinator.retry_loading().await.unwrap();

    assert!(snapshot.is_complete());
    assert_eq!(snapshot.history, TransitionStep::ORDER.to_vec());
    assert_eq!(
        snapshot.save_outcome,
        Some(SaveOutcome::Flushed {
            pushed: 1,
            rejected: 0
        })
    );
    assert_eq!(h.remote.push_calls(), 1, "saving is not repeated");
    assert_eq!(h.coordinator.active_identity().await, Some(bob.clone()));
    assert_eq!(h.store.active_identity().await.unwrap(), Some(bob.clone()));
    assert_eq!(h.rows(&bob, "wallets").await, 1);

    assert_eq!(
        h.coordinator.retry_loading().await.unwrap_err(),
        TransitionError::NothingToRetry
    );
}

#[tokio::test]
async fn test_failed_retry_stays_parked() {
    let h = Harness::new().await;
    h.remote.add_row("wallets", "w-1", 3);
    let alice = identity("alice@example.com");
    let bob = identity("bob@example.com");
    h.first_login(&alice).await;
    h.remote.fail_pulls.store(true, Ordering::SeqCst);
    assert!(h.coordinator.request_switch(bob.clone()).await.is_err());

    let err = h.coordinator.retry_loading().await.unwrap_err();

    assert!(matches!(err, TransitionError::LoadFailed(_)));
    assert!(h.coordinator.snapshot().parked);

    h.remote.fail_pulls.store(false, Ordering::SeqCst);
    assert!(h.coordinator.retry_loading().await.unwrap().is_complete());
}

#[tokio::test]
async fn test_purge_failure_is_fatal() {
    let h = Harness::with_options(Options {
        purge_fails: true,
        ..Options::default()
    })
    .await;
    let alice = identity("alice@example.com");
    let bob = identity("bob@example.com");
    let carol = identity("carol@example.com");
    h.first_login(&alice).await;

    let err = h.coordinator.request_switch(bob.clone()).await.unwrap_err();

    assert_eq!(err, TransitionError::PurgeFailed("disk I/O error".into()));
    assert!(err.is_fatal());
    assert!(h.coordinator.is_fatal());
    let snapshot = h.coordinator.snapshot();
    assert_eq!(snapshot.step, Some(TransitionStep::Cleaning));
    assert_eq!(snapshot.fatal.as_deref(), Some("disk I/O error"));
    assert_eq!(h.coordinator.active_identity().await, None);

    for err in [
        h.coordinator.request_logout().await.unwrap_err(),
        h.coordinator.sign_in(carol).await.unwrap_err(),
        h.coordinator.retry_loading().await.unwrap_err(),
    ] {
        assert_eq!(err.kind(), ErrorKind::PurgeFailed);
    }
    assert!(h
        .audit_actions(&alice)
        .await
        .contains(&AuditAction::TransitionFailed));
}
