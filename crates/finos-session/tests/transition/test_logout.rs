//! Logout and forced logout

use std::sync::atomic::Ordering;

use finos_core::domain::{AuditAction, ErrorKind, SaveOutcome, TransitionKind, TransitionStep};
use finos_core::ports::ILocalStore;
use finos_session::TransitionError;

use crate::common::{identity, Harness};

#[tokio::test]
async fn test_logout_saves_then_removes_everything() {
    let h = Harness::new().await;
    let alice = identity("alice@example.com");
    h.first_login(&alice).await;
    h.write("wallets", "w-9").await;

    let snapshot = h.coordinator.request_logout().await.unwrap();

    assert!(snapshot.is_complete());
    assert_eq!(snapshot.kind, Some(TransitionKind::Logout));
    assert_eq!(snapshot.history, TransitionStep::ORDER.to_vec());
    assert_eq!(
        snapshot.save_outcome,
        Some(SaveOutcome::Flushed {
            pushed: 1,
            rejected: 0
        })
    );
    assert_eq!(snapshot.active, None);
    assert_eq!(h.coordinator.active_identity().await, None);
    assert_eq!(h.store.active_identity().await.unwrap(), None);
    assert_eq!(h.rows(&alice, "wallets").await, 0);
    assert_eq!(h.pending(&alice).await, 0);

    let audit = h.audit_actions(&alice).await;
    assert!(audit.contains(&AuditAction::Logout));
    assert!(audit.contains(&AuditAction::DataCleanup));

    let again = h.coordinator.request_logout().await.unwrap();
    assert_eq!(again, snapshot, "logging out twice changes nothing");
}

#[tokio::test]
async fn test_forced_logout_offline_abandons_pending() {
    let h = Harness::new().await;
    let alice = identity("alice@example.com");
    h.first_login(&alice).await;
    h.write("transactions", "t-1").await;
    h.write("transactions", "t-2").await;
    h.network.set_online(false);

    assert_eq!(
        h.coordinator.request_logout().await.unwrap_err().kind(),
        ErrorKind::OfflineBlocked
    );

    let warning = h.coordinator.data_loss_warning().await.unwrap().unwrap();
    assert_eq!(warning.unsaved().transactions, 2);
    assert!(warning.message()[0].contains("alice@example.com"));

    let snapshot = h.coordinator.force_logout(warning.acknowledge()).await.unwrap();

    assert!(snapshot.is_complete());
    assert_eq!(snapshot.kind, Some(TransitionKind::ForcedLogout));
    assert_eq!(
        snapshot.save_outcome,
        Some(SaveOutcome::Abandoned { pending: 2 })
    );
    assert_eq!(h.remote.push_calls(), 0);
    assert_eq!(h.coordinator.active_identity().await, None);
    assert_eq!(h.rows(&alice, "transactions").await, 0);
    assert_eq!(h.pending(&alice).await, 0);
    assert!(h
        .audit_actions(&alice)
        .await
        .contains(&AuditAction::ForcedLogout));
}

#[tokio::test]
async fn test_forced_logout_online_still_saves() {
    let h = Harness::new().await;
    let alice = identity("alice@example.com");
    h.first_login(&alice).await;
    h.write("transactions", "t-1").await;

    let warning = h.coordinator.data_loss_warning().await.unwrap().unwrap();
    let snapshot = h.coordinator.force_logout(warning.acknowledge()).await.unwrap();

    assert_eq!(
        snapshot.save_outcome,
        Some(SaveOutcome::Flushed {
            pushed: 1,
            rejected: 0
        })
    );
    assert_eq!(h.remote.pushed(), 1);
}

#[tokio::test]
async fn test_forced_logout_survives_push_failure() {
    let h = Harness::new().await;
    let alice = identity("alice@example.com");
    h.first_login(&alice).await;
    h.write("transactions", "t-1").await;
    h.remote.fail_pushes.store(true, Ordering::SeqCst);

    let warning = h.coordinator.data_loss_warning().await.unwrap().unwrap();
    let snapshot = h.coordinator.force_logout(warning.acknowledge()).await.unwrap();

    assert!(snapshot.is_complete());
    assert_eq!(
        snapshot.save_outcome,
        Some(SaveOutcome::Abandoned { pending: 1 })
    );
    assert_eq!(h.coordinator.active_identity().await, None);
}

#[tokio::test]
async fn test_warning_for_another_identity_is_refused() {
    let h = Harness::new().await;
    let alice = identity("alice@example.com");
    let bob = identity("bob@example.com");
    h.first_login(&alice).await;
    let warning = h.coordinator.data_loss_warning().await.unwrap().unwrap();
    h.coordinator.request_switch(bob.clone()).await.unwrap();

    let err = h
        .coordinator
        .force_logout(warning.acknowledge())
        .await
        .unwrap_err();

    assert_eq!(
        err,
        TransitionError::StaleWarning("alice@example.com".into())
    );
    assert_eq!(h.coordinator.active_identity().await, Some(bob));
}

#[tokio::test]
async fn test_no_warning_without_identity() {
    let h = Harness::new().await;
    assert!(h.coordinator.data_loss_warning().await.unwrap().is_none());
}
