//! Successful switches, first logins and restarts

use finos_core::domain::{AuditAction, SaveOutcome, SwitchDetection, TransitionKind, TransitionStep};
use finos_core::ports::ILocalStore;

use crate::common::{identity, Harness};

#[tokio::test]
async fn test_first_login_walks_every_step() {
    let h = Harness::new().await;
    h.remote.add_row("wallets", "w-1", 3);
    let alice = identity("alice@example.com");

    let outcome = h.coordinator.sign_in(alice.clone()).await.unwrap();

    assert_eq!(outcome.detection, SwitchDetection::FirstLogin);
    let snapshot = outcome.snapshot;
    assert_eq!(snapshot.kind, Some(TransitionKind::FirstLogin));
    assert_eq!(snapshot.history, TransitionStep::ORDER.to_vec());
    assert_eq!(snapshot.save_outcome, Some(SaveOutcome::NothingPending));
    assert_eq!(snapshot.active, Some(alice.email().clone()));
    assert_eq!(h.coordinator.active_identity().await, Some(alice.clone()));
    assert_eq!(h.store.active_identity().await.unwrap(), Some(alice.clone()));
    assert_eq!(h.rows(&alice, "wallets").await, 1);
    assert_eq!(h.remote.push_calls(), 0);
    assert!(h.audit_actions(&alice).await.contains(&AuditAction::FirstLogin));
}

#[tokio::test]
async fn test_same_user_sign_in_is_a_no_op() {
    let h = Harness::new().await;
    let alice = identity("alice@example.com");
    h.first_login(&alice).await;
    let before = h.coordinator.snapshot();

    let outcome = h.coordinator.sign_in(alice.clone()).await.unwrap();

    assert_eq!(outcome.detection, SwitchDetection::SameUser);
    assert_eq!(outcome.snapshot, before);
    assert_eq!(h.coordinator.active_identity().await, Some(alice));
}

#[tokio::test]
async fn test_switch_saves_purges_and_loads() {
    let h = Harness::new().await;
    h.remote.add_row("wallets", "w-1", 3);
    let alice = identity("alice@example.com");
    let bob = identity("bob@example.com");
    h.first_login(&alice).await;
    h.write("transactions", "t-1").await;
    assert_eq!(h.pending(&alice).await, 1);

    let outcome = h.coordinator.sign_in(bob.clone()).await.unwrap();

    assert!(outcome.detection.is_switch());
    let snapshot = outcome.snapshot;
    assert!(snapshot.is_complete());
    assert_eq!(snapshot.kind, Some(TransitionKind::Switch));
    assert_eq!(snapshot.history, TransitionStep::ORDER.to_vec());
    assert_eq!(
        snapshot.save_outcome,
        Some(SaveOutcome::Flushed {
            pushed: 1,
            rejected: 0
        })
    );
    assert_eq!(snapshot.outgoing, Some(alice.email().clone()));
    assert_eq!(snapshot.incoming, Some(bob.email().clone()));

    assert_eq!(h.remote.pushed(), 1);
    assert_eq!(h.pending(&alice).await, 0);
    assert_eq!(h.rows(&alice, "wallets").await, 0);
    assert_eq!(h.rows(&alice, "transactions").await, 0);
    assert_eq!(h.rows(&bob, "wallets").await, 1);
    assert_eq!(h.coordinator.active_identity().await, Some(bob.clone()));
    assert_eq!(h.store.active_identity().await.unwrap(), Some(bob.clone()));

    let outgoing_audit = h.audit_actions(&alice).await;
    assert!(outgoing_audit.contains(&AuditAction::SwitchAllowed));
    assert!(outgoing_audit.contains(&AuditAction::DataCleanup));
    assert!(h.audit_actions(&bob).await.contains(&AuditAction::UserSwitch));
}

#[tokio::test]
async fn test_new_session_starts_clean() {
    let h = Harness::new().await;
    h.remote.add_row("wallets", "w-1", 3);
    let alice = identity("alice@example.com");
    let bob = identity("bob@example.com");
    h.first_login(&alice).await;
    let first = h.coordinator.active_sync().await.unwrap();

    h.coordinator.request_switch(bob.clone()).await.unwrap();

    let second = h.coordinator.active_sync().await.unwrap();
    assert_eq!(second.identity(), &bob);
    assert!(!std::sync::Arc::ptr_eq(&first, &second));
    let versions = second.versions().await;
    assert_eq!(versions.get("wallets").unwrap().local_version(), 3);
    assert!(second.pending().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_subscribers_see_the_final_state() {
    let h = Harness::new().await;
    let alice = identity("alice@example.com");
    let mut rx = h.coordinator.subscribe();
    assert!(!rx.borrow().is_running());

    h.first_login(&alice).await;

    assert!(rx.has_changed().unwrap());
    let seen = rx.borrow_and_update().clone();
    assert!(seen.is_complete());
    assert_eq!(seen.step_label, Some("Complete"));
}

#[tokio::test]
async fn test_restart_resumes_stored_identity() {
    let h = Harness::new().await;
    let alice = identity("alice@example.com");
    h.first_login(&alice).await;

    let restarted = h.restart();
    assert_eq!(restarted.active_identity().await, None);

    let resumed = restarted.resume_active().await.unwrap();
    assert_eq!(resumed, Some(alice.clone()));
    assert_eq!(restarted.active_identity().await, Some(alice.clone()));
    assert_eq!(restarted.snapshot().active, Some(alice.email().clone()));
}

#[tokio::test]
async fn test_resume_without_stored_identity() {
    let h = Harness::new().await;
    assert_eq!(h.coordinator.resume_active().await.unwrap(), None);
    assert!(h.coordinator.active_sync().await.is_none());
}
