//! Integration tests for group membership reconciliation.

mod common;

use common::*;
use dirsync_connector::memory::DirectoryWrite;
use dirsync_connector::operation::Modification;
use dirsync_connector_ldap::ad::ReconcileOutcome;

/// Tests that reconciling the recorded state against a converged group
/// issues no write at all.
#[tokio::test]
async fn test_reconcile_is_idempotent() {
    let domain = TestDomain::new();
    let group = domain.seed_group("admins", &["alice", "bob"]);
    let declared = members(&["alice", "bob"]);

    let outcome = domain
        .ad
        .reconciler()
        .reconcile(&group, &declared, &declared, false)
        .await
        .unwrap();

    assert_eq!(outcome, ReconcileOutcome::Unchanged);
    assert_eq!(domain.write_count(), 0);
}

/// Tests that a second reconciliation after a successful one is a no-op.
#[tokio::test]
async fn test_reconcile_converges() {
    let domain = TestDomain::new();
    let group = domain.seed_group("admins", &["alice", "bob"]);
    let reconciler = domain.ad.reconciler();
    let old = members(&["alice", "bob"]);
    let new = members(&["bob", "carol"]);

    let first = reconciler.reconcile(&group, &old, &new, false).await.unwrap();
    assert!(!first.is_unchanged());
    assert_eq!(domain.members_of(&group).await, new);

    let writes = domain.write_count();
    let second = reconciler.reconcile(&group, &new, &new, false).await.unwrap();
    assert!(second.is_unchanged());
    assert_eq!(domain.write_count(), writes);
}

/// Tests that undeclared members are removed when the declaration is
/// exclusive.
#[tokio::test]
async fn test_unmanaged_members_removed() {
    let domain = TestDomain::new();
    let group = domain.seed_group("admins", &["alice", "bob", "carol"]);
    let declared = members(&["alice"]);

    let outcome = domain
        .ad
        .reconciler()
        .reconcile(&group, &declared, &declared, false)
        .await
        .unwrap();

    match outcome {
        ReconcileOutcome::Applied { added, removed } => {
            assert!(added.is_empty());
            assert_eq!(removed, vec![user_dn("bob"), user_dn("carol")]);
        }
        ReconcileOutcome::Unchanged => panic!("expected drift to be removed"),
    }
    assert_eq!(domain.members_of(&group).await, declared);
    assert_eq!(domain.write_count(), 1);
}

/// Tests that undeclared members survive when unmanaged members are ignored.
#[tokio::test]
async fn test_unmanaged_members_preserved() {
    let domain = TestDomain::new();
    let group = domain.seed_group("admins", &["alice", "bob", "carol"]);
    let declared = members(&["alice"]);

    let outcome = domain
        .ad
        .reconciler()
        .reconcile(&group, &declared, &declared, true)
        .await
        .unwrap();

    assert!(outcome.is_unchanged());
    assert_eq!(domain.write_count(), 0);
    assert_eq!(domain.members_of(&group).await, members(&["alice", "bob", "carol"]));
}

/// Tests that ignoring unmanaged members still removes members that were
/// declared before and are no longer.
#[tokio::test]
async fn test_declared_removal_applies_when_ignoring_unmanaged() {
    let domain = TestDomain::new();
    let group = domain.seed_group("admins", &["alice", "bob", "carol"]);

    domain
        .ad
        .reconciler()
        .reconcile(&group, &members(&["alice", "bob"]), &members(&["alice"]), true)
        .await
        .unwrap();

    assert_eq!(domain.members_of(&group).await, members(&["alice", "carol"]));
}

/// Tests that a new declaration adds exactly the resolved identity.
#[tokio::test]
async fn test_new_member_is_added() {
    let domain = TestDomain::new();
    let group = domain.seed_group("admins", &[]);

    let outcome = domain
        .ad
        .reconciler()
        .reconcile(&group, &members(&[]), &members(&["alice"]), false)
        .await
        .unwrap();

    assert_eq!(
        outcome,
        ReconcileOutcome::Applied {
            added: vec![user_dn("alice")],
            removed: vec![],
        }
    );
    let writes = domain.directory.writes();
    assert_eq!(writes.len(), 1);
    match &writes[0] {
        DirectoryWrite::Modify { dn, modifications } => {
            assert_eq!(*dn, group);
            assert_eq!(
                modifications,
                &vec![Modification::Add(
                    "member".to_string(),
                    vec![user_dn("alice").to_string()]
                )]
            );
        }
        other => panic!("unexpected write {other:?}"),
    }
}

/// Tests that a member already gone from the directory is not removed again.
#[tokio::test]
async fn test_absent_member_not_removed() {
    let domain = TestDomain::new();
    let group = domain.seed_group("admins", &[]);

    let outcome = domain
        .ad
        .reconciler()
        .reconcile(&group, &members(&["bob"]), &members(&[]), false)
        .await
        .unwrap();

    assert!(outcome.is_unchanged());
    assert_eq!(domain.write_count(), 0);
}

/// Tests that an unresolvable member fails the whole call before any write.
#[tokio::test]
async fn test_unresolved_member_fails_closed() {
    let domain = TestDomain::new();
    let group = domain.seed_group("admins", &["alice"]);

    let err = domain
        .ad
        .reconciler()
        .reconcile(
            &group,
            &members(&["alice"]),
            &members(&["alice", "ghost", "bob", "phantom"]),
            false,
        )
        .await
        .unwrap_err();

    assert_eq!(
        err.unresolved_members(),
        Some(&["ghost".to_string(), "phantom".to_string()][..])
    );
    assert_eq!(err.error_code(), "UNRESOLVED_MEMBER");
    assert_eq!(domain.write_count(), 0);
    assert_eq!(domain.members_of(&group).await, members(&["alice"]));
}

/// Tests that only `ghost` is reported for the minimal unresolved case.
#[tokio::test]
async fn test_single_unresolved_member() {
    let domain = TestDomain::new();
    let group = domain.seed_group("admins", &[]);

    let err = domain
        .ad
        .reconciler()
        .reconcile(&group, &members(&[]), &members(&["ghost"]), false)
        .await
        .unwrap_err();

    assert_eq!(err.unresolved_members(), Some(&["ghost".to_string()][..]));
    assert_eq!(domain.write_count(), 0);
}

/// Tests that a member declared before and still declared, but missing from
/// the directory, is not re-added.
#[tokio::test]
async fn test_previously_declared_member_not_readded() {
    let domain = TestDomain::new();
    let group = domain.seed_group("admins", &[]);
    let declared = members(&["carol"]);

    let outcome = domain
        .ad
        .reconciler()
        .reconcile(&group, &declared, &declared, false)
        .await
        .unwrap();

    assert!(outcome.is_unchanged());
    assert_eq!(domain.write_count(), 0);
    assert!(domain.members_of(&group).await.is_empty());
}

/// Tests that additions and removals travel in a single modify.
#[tokio::test]
async fn test_add_and_remove_in_one_modify() {
    let domain = TestDomain::new();
    let group = domain.seed_group("admins", &["alice", "bob"]);

    domain
        .ad
        .reconciler()
        .reconcile(
            &group,
            &members(&["alice", "bob"]),
            &members(&["bob", "carol", "dave"]),
            false,
        )
        .await
        .unwrap();

    let writes = domain.directory.writes();
    assert_eq!(writes.len(), 1);
    assert!(matches!(
        &writes[0],
        DirectoryWrite::Modify { modifications, .. } if modifications.len() == 2
    ));
    assert_eq!(domain.members_of(&group).await, members(&["bob", "carol", "dave"]));
}

/// Tests that member names compare case-insensitively against the directory.
#[tokio::test]
async fn test_member_names_are_case_insensitive() {
    let domain = TestDomain::new();
    let group = domain.seed_group("admins", &["alice"]);
    let declared = members(&["ALICE"]);

    let outcome = domain
        .ad
        .reconciler()
        .reconcile(&group, &declared, &declared, false)
        .await
        .unwrap();

    assert!(outcome.is_unchanged());
}

/// Tests that reconciling a missing group is a not-found failure.
#[tokio::test]
async fn test_missing_group_is_not_found() {
    let domain = TestDomain::new();

    let err = domain
        .ad
        .reconciler()
        .reconcile(&group_dn("nobody"), &members(&[]), &members(&["alice"]), false)
        .await
        .unwrap_err();

    assert!(err.is_not_found());
    assert_eq!(domain.write_count(), 0);
}

/// Tests that a transport failure surfaces verbatim with context.
#[tokio::test]
async fn test_transport_failure_propagates() {
    use dirsync_connector::traits::Connector;

    let domain = TestDomain::new();
    let group = domain.seed_group("admins", &[]);
    domain.directory.dispose().await.unwrap();

    let err = domain
        .ad
        .reconciler()
        .reconcile(&group, &members(&[]), &members(&["alice"]), false)
        .await
        .unwrap_err();

    assert_eq!(err.error_code(), "TRANSPORT");
    assert!(err.to_string().contains("reconcile members of"));
}
