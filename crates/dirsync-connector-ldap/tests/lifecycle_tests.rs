//! Integration tests for entity lifecycles and the delete guards.

mod common;

use common::*;
use dirsync_connector::dn::Dn;
use dirsync_connector_ldap::ad::{
    ComputerResource, ComputerSpec, DirectoryEntity, GroupResource, GroupSpec,
    OrganizationalUnitResource, OrganizationalUnitSpec,
};

/// Tests that a container with a child cannot be deleted until the child is
/// gone.
#[tokio::test]
async fn test_delete_guard_round_trip() {
    let domain = TestDomain::new();
    let ous = domain.ad.organizational_units();
    let computers = domain.ad.computers();

    let apps = ous
        .create_under_path("Apps", &Dn::new(DOMAIN), "")
        .await
        .unwrap();
    computers
        .create_under_path("web01", &apps.dn, "")
        .await
        .unwrap();

    let err = ous.delete(&apps.dn).await.unwrap_err();
    assert!(err.has_children());
    assert_eq!(err.error_code(), "HAS_CHILDREN");
    assert!(domain.directory.contains(&apps.dn));

    computers.delete("web01").await.unwrap();
    ous.delete(&apps.dn).await.unwrap();
    assert!(!domain.directory.contains(&apps.dn));
}

/// Tests that deleting an entry that is already gone succeeds.
#[tokio::test]
async fn test_delete_is_idempotent() {
    let domain = TestDomain::new();
    let ous = domain.ad.organizational_units();

    ous.delete(&Dn::new("ou=Never,dc=example,dc=com"))
        .await
        .unwrap();
    assert_eq!(domain.write_count(), 0);
}

/// Tests the group delete guard against entries nested below the group.
#[tokio::test]
async fn test_group_delete_guard() {
    let domain = TestDomain::new();
    let groups = GroupResource::new(domain.ad.clone());
    let spec = GroupSpec::new("admins", GROUPS);
    let created = groups.create(&spec).await.unwrap();

    let nested = Dn::new(format!("cn=contact,{}", created.id));
    domain.directory.seed(
        nested.clone(),
        &["contact"],
        dirsync_connector::operation::AttributeMap::new(),
    );

    let err = groups.delete(&spec).await.unwrap_err();
    assert!(err.has_children());

    domain.ad.store().delete_if_present(&nested).await.unwrap();
    groups.delete(&spec).await.unwrap();
    assert!(groups.read(&spec).await.unwrap().is_none());
}

/// Tests a group's full lifecycle with members managed exclusively.
#[tokio::test]
async fn test_group_lifecycle() {
    let domain = TestDomain::new();
    let groups = GroupResource::new(domain.ad.clone());

    let spec = GroupSpec::new("admins", GROUPS)
        .with_description("administrators")
        .with_members(["alice", "bob"]);
    let created = groups.create(&spec).await.unwrap();
    assert_eq!(created.id, "cn=admins,ou=groups,dc=example,dc=com");
    assert_eq!(created.spec.members, vec!["alice", "bob"]);

    // Someone adds carol outside the declaration
    let group = group_dn("admins");
    let mut drift = dirsync_connector::operation::AttributeDelta::new();
    drift.add("member", [user_dn("carol").to_string()]);
    domain
        .ad
        .store()
        .update_deltas(&group, None, &drift)
        .await
        .unwrap();

    let observed = groups.read(&spec).await.unwrap().unwrap();
    assert_eq!(observed.spec.members, vec!["alice", "bob", "carol"]);

    let next = GroupSpec::new("admins", GROUPS)
        .with_description("administrators")
        .with_members(["alice", "dave"]);
    let updated = groups.update(&spec, &next).await.unwrap();
    assert_eq!(updated.spec.members, vec!["alice", "dave"]);
    assert_eq!(domain.members_of(&group).await, members(&["alice", "dave"]));
}

/// Tests that a group ignoring unmanaged members reports only declared ones.
#[tokio::test]
async fn test_group_read_ignoring_unmanaged() {
    let domain = TestDomain::new();
    domain.seed_group("admins", &["alice", "bob", "carol"]);
    let groups = GroupResource::new(domain.ad.clone());

    let spec = GroupSpec::new("admins", GROUPS)
        .with_members(["alice", "dave"])
        .ignoring_unmanaged();
    let observed = groups.read(&spec).await.unwrap().unwrap();
    assert_eq!(observed.spec.members, vec!["alice"]);
}

/// Tests that creating a group with an unknown member writes nothing.
#[tokio::test]
async fn test_group_create_fails_closed() {
    let domain = TestDomain::new();
    let groups = GroupResource::new(domain.ad.clone());

    let spec = GroupSpec::new("admins", GROUPS).with_members(["alice", "ghost"]);
    let err = groups.create(&spec).await.unwrap_err();
    assert_eq!(err.unresolved_members(), Some(&["ghost".to_string()][..]));
    assert_eq!(domain.write_count(), 0);
}

/// Tests that a group with the same name in another container below the
/// search base is an error rather than a silent update.
#[tokio::test]
async fn test_group_create_conflict() {
    let domain = TestDomain::new();
    let groups = domain.groups();
    let nested = Dn::new(format!("ou=Nested,{GROUPS}"));
    domain
        .ad
        .organizational_units()
        .create_under_path("Nested", &Dn::new(GROUPS), "")
        .await
        .unwrap();
    groups
        .create("admins", &nested, "", &members(&[]))
        .await
        .unwrap();

    let err = groups
        .create("admins", &Dn::new(GROUPS), "", &members(&[]))
        .await
        .unwrap_err();
    assert!(err.is_already_exists());
}

/// Tests an organizational unit moving with its children.
#[tokio::test]
async fn test_organizational_unit_moves_subtree() {
    let domain = TestDomain::new();
    let ous = OrganizationalUnitResource::new(domain.ad.clone());
    let computers = ComputerResource::new(domain.ad.clone());

    let apps = OrganizationalUnitSpec::new("Apps", DOMAIN).with_description("applications");
    let created = ous.create(&apps).await.unwrap();
    assert_eq!(created.id, "ou=apps,dc=example,dc=com");
    assert_eq!(created.spec.container, DOMAIN);

    computers
        .create(&ComputerSpec::new("web01", "ou=Apps,dc=example,dc=com"))
        .await
        .unwrap();

    let moved = OrganizationalUnitSpec::new("Apps", SERVERS).with_description("applications");
    let observed = ous.update(&apps, &moved).await.unwrap();
    assert_eq!(observed.id, "ou=apps,ou=servers,dc=example,dc=com");

    let computer = computers
        .read(&ComputerSpec::new("web01", ""))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(computer.spec.container, "ou=apps,ou=servers,dc=example,dc=com");
}

/// Tests the computer lifecycle with idempotent create.
#[tokio::test]
async fn test_computer_lifecycle() {
    let domain = TestDomain::new();
    let computers = ComputerResource::new(domain.ad.clone());

    let spec = ComputerSpec::new("web01", SERVERS).with_description("front end");
    let created = computers.create(&spec).await.unwrap();
    assert_eq!(created.id, "cn=web01,ou=servers,dc=example,dc=com");

    let again = computers
        .create(&spec.clone().with_description("front end v2"))
        .await
        .unwrap();
    assert_eq!(again.spec.description, "front end v2");

    let entry = domain
        .ad
        .computers()
        .get_by_name("web01")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(entry.container(), "ou=servers,dc=example,dc=com");

    computers.delete(&spec).await.unwrap();
    assert!(computers.read(&spec).await.unwrap().is_none());
}
