//! Common test utilities for dirsync-connector-ldap integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use dirsync_connector::dn::Dn;
use dirsync_connector::memory::InMemoryDirectory;
use dirsync_connector::operation::AttributeMap;
use dirsync_connector_ldap::ad::{ActiveDirectory, GroupRepository, MemberSet};

pub const DOMAIN: &str = "dc=example,dc=com";
pub const GROUPS: &str = "ou=Groups,dc=example,dc=com";
pub const USERS: &str = "ou=Users,dc=example,dc=com";
pub const SERVERS: &str = "ou=Servers,dc=example,dc=com";

/// Users seeded under `USERS`.
pub const SEEDED_USERS: &[&str] = &["alice", "bob", "carol", "dave"];

/// A seeded domain with Groups, Users and Servers containers.
pub struct TestDomain {
    pub directory: Arc<InMemoryDirectory>,
    pub ad: ActiveDirectory,
}

impl TestDomain {
    pub fn new() -> Self {
        let directory = Arc::new(InMemoryDirectory::new("test domain"));
        directory.seed(DOMAIN, &["domain"], AttributeMap::new());
        for container in [GROUPS, USERS, SERVERS] {
            directory.seed(container, &["organizationalUnit", "top"], AttributeMap::new());
        }
        for user in SEEDED_USERS {
            directory.seed(user_dn(user), &["user"], AttributeMap::new().with("sAMAccountName", [*user]));
        }

        let ad = ActiveDirectory::new(directory.clone(), Dn::new(DOMAIN)).with_user_base(Dn::new(USERS));
        Self { directory, ad }
    }

    /// Seed a group directly, bypassing the repositories and the write log.
    pub fn seed_group(&self, name: &str, members: &[&str]) -> Dn {
        let dn = group_dn(name);
        let member_dns: Vec<String> = members.iter().map(|m| user_dn(m).to_string()).collect();
        let mut attributes = AttributeMap::new().with("sAMAccountName", [name]);
        if !member_dns.is_empty() {
            attributes.set("member", member_dns);
        }
        self.directory.seed(dn.clone(), &["group", "top"], attributes);
        dn
    }

    pub fn groups(&self) -> GroupRepository {
        self.ad.groups()
    }

    /// Actual member names of the group, read through the repository.
    pub async fn members_of(&self, group: &Dn) -> MemberSet {
        self.groups().member_names(group).await.unwrap()
    }

    pub fn write_count(&self) -> usize {
        self.directory.writes().len()
    }
}

pub fn user_dn(name: &str) -> Dn {
    Dn::new(format!("cn={name},{USERS}"))
}

pub fn group_dn(name: &str) -> Dn {
    Dn::new(format!("cn={name},{GROUPS}"))
}

pub fn members(names: &[&str]) -> MemberSet {
    names.iter().copied().collect()
}
