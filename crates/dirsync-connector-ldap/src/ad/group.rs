//! Security groups
//!
//! Groups are found by account name below a container and created as
//! global security groups. Member names are account names of users or
//! groups below the repository's user base.

use std::collections::BTreeMap;

use tracing::{debug, info, instrument, warn};

use dirsync_connector::dn::{normalize, Dn};
use dirsync_connector::error::{ConnectorError, ConnectorResult, ResultExt};
use dirsync_connector::operation::{AttributeDelta, DirectoryObject, Filter};

use super::members::{managed_members, MemberSet};
use super::schema::{attr, group_type, object_class};
use super::DirectoryEntity;
use crate::store::ObjectStore;

const GROUP_ATTRIBUTES: &[&str] = &[attr::NAME, attr::SAM_ACCOUNT_NAME, attr::DESCRIPTION];

/// A group as read from the directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub name: String,
    pub dn: Dn,
    pub description: String,
    /// The managed subset of the actual members, never the raw list.
    pub members: MemberSet,
}

impl DirectoryEntity for Group {
    fn dn(&self) -> &Dn {
        &self.dn
    }
}

impl Group {
    fn from_object(object: DirectoryObject, members: MemberSet) -> Self {
        let name = object
            .first(attr::SAM_ACCOUNT_NAME)
            .or_else(|| object.first(attr::NAME))
            .map(str::to_string)
            .unwrap_or_else(|| object.dn.rdn_value());
        Self {
            name,
            description: object.first(attr::DESCRIPTION).unwrap_or_default().to_string(),
            dn: object.dn,
            members,
        }
    }
}

/// Group repository.
#[derive(Debug, Clone)]
pub struct GroupRepository {
    store: ObjectStore,
    user_base: Dn,
}

impl GroupRepository {
    /// Member names are looked up below `user_base`.
    pub fn new(store: ObjectStore, user_base: Dn) -> Self {
        Self { store, user_base }
    }

    pub fn store(&self) -> &ObjectStore {
        &self.store
    }

    pub fn user_base(&self) -> &Dn {
        &self.user_base
    }

    /// Identity of group `name` in `container`.
    pub fn identity(name: &str, container: &Dn) -> Dn {
        Dn::from_rdn(attr::CN, name, container)
    }

    /// Find group `name` anywhere below `container`, without members.
    #[instrument(skip(self), fields(container = %container))]
    pub async fn find(&self, name: &str, container: &Dn) -> ConnectorResult<Option<DirectoryObject>> {
        let filter = Filter::named(object_class::GROUP, attr::SAM_ACCOUNT_NAME, name);
        let mut found = self
            .store
            .search(&filter, container, GROUP_ATTRIBUTES)
            .await
            .context(|| format!("get group {name} in {container}"))?;

        match found.len() {
            0 => Ok(None),
            1 => Ok(found.pop()),
            count => Err(ConnectorError::AmbiguousMatch {
                lookup: format!("group {name} in {container}"),
                count,
            }),
        }
    }

    /// Read group `name` below `container`.
    ///
    /// `members` is the managed subset of the group's actual members given
    /// the `declared` names and the unmanaged-member policy.
    pub async fn get(
        &self,
        name: &str,
        container: &Dn,
        declared: &MemberSet,
        ignore_unmanaged: bool,
    ) -> ConnectorResult<Option<Group>> {
        let Some(object) = self.find(name, container).await? else {
            return Ok(None);
        };
        let actual = self.member_names(&object.dn).await?;
        let members = managed_members(&actual, declared, ignore_unmanaged);
        Ok(Some(Group::from_object(object, members)))
    }

    async fn require(&self, name: &str, container: &Dn, action: &str) -> ConnectorResult<DirectoryObject> {
        self.find(name, container).await?.ok_or_else(|| {
            ConnectorError::not_found(format!("group {name}"))
                .with_context(format!("{action} group {name} in {container}"))
        })
    }

    /// Account names of the group's actual members below the user base.
    #[instrument(skip(self), fields(group = %group_dn))]
    pub async fn member_names(&self, group_dn: &Dn) -> ConnectorResult<MemberSet> {
        let filter = Filter::and(vec![
            Filter::or(
                object_class::MEMBER_CLASSES
                    .iter()
                    .map(|class| Filter::eq("objectClass", *class))
                    .collect(),
            ),
            Filter::eq(attr::MEMBER_OF, group_dn.as_str()),
        ]);
        let found = self
            .store
            .search(&filter, &self.user_base, &[attr::SAM_ACCOUNT_NAME])
            .await
            .context(|| format!("get members of group {group_dn}"))?;

        let members: MemberSet = found
            .iter()
            .filter_map(|object| object.first(attr::SAM_ACCOUNT_NAME))
            .collect();
        debug!(members = %members, "group members read");
        Ok(members)
    }

    /// Resolve member names to identities in one search.
    ///
    /// Returns the identities found, in name order, and every name that
    /// matched nothing. A name matching more than one entry is an error.
    #[instrument(skip(self, names), fields(names = %names, user_base = %self.user_base))]
    pub async fn lookup_identities(
        &self,
        names: &MemberSet,
    ) -> ConnectorResult<(Vec<Dn>, Vec<String>)> {
        if names.is_empty() {
            return Ok((Vec::new(), Vec::new()));
        }

        let wanted = names.names();
        let filter = Filter::any_named(
            object_class::MEMBER_CLASSES,
            attr::SAM_ACCOUNT_NAME,
            wanted.as_slice(),
        );
        let found = self
            .store
            .search(&filter, &self.user_base, &[attr::SAM_ACCOUNT_NAME])
            .await
            .context(|| format!("resolve member names {names}"))?;

        let mut by_name: BTreeMap<String, Vec<Dn>> = BTreeMap::new();
        for object in found {
            if let Some(account) = object.first(attr::SAM_ACCOUNT_NAME) {
                by_name.entry(normalize(account)).or_default().push(object.dn);
            }
        }

        let mut resolved = Vec::with_capacity(wanted.len());
        let mut unresolved = Vec::new();
        for name in wanted {
            match by_name.remove(&normalize(&name)) {
                Some(mut dns) if dns.len() == 1 => resolved.extend(dns.pop()),
                Some(dns) => {
                    return Err(ConnectorError::AmbiguousMatch {
                        lookup: format!("member {name}"),
                        count: dns.len(),
                    })
                }
                None => unresolved.push(name),
            }
        }

        debug!(resolved = resolved.len(), unresolved = ?unresolved, "member names resolved");
        Ok((resolved, unresolved))
    }

    /// Resolve member names, failing with `UnresolvedMembers` listing every
    /// name that matched nothing.
    pub async fn resolve_member_identities(&self, names: &MemberSet) -> ConnectorResult<Vec<Dn>> {
        let (resolved, unresolved) = self.lookup_identities(names).await?;
        if !unresolved.is_empty() {
            return Err(ConnectorError::unresolved(unresolved));
        }
        Ok(resolved)
    }

    /// Create group `name` in `container` with the given members.
    ///
    /// Members are resolved before anything is written. If the same group
    /// already exists at exactly that identity only its description is
    /// converged; the same name elsewhere below `container` is an error.
    #[instrument(skip(self, description, members), fields(container = %container, members = %members))]
    pub async fn create(
        &self,
        name: &str,
        container: &Dn,
        description: &str,
        members: &MemberSet,
    ) -> ConnectorResult<Group> {
        let dn = Self::identity(name, container);

        if let Some(existing) = self.find(name, container).await? {
            if existing.dn == dn {
                warn!(dn = %dn, "group already exists, updating description");
                return self.update_description(name, container, description).await;
            }
            return Err(ConnectorError::already_exists(existing.dn.to_string()))
                .context(|| format!("create group {name} in {container}"));
        }

        let member_dns = self
            .resolve_member_identities(members)
            .await
            .context(|| format!("create group {name}"))?;

        let mut attributes = vec![
            (attr::CN.to_string(), vec![name.to_string()]),
            (attr::NAME.to_string(), vec![name.to_string()]),
            (attr::SAM_ACCOUNT_NAME.to_string(), vec![name.to_string()]),
            (
                attr::GROUP_TYPE.to_string(),
                vec![group_type::GLOBAL_SECURITY.to_string()],
            ),
            (
                attr::MEMBER.to_string(),
                member_dns.iter().map(Dn::to_string).collect(),
            ),
        ];
        if !description.is_empty() {
            attributes.push((attr::DESCRIPTION.to_string(), vec![description.to_string()]));
        }

        self.store
            .create_if_absent(&dn, object_class::GROUP_CLASSES, attributes)
            .await
            .context(|| format!("create group {name}"))?;

        info!(dn = %dn, members = member_dns.len(), "group created");
        Ok(Group {
            name: name.to_string(),
            dn,
            description: description.to_string(),
            members: members.clone(),
        })
    }

    /// Set the description; an empty description clears it.
    #[instrument(skip(self, description), fields(container = %container))]
    pub async fn update_description(
        &self,
        name: &str,
        container: &Dn,
        description: &str,
    ) -> ConnectorResult<Group> {
        let object = self.require(name, container, "update description of").await?;
        let mut group = Group::from_object(object, MemberSet::new());
        if group.description == description {
            debug!("description unchanged");
            return Ok(group);
        }

        let mut delta = AttributeDelta::new();
        if description.is_empty() {
            delta.replace(attr::DESCRIPTION, Vec::<String>::new());
        } else {
            delta.replace(attr::DESCRIPTION, [description]);
        }
        self.store
            .update_deltas(&group.dn, None, &delta)
            .await
            .context(|| format!("update description of group {name}"))?;

        group.description = description.to_string();
        Ok(group)
    }

    /// Rename group `name` in `container` to `new_name`.
    ///
    /// The entry is renamed first, then its account name follows.
    #[instrument(skip(self), fields(container = %container))]
    pub async fn rename(&self, name: &str, container: &Dn, new_name: &str) -> ConnectorResult<Dn> {
        let dn = Self::identity(name, container);
        if !self.store.exists(&dn).await? {
            return Err(ConnectorError::not_found(dn.to_string()))
                .context(|| format!("rename group {name}"));
        }
        if name == new_name {
            debug!("group already has the target name");
            return Ok(dn);
        }

        let target = Self::identity(new_name, container);
        let new_dn = self
            .store
            .move_entry(&dn, target.rdn(), None)
            .await
            .context(|| format!("rename group {name}"))?;

        let mut delta = AttributeDelta::new();
        delta.replace(attr::SAM_ACCOUNT_NAME, [new_name]);
        self.store
            .update_deltas(&new_dn, None, &delta)
            .await
            .context(|| format!("rename account of group {name}"))?;

        info!(dn = %new_dn, "group renamed");
        Ok(new_dn)
    }

    /// Move group `name` from `container` to `new_container`. No-op when
    /// the target identity is the current one.
    #[instrument(skip(self), fields(container = %container, new_container = %new_container))]
    pub async fn move_to(&self, name: &str, container: &Dn, new_container: &Dn) -> ConnectorResult<Dn> {
        let dn = Self::identity(name, container);
        let Some(object) = self.store.get(&dn, &[attr::CN]).await? else {
            return Err(ConnectorError::not_found(dn.to_string()))
                .context(|| format!("move group {name}"));
        };

        let target = Self::identity(name, new_container);
        if object.dn == target {
            debug!("group is already in the target container");
            return Ok(object.dn);
        }

        let new_dn = self
            .store
            .move_entry(&object.dn, target.rdn(), Some(new_container))
            .await
            .context(|| format!("move group {name}"))?;

        info!(dn = %new_dn, "group moved");
        Ok(new_dn)
    }

    /// Delete the group at `dn`.
    ///
    /// Refused when a subtree search at the group finds anything other than
    /// the group itself. An absent group is not an error.
    #[instrument(skip(self), fields(dn = %dn))]
    pub async fn delete(&self, dn: &Dn) -> ConnectorResult<()> {
        self.store
            .delete_if_present(dn)
            .await
            .context(|| format!("delete group {dn}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::DirectoryClient;
    use dirsync_connector::memory::InMemoryDirectory;
    use dirsync_connector::operation::AttributeMap;
    use std::sync::Arc;

    fn fixture() -> (Arc<InMemoryDirectory>, GroupRepository) {
        let dir = Arc::new(InMemoryDirectory::new("test"));
        dir.seed("dc=example,dc=com", &["domain"], AttributeMap::new());
        dir.seed("ou=Groups,dc=example,dc=com", &["organizationalUnit"], AttributeMap::new());
        dir.seed("ou=Users,dc=example,dc=com", &["organizationalUnit"], AttributeMap::new());
        for user in ["alice", "bob", "carol"] {
            dir.seed(
                format!("cn={user},ou=Users,dc=example,dc=com"),
                &["user"],
                AttributeMap::new().with("sAMAccountName", [user]),
            );
        }
        let store = ObjectStore::new(DirectoryClient::new(dir.clone()));
        (dir, GroupRepository::new(store, Dn::new("dc=example,dc=com")))
    }

    fn groups_ou() -> Dn {
        Dn::new("ou=Groups,dc=example,dc=com")
    }

    fn set(names: &[&str]) -> MemberSet {
        names.iter().copied().collect()
    }

    #[tokio::test]
    async fn test_create_with_members() {
        let (dir, repo) = fixture();
        let group = repo
            .create("admins", &groups_ou(), "administrators", &set(&["alice", "Bob"]))
            .await
            .unwrap();

        let entry = dir.get(&group.dn).unwrap();
        assert!(entry.has_object_class("group"));
        assert_eq!(entry.first("groupType"), Some("-2147483646"));
        assert_eq!(entry.first("sAMAccountName"), Some("admins"));
        assert_eq!(entry.values("member").len(), 2);

        let read = repo
            .get("ADMINS", &groups_ou(), &set(&[]), false)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(read.name, "admins");
        assert_eq!(read.description, "administrators");
        assert_eq!(read.members, set(&["alice", "bob"]));
    }

    #[tokio::test]
    async fn test_create_reports_every_unresolved_member() {
        let (dir, repo) = fixture();
        let err = repo
            .create("admins", &groups_ou(), "", &set(&["ghost", "alice", "phantom"]))
            .await
            .unwrap_err();
        assert_eq!(
            err.unresolved_members(),
            Some(&["ghost".to_string(), "phantom".to_string()][..])
        );
        assert!(dir.writes().is_empty());
    }

    #[tokio::test]
    async fn test_create_existing_converges_description() {
        let (dir, repo) = fixture();
        repo.create("admins", &groups_ou(), "", &set(&[])).await.unwrap();
        let group = repo
            .create("admins", &groups_ou(), "described", &set(&[]))
            .await
            .unwrap();
        assert_eq!(group.description, "described");
        assert_eq!(dir.writes().len(), 2);
    }

    #[tokio::test]
    async fn test_get_applies_managed_member_policy() {
        let (_, repo) = fixture();
        repo.create("admins", &groups_ou(), "", &set(&["alice", "bob", "carol"]))
            .await
            .unwrap();

        let declared = set(&["alice", "dave"]);
        let lenient = repo
            .get("admins", &groups_ou(), &declared, true)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(lenient.members, set(&["alice"]));

        let strict = repo
            .get("admins", &groups_ou(), &declared, false)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(strict.members, set(&["alice", "bob", "carol"]));
    }

    #[tokio::test]
    async fn test_member_names_respect_user_base() {
        let (dir, repo) = fixture();
        dir.seed("ou=Other,dc=example,dc=com", &["organizationalUnit"], AttributeMap::new());
        dir.seed(
            "cn=dave,ou=Other,dc=example,dc=com",
            &["user"],
            AttributeMap::new().with("sAMAccountName", ["dave"]),
        );
        let group = repo
            .create("admins", &groups_ou(), "", &set(&["alice", "dave"]))
            .await
            .unwrap();

        let narrow = GroupRepository::new(repo.store().clone(), Dn::new("ou=Users,dc=example,dc=com"));
        assert_eq!(narrow.member_names(&group.dn).await.unwrap(), set(&["alice"]));

        let err = narrow
            .resolve_member_identities(&set(&["dave"]))
            .await
            .unwrap_err();
        assert_eq!(err.unresolved_members(), Some(&["dave".to_string()][..]));
    }

    #[tokio::test]
    async fn test_lookup_identities_rejects_duplicates() {
        let (dir, repo) = fixture();
        dir.seed(
            "cn=alice2,ou=Groups,dc=example,dc=com",
            &["user"],
            AttributeMap::new().with("sAMAccountName", ["alice"]),
        );
        let err = repo.lookup_identities(&set(&["alice"])).await.unwrap_err();
        assert_eq!(err.error_code(), "AMBIGUOUS_MATCH");
    }

    #[tokio::test]
    async fn test_rename_then_move() {
        let (dir, repo) = fixture();
        repo.create("admins", &groups_ou(), "", &set(&["alice"]))
            .await
            .unwrap();

        let renamed = repo.rename("admins", &groups_ou(), "operators").await.unwrap();
        assert_eq!(renamed.as_str(), "cn=operators,ou=Groups,dc=example,dc=com");
        assert_eq!(dir.get(&renamed).unwrap().first("sAMAccountName"), Some("operators"));
        assert!(repo.find("admins", &groups_ou()).await.unwrap().is_none());

        dir.clear_writes();
        let same = repo
            .move_to("operators", &groups_ou(), &Dn::new("OU=groups,DC=example,DC=com"))
            .await
            .unwrap();
        assert_eq!(same, renamed);
        assert!(dir.writes().is_empty());

        let users = Dn::new("ou=Users,dc=example,dc=com");
        let moved = repo.move_to("operators", &groups_ou(), &users).await.unwrap();
        assert_eq!(moved.normalized(), "cn=operators,ou=users,dc=example,dc=com");
        assert_eq!(repo.member_names(&moved).await.unwrap(), set(&["alice"]));
    }

    #[tokio::test]
    async fn test_delete_guard() {
        let (dir, repo) = fixture();
        let group = repo.create("admins", &groups_ou(), "", &set(&[])).await.unwrap();
        let nested = Dn::new(format!("cn=nested,{}", group.dn));
        dir.seed(nested.clone(), &["contact"], AttributeMap::new());

        let err = repo.delete(&group.dn).await.unwrap_err();
        assert!(err.has_children());
        assert!(dir.contains(&group.dn));

        repo.store().delete_if_present(&nested).await.unwrap();
        repo.delete(&group.dn).await.unwrap();
        assert!(!dir.contains(&group.dn));
    }
}
