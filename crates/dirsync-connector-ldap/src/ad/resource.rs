//! Resource lifecycle drivers
//!
//! Create/read/update/delete entry points for declarative callers. Each
//! driver takes the previously applied spec and the desired spec, performs
//! the changes in parts, then reads the entry back so the caller records
//! what the directory actually holds.
//!
//! Names and containers compare case-insensitively: a change in case alone
//! is not a change.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use dirsync_connector::dn::{normalize, Dn};
use dirsync_connector::error::{ConnectorError, ConnectorResult};
use dirsync_connector::operation::{AttributeDelta, AttributeMap};

use super::members::{MemberSet, MembershipReconciler};
use super::{
    ActiveDirectory, ComputerRepository, DirectoryEntity, GroupRepository,
    OrganizationalUnitRepository,
};

/// State read back after an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observed<S> {
    /// Lowercase identity.
    pub id: String,
    /// The spec as the directory holds it. Containers are lowercase.
    pub spec: S,
}

fn changed(old: &str, new: &str) -> bool {
    normalize(old) != normalize(new)
}

fn vanished(what: String) -> ConnectorError {
    ConnectorError::not_found(what.clone()).with_context(format!("read back {what}"))
}

// ---------------------------------------------------------------------------
// Groups
// ---------------------------------------------------------------------------

/// Declared state of a security group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSpec {
    /// Account name, also used as the common name.
    pub name: String,
    /// Container the group is created in.
    pub container: String,
    /// Base for member name lookups; the configured user base when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_base: Option<String>,
    #[serde(default)]
    pub description: String,
    /// Member account names.
    #[serde(default)]
    pub members: Vec<String>,
    /// Leave members added outside this spec alone.
    #[serde(default)]
    pub ignore_unmanaged: bool,
}

impl GroupSpec {
    pub fn new(name: impl Into<String>, container: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            container: container.into(),
            user_base: None,
            description: String::new(),
            members: Vec::new(),
            ignore_unmanaged: false,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn with_members<I, S>(mut self, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.members = members.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_user_base(mut self, user_base: impl Into<String>) -> Self {
        self.user_base = Some(user_base.into());
        self
    }

    #[must_use]
    pub fn ignoring_unmanaged(mut self) -> Self {
        self.ignore_unmanaged = true;
        self
    }

    pub fn container_dn(&self) -> Dn {
        Dn::new(self.container.as_str())
    }

    /// Members as a set; empty names are dropped.
    pub fn member_set(&self) -> MemberSet {
        self.members.iter().map(String::as_str).collect()
    }
}

/// Group lifecycle.
#[derive(Debug, Clone)]
pub struct GroupResource {
    ad: ActiveDirectory,
}

impl GroupResource {
    pub fn new(ad: ActiveDirectory) -> Self {
        Self { ad }
    }

    fn groups(&self, spec: &GroupSpec) -> GroupRepository {
        match spec.user_base.as_deref().filter(|base| !base.is_empty()) {
            Some(base) => self.ad.groups_with_user_base(&Dn::new(base)),
            None => self.ad.groups(),
        }
    }

    #[instrument(skip(self, spec), fields(name = %spec.name, container = %spec.container))]
    pub async fn create(&self, spec: &GroupSpec) -> ConnectorResult<Observed<GroupSpec>> {
        self.groups(spec)
            .create(
                &spec.name,
                &spec.container_dn(),
                &spec.description,
                &spec.member_set(),
            )
            .await?;
        self.read(spec)
            .await?
            .ok_or_else(|| vanished(format!("group {}", spec.name)))
    }

    /// `None` when the group no longer exists.
    #[instrument(skip(self, spec), fields(name = %spec.name, container = %spec.container))]
    pub async fn read(&self, spec: &GroupSpec) -> ConnectorResult<Option<Observed<GroupSpec>>> {
        let group = self
            .groups(spec)
            .get(
                &spec.name,
                &spec.container_dn(),
                &spec.member_set(),
                spec.ignore_unmanaged,
            )
            .await?;

        let Some(group) = group else {
            info!("group no longer exists");
            return Ok(None);
        };

        Ok(Some(Observed {
            id: group.id(),
            spec: GroupSpec {
                container: group.container(),
                members: group.members.names(),
                name: group.name,
                description: group.description,
                user_base: spec.user_base.as_ref().map(|base| base.to_lowercase()),
                ignore_unmanaged: spec.ignore_unmanaged,
            },
        }))
    }

    /// Apply `new` over `old`: members, then name, then container, then
    /// description.
    ///
    /// Members are reconciled on the group at its old name and container,
    /// since nothing else has moved yet, resolving names under the new user
    /// base.
    #[instrument(skip(self, old, new), fields(name = %new.name, container = %new.container))]
    pub async fn update(
        &self,
        old: &GroupSpec,
        new: &GroupSpec,
    ) -> ConnectorResult<Observed<GroupSpec>> {
        let old_container = old.container_dn();
        let new_container = new.container_dn();

        let (old_members, new_members) = (old.member_set(), new.member_set());
        if old_members != new_members {
            let groups = self.groups(new);
            let group = groups
                .find(&old.name, &old_container)
                .await?
                .ok_or_else(|| {
                    ConnectorError::not_found(format!("group {}", old.name))
                        .with_context(format!("update members of group {}", old.name))
                })?;
            MembershipReconciler::new(groups)
                .reconcile(&group.dn, &old_members, &new_members, new.ignore_unmanaged)
                .await?;
        }

        let groups = self.groups(new);
        if changed(&old.name, &new.name) {
            groups.rename(&old.name, &old_container, &new.name).await?;
        }
        if old_container != new_container {
            groups
                .move_to(&new.name, &old_container, &new_container)
                .await?;
        }
        if old.description != new.description {
            groups
                .update_description(&new.name, &new_container, &new.description)
                .await?;
        }

        self.read(new)
            .await?
            .ok_or_else(|| vanished(format!("group {}", new.name)))
    }

    /// Delete the group. Refused while anything lives below it.
    #[instrument(skip(self, spec), fields(name = %spec.name, container = %spec.container))]
    pub async fn delete(&self, spec: &GroupSpec) -> ConnectorResult<()> {
        let dn = GroupRepository::identity(&spec.name, &spec.container_dn());
        self.groups(spec).delete(&dn).await
    }
}

// ---------------------------------------------------------------------------
// Organizational units
// ---------------------------------------------------------------------------

/// Declared state of an organizational unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationalUnitSpec {
    pub name: String,
    /// Parent container.
    pub container: String,
    #[serde(default)]
    pub description: String,
}

impl OrganizationalUnitSpec {
    pub fn new(name: impl Into<String>, container: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            container: container.into(),
            description: String::new(),
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn container_dn(&self) -> Dn {
        Dn::new(self.container.as_str())
    }

    pub fn identity(&self) -> Dn {
        OrganizationalUnitRepository::identity(&self.name, &self.container_dn())
    }
}

/// Organizational unit lifecycle.
#[derive(Debug, Clone)]
pub struct OrganizationalUnitResource {
    ous: OrganizationalUnitRepository,
}

impl OrganizationalUnitResource {
    pub fn new(ad: ActiveDirectory) -> Self {
        Self {
            ous: ad.organizational_units(),
        }
    }

    #[instrument(skip(self, spec), fields(name = %spec.name, container = %spec.container))]
    pub async fn create(
        &self,
        spec: &OrganizationalUnitSpec,
    ) -> ConnectorResult<Observed<OrganizationalUnitSpec>> {
        self.ous
            .create_under_path(&spec.name, &spec.container_dn(), &spec.description)
            .await?;
        self.read(spec)
            .await?
            .ok_or_else(|| vanished(format!("organizational unit {}", spec.name)))
    }

    #[instrument(skip(self, spec), fields(name = %spec.name, container = %spec.container))]
    pub async fn read(
        &self,
        spec: &OrganizationalUnitSpec,
    ) -> ConnectorResult<Option<Observed<OrganizationalUnitSpec>>> {
        let Some(ou) = self.ous.get(&spec.identity()).await? else {
            info!("organizational unit no longer exists");
            return Ok(None);
        };
        Ok(Some(Observed {
            id: ou.id(),
            spec: OrganizationalUnitSpec {
                container: ou.container(),
                name: ou.name,
                description: ou.description,
            },
        }))
    }

    /// Apply `new` over `old`: description, then name, then container.
    #[instrument(skip(self, old, new), fields(name = %new.name, container = %new.container))]
    pub async fn update(
        &self,
        old: &OrganizationalUnitSpec,
        new: &OrganizationalUnitSpec,
    ) -> ConnectorResult<Observed<OrganizationalUnitSpec>> {
        let mut dn = old.identity();

        if old.description != new.description {
            self.ous.update_description(&dn, &new.description).await?;
        }
        if changed(&old.name, &new.name) {
            dn = self.ous.rename(&dn, &new.name).await?.dn;
        }
        if old.container_dn() != new.container_dn() {
            self.ous.move_to(&dn, &new.container_dn()).await?;
        }

        self.read(new)
            .await?
            .ok_or_else(|| vanished(format!("organizational unit {}", new.name)))
    }

    /// Delete the OU. Refused while it has children.
    #[instrument(skip(self, spec), fields(name = %spec.name, container = %spec.container))]
    pub async fn delete(&self, spec: &OrganizationalUnitSpec) -> ConnectorResult<()> {
        self.ous.delete(&spec.identity()).await
    }
}

// ---------------------------------------------------------------------------
// Computers
// ---------------------------------------------------------------------------

/// Declared state of a computer account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputerSpec {
    pub name: String,
    /// Container the account is created in.
    pub container: String,
    #[serde(default)]
    pub description: String,
}

impl ComputerSpec {
    pub fn new(name: impl Into<String>, container: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            container: container.into(),
            description: String::new(),
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn container_dn(&self) -> Dn {
        Dn::new(self.container.as_str())
    }
}

/// Computer account lifecycle.
#[derive(Debug, Clone)]
pub struct ComputerResource {
    computers: ComputerRepository,
}

impl ComputerResource {
    pub fn new(ad: ActiveDirectory) -> Self {
        Self {
            computers: ad.computers(),
        }
    }

    #[instrument(skip(self, spec), fields(name = %spec.name, container = %spec.container))]
    pub async fn create(&self, spec: &ComputerSpec) -> ConnectorResult<Observed<ComputerSpec>> {
        self.computers
            .create_under_path(&spec.name, &spec.container_dn(), &spec.description)
            .await?;
        self.read(spec)
            .await?
            .ok_or_else(|| vanished(format!("computer {}", spec.name)))
    }

    /// The computer is looked up by name across the domain, so a computer
    /// moved elsewhere reads back with its actual container.
    #[instrument(skip(self, spec), fields(name = %spec.name))]
    pub async fn read(&self, spec: &ComputerSpec) -> ConnectorResult<Option<Observed<ComputerSpec>>> {
        let Some(computer) = self.computers.get_by_name(&spec.name).await? else {
            info!("computer no longer exists");
            return Ok(None);
        };
        Ok(Some(Observed {
            id: computer.id(),
            spec: ComputerSpec {
                container: computer.container(),
                name: computer.name,
                description: computer.description,
            },
        }))
    }

    /// Apply `new` over `old`: description, then name, then container.
    #[instrument(skip(self, old, new), fields(name = %new.name, container = %new.container))]
    pub async fn update(
        &self,
        old: &ComputerSpec,
        new: &ComputerSpec,
    ) -> ConnectorResult<Observed<ComputerSpec>> {
        if old.description != new.description {
            self.computers
                .update_description(&old.name, &new.description)
                .await?;
        }
        if changed(&old.name, &new.name) {
            self.computers.rename(&old.name, &new.name).await?;
        }
        if old.container_dn() != new.container_dn() {
            self.computers
                .move_to(&new.name, &new.container_dn())
                .await?;
        }

        self.read(new)
            .await?
            .ok_or_else(|| vanished(format!("computer {}", new.name)))
    }

    #[instrument(skip(self, spec), fields(name = %spec.name))]
    pub async fn delete(&self, spec: &ComputerSpec) -> ConnectorResult<()> {
        self.computers.delete(&spec.name).await
    }
}

// ---------------------------------------------------------------------------
// Generic objects
// ---------------------------------------------------------------------------

/// Declared state of an arbitrary directory entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectSpec {
    pub dn: String,
    pub object_classes: Vec<String>,
    /// Managed attributes. Attributes not listed here are left alone.
    #[serde(default)]
    pub attributes: BTreeMap<String, Vec<String>>,
}

impl ObjectSpec {
    pub fn new<I, S>(dn: impl Into<String>, object_classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            dn: dn.into(),
            object_classes: object_classes.into_iter().map(Into::into).collect(),
            attributes: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_attribute<I, S>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes
            .insert(name.into(), values.into_iter().map(Into::into).collect());
        self
    }

    pub fn identity(&self) -> Dn {
        Dn::new(self.dn.as_str())
    }

    fn attribute_map(&self) -> AttributeMap {
        self.attributes
            .iter()
            .filter(|(name, _)| !name.eq_ignore_ascii_case("objectClass"))
            .map(|(name, values)| (name.clone(), values.clone()))
            .collect()
    }

    fn class_set(&self) -> MemberSet {
        self.object_classes.iter().map(String::as_str).collect()
    }
}

/// Generic object lifecycle.
#[derive(Debug, Clone)]
pub struct ObjectResource {
    ad: ActiveDirectory,
}

impl ObjectResource {
    pub fn new(ad: ActiveDirectory) -> Self {
        Self { ad }
    }

    #[instrument(skip(self, spec), fields(dn = %spec.dn))]
    pub async fn create(&self, spec: &ObjectSpec) -> ConnectorResult<Observed<ObjectSpec>> {
        let classes: Vec<&str> = spec.object_classes.iter().map(String::as_str).collect();
        let attributes = spec
            .attribute_map()
            .iter()
            .map(|(name, values)| (name.clone(), values.clone()))
            .collect();

        self.ad
            .store()
            .create_if_absent(&spec.identity(), &classes, attributes)
            .await?;
        self.read(spec)
            .await?
            .ok_or_else(|| vanished(format!("object {}", spec.dn)))
    }

    /// Only the attributes named in `spec` are read back.
    #[instrument(skip(self, spec), fields(dn = %spec.dn))]
    pub async fn read(&self, spec: &ObjectSpec) -> ConnectorResult<Option<Observed<ObjectSpec>>> {
        let Some(object) = self.ad.store().get(&spec.identity(), &[]).await? else {
            info!("object no longer exists");
            return Ok(None);
        };

        let attributes = spec
            .attributes
            .keys()
            .filter(|name| !name.eq_ignore_ascii_case("objectClass"))
            .filter_map(|name| {
                object
                    .attributes
                    .get(name)
                    .map(|values| (name.clone(), values.clone()))
            })
            .collect();

        Ok(Some(Observed {
            id: object.dn.normalized(),
            spec: ObjectSpec {
                dn: object.dn.normalized(),
                object_classes: object.values("objectClass").to_vec(),
                attributes,
            },
        }))
    }

    /// Apply the attribute delta between `old` and `new` in one modify,
    /// replacing object classes when they changed.
    #[instrument(skip(self, old, new), fields(dn = %new.dn))]
    pub async fn update(
        &self,
        old: &ObjectSpec,
        new: &ObjectSpec,
    ) -> ConnectorResult<Observed<ObjectSpec>> {
        if old.identity() != new.identity() {
            return Err(ConnectorError::InvalidData {
                message: format!("cannot change identity {} to {} in place", old.dn, new.dn),
            });
        }

        let class_names: Vec<&str> = new.object_classes.iter().map(String::as_str).collect();
        let classes = (old.class_set() != new.class_set()).then_some(class_names.as_slice());
        let delta = AttributeDelta::between(&old.attribute_map(), &new.attribute_map());

        if classes.is_some() || !delta.is_empty() {
            self.ad
                .store()
                .update_deltas(&new.identity(), classes, &delta)
                .await?;
        } else {
            warn!("no changes to apply");
        }

        self.read(new)
            .await?
            .ok_or_else(|| vanished(format!("object {}", new.dn)))
    }

    #[instrument(skip(self, spec), fields(dn = %spec.dn))]
    pub async fn delete(&self, spec: &ObjectSpec) -> ConnectorResult<()> {
        self.ad.store().delete_if_present(&spec.identity()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dirsync_connector::memory::InMemoryDirectory;
    use std::sync::Arc;

    fn fixture() -> (Arc<InMemoryDirectory>, ActiveDirectory) {
        let dir = Arc::new(InMemoryDirectory::new("test"));
        dir.seed("dc=example,dc=com", &["domain"], AttributeMap::new());
        for ou in ["Groups", "Users", "Servers", "Archive"] {
            dir.seed(
                format!("ou={ou},dc=example,dc=com"),
                &["organizationalUnit"],
                AttributeMap::new(),
            );
        }
        for user in ["alice", "bob"] {
            dir.seed(
                format!("cn={user},ou=Users,dc=example,dc=com"),
                &["user"],
                AttributeMap::new().with("sAMAccountName", [user]),
            );
        }
        let ad = ActiveDirectory::new(dir.clone(), Dn::new("dc=example,dc=com"));
        (dir, ad)
    }

    #[test]
    fn test_group_spec_deserializes_with_defaults() {
        let spec: GroupSpec = serde_json::from_str(
            r#"{"name": "admins", "container": "OU=Groups,DC=example,DC=com", "members": ["alice", ""]}"#,
        )
        .unwrap();
        assert_eq!(spec.description, "");
        assert!(!spec.ignore_unmanaged);
        assert!(spec.user_base.is_none());
        assert_eq!(spec.member_set().names(), vec!["alice"]);
    }

    #[tokio::test]
    async fn test_group_lifecycle() {
        let (dir, ad) = fixture();
        let groups = GroupResource::new(ad);

        let spec = GroupSpec::new("admins", "OU=Groups,DC=example,DC=com").with_members(["alice"]);
        let created = groups.create(&spec).await.unwrap();
        assert_eq!(created.id, "cn=admins,ou=groups,dc=example,dc=com");
        assert_eq!(created.spec.container, "ou=groups,dc=example,dc=com");
        assert_eq!(created.spec.members, vec!["alice"]);

        let renamed = GroupSpec::new("operators", "ou=Users,dc=example,dc=com")
            .with_description("ops")
            .with_members(["bob"]);
        let updated = groups.update(&spec, &renamed).await.unwrap();
        assert_eq!(updated.id, "cn=operators,ou=users,dc=example,dc=com");
        assert_eq!(updated.spec.description, "ops");
        assert_eq!(updated.spec.members, vec!["bob"]);

        groups.delete(&renamed).await.unwrap();
        assert!(groups.read(&renamed).await.unwrap().is_none());
        assert!(!dir.contains(&Dn::new("cn=operators,ou=Users,dc=example,dc=com")));
    }

    #[tokio::test]
    async fn test_member_update_resolves_under_new_user_base() {
        let (dir, ad) = fixture();
        dir.seed("ou=Contractors,dc=example,dc=com", &["organizationalUnit"], AttributeMap::new());
        dir.seed(
            "cn=erin,ou=Contractors,dc=example,dc=com",
            &["user"],
            AttributeMap::new().with("sAMAccountName", ["erin"]),
        );
        let groups = GroupResource::new(ad);

        let spec = GroupSpec::new("admins", "ou=Groups,dc=example,dc=com")
            .with_user_base("ou=Users,dc=example,dc=com")
            .with_members(["alice"]);
        groups.create(&spec).await.unwrap();

        let rebased = GroupSpec::new("admins", "ou=Groups,dc=example,dc=com")
            .with_user_base("ou=Contractors,dc=example,dc=com")
            .with_members(["erin"]);
        let observed = groups.update(&spec, &rebased).await.unwrap();
        assert_eq!(observed.spec.members, vec!["erin"]);

        let group = dir
            .get(&Dn::new("cn=admins,ou=Groups,dc=example,dc=com"))
            .unwrap();
        assert!(group
            .values("member")
            .contains(&"cn=erin,ou=Contractors,dc=example,dc=com".to_string()));
    }

    #[tokio::test]
    async fn test_case_only_changes_are_ignored() {
        let (dir, ad) = fixture();
        let groups = GroupResource::new(ad);
        let spec = GroupSpec::new("admins", "ou=Groups,dc=example,dc=com");
        groups.create(&spec).await.unwrap();
        dir.clear_writes();

        let shouted = GroupSpec::new("ADMINS", "OU=GROUPS,DC=EXAMPLE,DC=COM");
        groups.update(&spec, &shouted).await.unwrap();
        assert!(dir.writes().is_empty());
    }

    #[tokio::test]
    async fn test_organizational_unit_lifecycle() {
        let (_, ad) = fixture();
        let ous = OrganizationalUnitResource::new(ad);

        let spec = OrganizationalUnitSpec::new("Apps", "dc=example,dc=com");
        ous.create(&spec).await.unwrap();

        let moved = OrganizationalUnitSpec::new("Applications", "ou=Archive,dc=example,dc=com")
            .with_description("old apps");
        let observed = ous.update(&spec, &moved).await.unwrap();
        assert_eq!(observed.id, "ou=applications,ou=archive,dc=example,dc=com");
        assert_eq!(observed.spec.name, "Applications");
        assert_eq!(observed.spec.description, "old apps");

        ous.delete(&moved).await.unwrap();
        assert!(ous.read(&moved).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_computer_read_reports_actual_container() {
        let (_, ad) = fixture();
        let computers = ComputerResource::new(ad.clone());

        let spec = ComputerSpec::new("web01", "ou=Servers,dc=example,dc=com");
        computers.create(&spec).await.unwrap();
        ad.computers()
            .move_to("web01", &Dn::new("ou=Archive,dc=example,dc=com"))
            .await
            .unwrap();

        let observed = computers.read(&spec).await.unwrap().unwrap();
        assert_eq!(observed.spec.container, "ou=archive,dc=example,dc=com");

        let back = spec.clone().with_description("restored");
        let observed = computers.update(&observed.spec, &back).await.unwrap();
        assert_eq!(observed.spec.container, "ou=servers,dc=example,dc=com");
        assert_eq!(observed.spec.description, "restored");
    }

    #[tokio::test]
    async fn test_object_update_uses_attribute_delta() {
        let (dir, ad) = fixture();
        let objects = ObjectResource::new(ad);

        let spec = ObjectSpec::new("cn=printer,ou=Servers,dc=example,dc=com", ["device"])
            .with_attribute("l", ["floor 1"])
            .with_attribute("serialNumber", ["A1"]);
        let created = objects.create(&spec).await.unwrap();
        assert_eq!(created.spec.dn, "cn=printer,ou=servers,dc=example,dc=com");
        assert_eq!(created.spec.dn, created.id);
        assert_eq!(created.spec.attributes.len(), 2);

        let next = ObjectSpec::new("cn=printer,ou=Servers,dc=example,dc=com", ["device"])
            .with_attribute("l", ["floor 2"])
            .with_attribute("owner", ["cn=alice,ou=Users,dc=example,dc=com"]);
        dir.clear_writes();
        let observed = objects.update(&spec, &next).await.unwrap();
        assert_eq!(dir.writes().len(), 1);
        assert_eq!(observed.spec.attributes["l"], vec!["floor 2"]);
        assert!(!observed.spec.attributes.contains_key("serialNumber"));
        assert!(dir
            .get(&spec.identity())
            .unwrap()
            .attributes
            .get("serialNumber")
            .is_none());

        let moved = ObjectSpec::new("cn=printer,ou=Archive,dc=example,dc=com", ["device"]);
        let err = objects.update(&next, &moved).await.unwrap_err();
        assert_eq!(err.error_code(), "INVALID_DATA");

        objects.delete(&next).await.unwrap();
        assert!(objects.read(&next).await.unwrap().is_none());
    }
}
