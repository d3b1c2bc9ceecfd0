//! Organizational units

use tracing::{debug, info, instrument, warn};

use dirsync_connector::dn::Dn;
use dirsync_connector::error::{ConnectorError, ConnectorResult, ResultExt};
use dirsync_connector::operation::{AttributeDelta, DirectoryObject};

use super::schema::{attr, object_class};
use super::DirectoryEntity;
use crate::store::ObjectStore;

const OU_ATTRIBUTES: &[&str] = &[attr::NAME, attr::OU, attr::DESCRIPTION];

/// An organizational unit as read from the directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrganizationalUnit {
    pub name: String,
    pub dn: Dn,
    pub description: String,
}

impl DirectoryEntity for OrganizationalUnit {
    fn dn(&self) -> &Dn {
        &self.dn
    }
}

impl From<DirectoryObject> for OrganizationalUnit {
    fn from(object: DirectoryObject) -> Self {
        let name = object
            .first(attr::OU)
            .or_else(|| object.first(attr::NAME))
            .map(str::to_string)
            .unwrap_or_else(|| object.dn.rdn_value());
        Self {
            name,
            description: object.first(attr::DESCRIPTION).unwrap_or_default().to_string(),
            dn: object.dn,
        }
    }
}

/// Organizational unit repository.
///
/// OUs are addressed by identity: `ou=<name>,<parent>`.
#[derive(Debug, Clone)]
pub struct OrganizationalUnitRepository {
    store: ObjectStore,
}

impl OrganizationalUnitRepository {
    pub fn new(store: ObjectStore) -> Self {
        Self { store }
    }

    /// Identity of OU `name` under `parent`.
    pub fn identity(name: &str, parent: &Dn) -> Dn {
        Dn::from_rdn(attr::OU, name, parent)
    }

    /// Read the OU at `dn`.
    #[instrument(skip(self), fields(dn = %dn))]
    pub async fn get(&self, dn: &Dn) -> ConnectorResult<Option<OrganizationalUnit>> {
        let found = self
            .store
            .get(dn, OU_ATTRIBUTES)
            .await
            .context(|| format!("get organizational unit {dn}"))?;
        Ok(found.map(OrganizationalUnit::from))
    }

    /// Read OU `name` directly under `parent`.
    pub async fn get_by_name(
        &self,
        name: &str,
        parent: &Dn,
    ) -> ConnectorResult<Option<OrganizationalUnit>> {
        self.get(&Self::identity(name, parent)).await
    }

    async fn require(&self, dn: &Dn, action: &str) -> ConnectorResult<OrganizationalUnit> {
        self.get(dn).await?.ok_or_else(|| {
            ConnectorError::not_found(dn.to_string())
                .with_context(format!("{action} organizational unit {dn}"))
        })
    }

    /// Create OU `name` under `parent`.
    ///
    /// An existing OU at that identity only has its description converged.
    #[instrument(skip(self, description), fields(parent = %parent))]
    pub async fn create_under_path(
        &self,
        name: &str,
        parent: &Dn,
        description: &str,
    ) -> ConnectorResult<OrganizationalUnit> {
        let dn = Self::identity(name, parent);

        if let Some(existing) = self.get(&dn).await? {
            warn!(dn = %existing.dn, "organizational unit already exists, updating description");
            return self.update_description(&existing.dn, description).await;
        }

        let mut attributes = vec![
            (attr::NAME.to_string(), vec![name.to_string()]),
            (attr::OU.to_string(), vec![name.to_string()]),
        ];
        if !description.is_empty() {
            attributes.push((attr::DESCRIPTION.to_string(), vec![description.to_string()]));
        }

        self.store
            .create_if_absent(&dn, object_class::ORGANIZATIONAL_UNIT_CLASSES, attributes)
            .await
            .context(|| format!("create organizational unit {name}"))?;

        info!(dn = %dn, "organizational unit created");
        Ok(OrganizationalUnit {
            name: name.to_string(),
            dn,
            description: description.to_string(),
        })
    }

    /// Rename the OU at `dn`, keeping its parent.
    #[instrument(skip(self), fields(dn = %dn))]
    pub async fn rename(&self, dn: &Dn, new_name: &str) -> ConnectorResult<OrganizationalUnit> {
        let mut ou = self.require(dn, "rename").await?;

        let Some(parent) = ou.dn.parent() else {
            return Err(ConnectorError::InvalidData {
                message: format!("organizational unit {dn} has no parent"),
            });
        };
        let target = Self::identity(new_name, &parent);
        if ou.dn == target && ou.name == new_name {
            debug!("organizational unit already has the target name");
            return Ok(ou);
        }

        ou.dn = self
            .store
            .move_entry(&ou.dn, target.rdn(), None)
            .await
            .context(|| format!("rename organizational unit {dn}"))?;
        ou.name = new_name.to_string();

        info!(dn = %ou.dn, "organizational unit renamed");
        Ok(ou)
    }

    /// Move the OU at `dn` below `new_parent`. No-op when already there.
    #[instrument(skip(self), fields(dn = %dn, new_parent = %new_parent))]
    pub async fn move_to(&self, dn: &Dn, new_parent: &Dn) -> ConnectorResult<OrganizationalUnit> {
        let mut ou = self.require(dn, "move").await?;

        let target = Self::identity(&ou.name, new_parent);
        if ou.dn == target {
            debug!("organizational unit is already below the target parent");
            return Ok(ou);
        }
        if target.is_within(&ou.dn) {
            return Err(ConnectorError::InvalidData {
                message: format!("cannot move {} below itself", ou.dn),
            });
        }

        let rdn = ou.dn.rdn().to_string();
        ou.dn = self
            .store
            .move_entry(&ou.dn, &rdn, Some(new_parent))
            .await
            .context(|| format!("move organizational unit {dn}"))?;

        info!(dn = %ou.dn, "organizational unit moved");
        Ok(ou)
    }

    /// Set the description; an empty description clears it.
    #[instrument(skip(self, description), fields(dn = %dn))]
    pub async fn update_description(
        &self,
        dn: &Dn,
        description: &str,
    ) -> ConnectorResult<OrganizationalUnit> {
        let mut ou = self.require(dn, "update description of").await?;
        if ou.description == description {
            debug!("description unchanged");
            return Ok(ou);
        }

        let mut delta = AttributeDelta::new();
        if description.is_empty() {
            delta.replace(attr::DESCRIPTION, Vec::<String>::new());
        } else {
            delta.replace(attr::DESCRIPTION, [description]);
        }
        self.store
            .update_deltas(&ou.dn, None, &delta)
            .await
            .context(|| format!("update description of organizational unit {dn}"))?;

        ou.description = description.to_string();
        Ok(ou)
    }

    /// Delete the OU at `dn`. Fails with `HasChildren` while it has any
    /// entries below it; an absent OU is not an error.
    #[instrument(skip(self), fields(dn = %dn))]
    pub async fn delete(&self, dn: &Dn) -> ConnectorResult<()> {
        self.store
            .delete_if_present(dn)
            .await
            .context(|| format!("delete organizational unit {dn}"))
    }
}
