//! Computer accounts
//!
//! Computers are looked up by name anywhere in the domain; a name is unique
//! domain-wide because it backs the `name$` account name.

use tracing::{debug, info, instrument, warn};

use dirsync_connector::dn::{normalize, Dn};
use dirsync_connector::error::{ConnectorError, ConnectorResult, ResultExt};
use dirsync_connector::operation::{AttributeDelta, DirectoryObject, Filter};

use super::schema::{attr, computer_account_name, object_class, user_account_control};
use super::DirectoryEntity;
use crate::store::ObjectStore;

const COMPUTER_ATTRIBUTES: &[&str] = &[attr::CN, attr::NAME, attr::DESCRIPTION];

/// A computer account as read from the directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Computer {
    pub name: String,
    pub dn: Dn,
    pub description: String,
}

impl DirectoryEntity for Computer {
    fn dn(&self) -> &Dn {
        &self.dn
    }
}

impl From<DirectoryObject> for Computer {
    fn from(object: DirectoryObject) -> Self {
        let name = object
            .first(attr::CN)
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

/// Computer repository.
#[derive(Debug, Clone)]
pub struct ComputerRepository {
    store: ObjectStore,
    domain_dn: Dn,
}

impl ComputerRepository {
    pub fn new(store: ObjectStore, domain_dn: Dn) -> Self {
        Self { store, domain_dn }
    }

    /// Identity of computer `name` in `container`.
    pub fn identity(name: &str, container: &Dn) -> Dn {
        Dn::from_rdn(attr::CN, name, container)
    }

    /// Find a computer by name anywhere in the domain.
    #[instrument(skip(self))]
    pub async fn get_by_name(&self, name: &str) -> ConnectorResult<Option<Computer>> {
        let filter = Filter::named(object_class::COMPUTER, attr::NAME, name);
        let mut found = self
            .store
            .search(&filter, &self.domain_dn, COMPUTER_ATTRIBUTES)
            .await
            .context(|| format!("get computer {name}"))?;

        match found.len() {
            0 => Ok(None),
            1 => Ok(found.pop().map(Computer::from)),
            count => Err(ConnectorError::AmbiguousMatch {
                lookup: format!("computer {name}"),
                count,
            }),
        }
    }

    /// Create computer `name` in `container`.
    ///
    /// If the same computer already exists at exactly that identity, only
    /// its description is converged. A computer with that name elsewhere is
    /// an `ObjectAlreadyExists` error.
    #[instrument(skip(self, description), fields(container = %container))]
    pub async fn create_under_path(
        &self,
        name: &str,
        container: &Dn,
        description: &str,
    ) -> ConnectorResult<Computer> {
        let dn = Self::identity(name, container);

        if let Some(existing) = self.get_by_name(name).await? {
            if existing.dn == dn && normalize(&existing.name) == normalize(name) {
                warn!(dn = %dn, "computer already exists, updating description");
                return self.update_description(name, description).await;
            }
            return Err(ConnectorError::already_exists(existing.dn.to_string()))
                .context(|| format!("create computer {name} in {container}"));
        }

        let mut attributes = vec![
            (attr::NAME.to_string(), vec![name.to_string()]),
            (
                attr::SAM_ACCOUNT_NAME.to_string(),
                vec![computer_account_name(name)],
            ),
            (
                attr::USER_ACCOUNT_CONTROL.to_string(),
                vec![user_account_control::WORKSTATION_TRUST_ACCOUNT.to_string()],
            ),
        ];
        if !description.is_empty() {
            attributes.push((attr::DESCRIPTION.to_string(), vec![description.to_string()]));
        }

        self.store
            .create_if_absent(&dn, object_class::COMPUTER_CLASSES, attributes)
            .await
            .context(|| format!("create computer {name}"))?;

        info!(dn = %dn, "computer created");
        Ok(Computer {
            name: name.to_string(),
            dn,
            description: description.to_string(),
        })
    }

    async fn require(&self, name: &str, action: &str) -> ConnectorResult<Computer> {
        self.get_by_name(name).await?.ok_or_else(|| {
            ConnectorError::not_found(format!("computer {name}"))
                .with_context(format!("{action} computer {name}"))
        })
    }

    /// Move computer `name` into `new_container`. No-op when already there.
    #[instrument(skip(self), fields(new_container = %new_container))]
    pub async fn move_to(&self, name: &str, new_container: &Dn) -> ConnectorResult<Computer> {
        let mut computer = self.require(name, "move").await?;

        let target = Self::identity(&computer.name, new_container);
        if computer.dn == target {
            debug!("computer is already in the target container");
            return Ok(computer);
        }

        let rdn = computer.dn.rdn().to_string();
        computer.dn = self
            .store
            .move_entry(&computer.dn, &rdn, Some(new_container))
            .await
            .context(|| format!("move computer {name}"))?;

        info!(dn = %computer.dn, "computer moved");
        Ok(computer)
    }

    /// Rename computer `name` to `new_name`, keeping its container.
    #[instrument(skip(self))]
    pub async fn rename(&self, name: &str, new_name: &str) -> ConnectorResult<Computer> {
        let computer = self.require(name, "rename").await?;

        let Some(container) = computer.dn.parent() else {
            return Err(ConnectorError::InvalidData {
                message: format!("computer {} has no container", computer.dn),
            });
        };
        let target = Self::identity(new_name, &container);
        if computer.dn == target && computer.name == new_name {
            debug!("computer already has the target name");
            return Ok(computer);
        }

        let new_rdn = target.rdn().to_string();
        let dn = self
            .store
            .move_entry(&computer.dn, &new_rdn, None)
            .await
            .context(|| format!("rename computer {name}"))?;

        let mut delta = AttributeDelta::new();
        delta.replace(attr::SAM_ACCOUNT_NAME, [computer_account_name(new_name)]);
        self.store
            .update_deltas(&dn, None, &delta)
            .await
            .context(|| format!("rename computer {name}"))?;

        info!(dn = %dn, "computer renamed");
        Ok(Computer {
            name: new_name.to_string(),
            dn,
            description: computer.description,
        })
    }

    /// Set the description; an empty description clears it.
    #[instrument(skip(self, description))]
    pub async fn update_description(
        &self,
        name: &str,
        description: &str,
    ) -> ConnectorResult<Computer> {
        let mut computer = self.require(name, "update description of").await?;
        if computer.description == description {
            debug!("description unchanged");
            return Ok(computer);
        }

        let mut delta = AttributeDelta::new();
        if description.is_empty() {
            delta.replace(attr::DESCRIPTION, Vec::<String>::new());
        } else {
            delta.replace(attr::DESCRIPTION, [description]);
        }
        self.store
            .update_deltas(&computer.dn, None, &delta)
            .await
            .context(|| format!("update description of computer {name}"))?;

        computer.description = description.to_string();
        Ok(computer)
    }

    /// Delete computer `name`. Absent computers are not an error.
    #[instrument(skip(self))]
    pub async fn delete(&self, name: &str) -> ConnectorResult<()> {
        match self.get_by_name(name).await? {
            Some(computer) => self
                .store
                .delete_if_present(&computer.dn)
                .await
                .context(|| format!("delete computer {name}")),
            None => {
                warn!("computer already absent");
                Ok(())
            }
        }
    }
}
