//! Object store
//!
//! Typed get/create/update/delete with existence semantics on top of
//! [`DirectoryClient`].
//!
//! Every mutating call reads before it writes. The protocol has no
//! conditional writes, so two callers racing on the same identity can still
//! see spurious "already exists" or "not found" failures, or lose an
//! update. Re-running the reconciliation converges.

use tracing::{debug, info, instrument, warn};

use dirsync_connector::dn::Dn;
use dirsync_connector::error::{ConnectorError, ConnectorResult, ResultExt};
use dirsync_connector::operation::{AttributeDelta, DirectoryObject, Filter, SearchScope};

use crate::directory::DirectoryClient;

/// Generic typed access to directory entries.
#[derive(Debug, Clone)]
pub struct ObjectStore {
    client: DirectoryClient,
}

impl ObjectStore {
    /// Create a store over a directory client.
    pub fn new(client: DirectoryClient) -> Self {
        Self { client }
    }

    /// The underlying client.
    pub fn client(&self) -> &DirectoryClient {
        &self.client
    }

    /// Subtree search below `base`.
    pub async fn search(
        &self,
        filter: &Filter,
        base: &Dn,
        attributes: &[&str],
    ) -> ConnectorResult<Vec<DirectoryObject>> {
        self.client
            .search(filter, base, attributes)
            .await
            .context(|| format!("search {} under {base}", filter.to_ldap()))
    }

    /// Read exactly the entry at `dn`.
    ///
    /// `None` when the entry does not exist. More than one result is a
    /// protocol invariant violation.
    #[instrument(skip(self, attributes), fields(dn = %dn))]
    pub async fn get(
        &self,
        dn: &Dn,
        attributes: &[&str],
    ) -> ConnectorResult<Option<DirectoryObject>> {
        let mut found = self
            .client
            .search_scoped(&Filter::any_object(), dn, SearchScope::Base, attributes)
            .await
            .context(|| format!("get {dn}"))?;

        match found.len() {
            0 => {
                debug!("entry not found");
                Ok(None)
            }
            1 => Ok(found.pop()),
            count => Err(ConnectorError::AmbiguousMatch {
                lookup: dn.to_string(),
                count,
            }),
        }
    }

    /// Whether an entry exists at `dn`.
    pub async fn exists(&self, dn: &Dn) -> ConnectorResult<bool> {
        Ok(self.get(dn, &["objectClass"]).await?.is_some())
    }

    /// Create an entry unless one already exists at `dn`.
    #[instrument(skip(self, attributes), fields(dn = %dn))]
    pub async fn create_if_absent(
        &self,
        dn: &Dn,
        object_classes: &[&str],
        attributes: Vec<(String, Vec<String>)>,
    ) -> ConnectorResult<()> {
        if self.exists(dn).await? {
            return Err(ConnectorError::already_exists(dn.to_string()))
                .context(|| format!("create {dn}"));
        }

        self.client
            .create(dn, object_classes, attributes)
            .await
            .context(|| format!("create {dn}"))?;

        info!("entry created");
        Ok(())
    }

    /// Apply a delta to an existing entry.
    ///
    /// `object_classes`, when given, replaces the entry's object classes in
    /// the same modify call.
    #[instrument(skip(self, object_classes, delta), fields(dn = %dn))]
    pub async fn update_deltas(
        &self,
        dn: &Dn,
        object_classes: Option<&[&str]>,
        delta: &AttributeDelta,
    ) -> ConnectorResult<()> {
        if !self.exists(dn).await? {
            return Err(ConnectorError::not_found(dn.to_string()))
                .context(|| format!("update {dn}"));
        }

        let mut delta = delta.clone();
        if let Some(classes) = object_classes {
            delta.replace("objectClass", classes.iter().copied());
        }

        self.client
            .modify(dn, &delta)
            .await
            .context(|| format!("update {dn}"))?;

        debug!(attributes = ?delta.affected_attributes(), "entry updated");
        Ok(())
    }

    /// Entries strictly below `dn`.
    pub async fn children(&self, dn: &Dn) -> ConnectorResult<Vec<DirectoryObject>> {
        let found = self
            .client
            .search(&Filter::any_object(), dn, &["objectClass"])
            .await
            .context(|| format!("list children of {dn}"))?;

        Ok(found.into_iter().filter(|o| o.dn != *dn).collect())
    }

    /// Delete the entry at `dn` if it exists and has no children.
    ///
    /// Deleting an absent entry succeeds.
    #[instrument(skip(self), fields(dn = %dn))]
    pub async fn delete_if_present(&self, dn: &Dn) -> ConnectorResult<()> {
        if !self.exists(dn).await? {
            warn!("entry already absent, nothing to delete");
            return Ok(());
        }

        let children = self.children(dn).await?;
        if let Some(child) = children.first() {
            return Err(ConnectorError::HasChildren {
                identifier: dn.to_string(),
                child: Some(child.dn.to_string()),
            })
            .context(|| format!("delete {dn}"));
        }

        match self.client.delete(dn).await {
            Ok(()) => {
                info!("entry deleted");
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                warn!("entry vanished before delete");
                Ok(())
            }
            Err(e) => Err(e).context(|| format!("delete {dn}")),
        }
    }

    /// Move and/or rename an entry. Returns the new identity.
    pub async fn move_entry(
        &self,
        dn: &Dn,
        new_rdn: &str,
        new_parent: Option<&Dn>,
    ) -> ConnectorResult<Dn> {
        self.client
            .rename(dn, new_rdn, new_parent)
            .await
            .context(|| format!("move {dn} to {new_rdn}"))
    }
}
