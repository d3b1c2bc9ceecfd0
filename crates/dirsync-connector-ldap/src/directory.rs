//! Directory client
//!
//! The four primitive operations (search, create, modify, delete) plus
//! modify-DN, issued over one injected session.

use std::sync::Arc;

use tracing::{debug, instrument};

use dirsync_connector::dn::Dn;
use dirsync_connector::error::{ConnectorError, ConnectorResult};
use dirsync_connector::operation::{AttributeDelta, DirectoryObject, Filter, SearchScope};
use dirsync_connector::traits::{Connector, DirectorySession};

/// Primitive directory operations over a shared session.
#[derive(Clone)]
pub struct DirectoryClient {
    session: Arc<dyn DirectorySession>,
}

impl DirectoryClient {
    /// Wrap an established session.
    pub fn new(session: Arc<dyn DirectorySession>) -> Self {
        Self { session }
    }

    /// The underlying session.
    pub fn session(&self) -> &Arc<dyn DirectorySession> {
        &self.session
    }

    /// Subtree search below `base`. Empty `attributes` returns all of them.
    ///
    /// A missing base is "zero matches", not a failure.
    pub async fn search(
        &self,
        filter: &Filter,
        base: &Dn,
        attributes: &[&str],
    ) -> ConnectorResult<Vec<DirectoryObject>> {
        self.search_scoped(filter, base, SearchScope::Subtree, attributes)
            .await
    }

    /// Search with an explicit scope.
    #[instrument(skip(self, filter, attributes), fields(base = %base, filter = %filter.to_ldap()))]
    pub async fn search_scoped(
        &self,
        filter: &Filter,
        base: &Dn,
        scope: SearchScope,
        attributes: &[&str],
    ) -> ConnectorResult<Vec<DirectoryObject>> {
        match self.session.search(base, scope, filter, attributes).await {
            Ok(objects) => {
                debug!(count = objects.len(), "search returned");
                Ok(objects)
            }
            Err(e) if e.is_not_found() => {
                debug!("search base does not exist");
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    /// Create an entry; fails with `ObjectAlreadyExists` when occupied.
    #[instrument(skip(self, attributes), fields(dn = %dn))]
    pub async fn create(
        &self,
        dn: &Dn,
        object_classes: &[&str],
        attributes: Vec<(String, Vec<String>)>,
    ) -> ConnectorResult<()> {
        if object_classes.is_empty() {
            return Err(ConnectorError::InvalidData {
                message: format!("no object classes given for {dn}"),
            });
        }

        let mut entry = Vec::with_capacity(attributes.len() + 1);
        entry.push((
            "objectClass".to_string(),
            object_classes.iter().map(|c| (*c).to_string()).collect(),
        ));
        entry.extend(
            attributes
                .into_iter()
                .filter(|(name, values)| !values.is_empty() && !name.eq_ignore_ascii_case("objectClass")),
        );

        self.session.add(dn, entry).await
    }

    /// Apply an attribute delta in one modify call. An empty delta is a no-op.
    #[instrument(skip(self, delta), fields(dn = %dn, attributes = ?delta.affected_attributes()))]
    pub async fn modify(&self, dn: &Dn, delta: &AttributeDelta) -> ConnectorResult<()> {
        if delta.is_empty() {
            debug!("empty delta, nothing to send");
            return Ok(());
        }
        self.session.modify(dn, delta.to_modifications()).await
    }

    /// Delete a leaf entry.
    #[instrument(skip(self), fields(dn = %dn))]
    pub async fn delete(&self, dn: &Dn) -> ConnectorResult<()> {
        self.session.delete(dn).await
    }

    /// Rename and/or move an entry, replacing the old RDN value.
    ///
    /// Returns the new identity.
    #[instrument(skip(self), fields(dn = %dn))]
    pub async fn rename(
        &self,
        dn: &Dn,
        new_rdn: &str,
        new_parent: Option<&Dn>,
    ) -> ConnectorResult<Dn> {
        self.session
            .modify_dn(dn, new_rdn, true, new_parent)
            .await?;

        let parent = match new_parent {
            Some(parent) => Some(parent.clone()),
            None => dn.parent(),
        };
        Ok(match parent {
            Some(parent) if !parent.is_root() => Dn::new(format!("{new_rdn},{parent}")),
            _ => Dn::new(new_rdn),
        })
    }
}

impl std::fmt::Debug for DirectoryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryClient")
            .field("session", &self.session.display_name())
            .finish()
    }
}
