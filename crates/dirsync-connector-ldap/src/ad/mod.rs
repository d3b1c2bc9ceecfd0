//! Active Directory specific modules
//!
//! Entity repositories for computers, organizational units and groups, the
//! group membership reconciler and the resource lifecycle drivers built on
//! them. Everything takes the directory session by injection through
//! [`ActiveDirectory`].

pub mod computer;
pub mod group;
pub mod members;
pub mod ou;
pub mod resource;
pub mod schema;

use std::sync::Arc;

use dirsync_connector::dn::Dn;
use dirsync_connector::error::ConnectorResult;
use dirsync_connector::traits::{Connector, DirectorySession};

use crate::config::ActiveDirectoryConfig;
use crate::connector::LdapSession;
use crate::directory::DirectoryClient;
use crate::store::ObjectStore;

// Re-export key types
pub use computer::{Computer, ComputerRepository};
pub use group::{Group, GroupRepository};
pub use members::{
    compute_membership_delta, managed_members, MemberSet, MembershipDelta, MembershipReconciler,
    ReconcileOutcome, ReconcilePhase,
};
pub use ou::{OrganizationalUnit, OrganizationalUnitRepository};
pub use resource::{
    ComputerResource, ComputerSpec, GroupResource, GroupSpec, ObjectResource, ObjectSpec, Observed,
    OrganizationalUnitResource, OrganizationalUnitSpec,
};

/// An entry value read from the directory.
///
/// Identity and container strings handed to the resource layer are
/// lowercase so external state compares stably.
pub trait DirectoryEntity {
    /// The entry's identity as stored.
    fn dn(&self) -> &Dn;

    /// Lowercase identity.
    fn id(&self) -> String {
        self.dn().normalized()
    }

    /// Lowercase identity of the containing entry.
    fn container(&self) -> String {
        self.dn()
            .parent()
            .map(|parent| parent.normalized())
            .unwrap_or_default()
    }
}

/// Entry point: one domain, one session.
#[derive(Debug, Clone)]
pub struct ActiveDirectory {
    store: ObjectStore,
    domain_dn: Dn,
    user_base: Dn,
}

impl ActiveDirectory {
    /// Build on an established session. Member lookups default to the
    /// whole domain.
    pub fn new(session: Arc<dyn DirectorySession>, domain_dn: Dn) -> Self {
        Self {
            store: ObjectStore::new(DirectoryClient::new(session)),
            user_base: domain_dn.clone(),
            domain_dn,
        }
    }

    /// Build an LDAP session from configuration. Nothing connects until the
    /// first operation.
    pub fn from_config(config: ActiveDirectoryConfig) -> ConnectorResult<Self> {
        let domain_dn = config.domain_dn();
        let user_base = config.user_base_dn();
        let session = LdapSession::new(config)?;
        Ok(Self::new(Arc::new(session), domain_dn).with_user_base(user_base))
    }

    /// Restrict member name lookups to `user_base`.
    #[must_use]
    pub fn with_user_base(mut self, user_base: Dn) -> Self {
        self.user_base = user_base;
        self
    }

    /// The generic object store.
    pub fn store(&self) -> &ObjectStore {
        &self.store
    }

    /// The domain DN.
    pub fn domain_dn(&self) -> &Dn {
        &self.domain_dn
    }

    /// Base DN for member name lookups.
    pub fn user_base(&self) -> &Dn {
        &self.user_base
    }

    /// Computer accounts.
    pub fn computers(&self) -> ComputerRepository {
        ComputerRepository::new(self.store.clone(), self.domain_dn.clone())
    }

    /// Organizational units.
    pub fn organizational_units(&self) -> OrganizationalUnitRepository {
        OrganizationalUnitRepository::new(self.store.clone())
    }

    /// Security groups, resolving members below the configured user base.
    pub fn groups(&self) -> GroupRepository {
        self.groups_with_user_base(&self.user_base)
    }

    /// Security groups, resolving members below `user_base`.
    pub fn groups_with_user_base(&self, user_base: &Dn) -> GroupRepository {
        GroupRepository::new(self.store.clone(), user_base.clone())
    }

    /// Membership reconciler over [`ActiveDirectory::groups`].
    pub fn reconciler(&self) -> MembershipReconciler {
        MembershipReconciler::new(self.groups())
    }

    /// Check the session reaches the domain.
    pub async fn test_connection(&self) -> ConnectorResult<()> {
        self.store.client().session().test_connection().await
    }
}
