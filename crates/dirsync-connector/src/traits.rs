//! Connector Framework traits
//!
//! The protocol seam between the reconciliation layers and a directory
//! server. Everything above [`DirectorySession`] is written against this
//! trait, so a live LDAP session and the in-memory directory are
//! interchangeable.

use async_trait::async_trait;

use crate::dn::Dn;
use crate::error::ConnectorResult;
use crate::operation::{DirectoryObject, Filter, Modification, SearchScope};

/// Base trait for all connectors.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Get the display name for this connector instance.
    fn display_name(&self) -> &str;

    /// Test the connection to the target system.
    ///
    /// Returns `Ok(())` if the connection is successful, or an error describing
    /// what went wrong.
    async fn test_connection(&self) -> ConnectorResult<()>;

    /// Dispose of connector resources.
    ///
    /// Implementations should unbind and close connections.
    async fn dispose(&self) -> ConnectorResult<()>;

    /// Check if the connector is currently healthy.
    fn is_healthy(&self) -> bool {
        true
    }
}

/// Raw directory protocol operations.
///
/// Each call is one request/response round trip. Implementations map server
/// result codes onto [`crate::error::ConnectorError`]: "no such object" to
/// `ObjectNotFound`, "entry already exists" to `ObjectAlreadyExists` and
/// "not allowed on non-leaf" to `HasChildren`.
#[async_trait]
pub trait DirectorySession: Connector {
    /// Search below `base`.
    ///
    /// `attributes` selects the returned attributes; empty returns all user
    /// attributes.
    async fn search(
        &self,
        base: &Dn,
        scope: SearchScope,
        filter: &Filter,
        attributes: &[&str],
    ) -> ConnectorResult<Vec<DirectoryObject>>;

    /// Add a new entry. Attribute order is preserved on the wire.
    async fn add(&self, dn: &Dn, attributes: Vec<(String, Vec<String>)>) -> ConnectorResult<()>;

    /// Apply modifications to an existing entry, atomically.
    async fn modify(&self, dn: &Dn, modifications: Vec<Modification>) -> ConnectorResult<()>;

    /// Delete a leaf entry.
    async fn delete(&self, dn: &Dn) -> ConnectorResult<()>;

    /// Rename and/or move an entry.
    ///
    /// `new_rdn` is the full relative name (`cn=new`). When `new_superior`
    /// is `None` the entry stays under its current parent.
    async fn modify_dn(
        &self,
        dn: &Dn,
        new_rdn: &str,
        delete_old_rdn: bool,
        new_superior: Option<&Dn>,
    ) -> ConnectorResult<()>;
}
