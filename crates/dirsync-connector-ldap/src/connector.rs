//! LDAP session
//!
//! Implements [`DirectorySession`] over `ldap3` for LDAP/Active Directory.
//! One connection, bound lazily and used serially.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, LdapResult, Mod, Scope, SearchEntry};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use dirsync_connector::config::ConnectorConfig;
use dirsync_connector::dn::Dn;
use dirsync_connector::error::{ConnectorError, ConnectorResult};
use dirsync_connector::operation::{
    AttributeMap, DirectoryObject, Filter, Modification, SearchScope,
};
use dirsync_connector::traits::{Connector, DirectorySession};

use crate::config::ActiveDirectoryConfig;

/// LDAP result code: success.
const RC_SUCCESS: u32 = 0;
/// LDAP result code: noSuchObject.
const RC_NO_SUCH_OBJECT: u32 = 32;
/// LDAP result code: invalidCredentials.
const RC_INVALID_CREDENTIALS: u32 = 49;
/// LDAP result code: notAllowedOnNonLeaf.
const RC_NOT_ALLOWED_ON_NON_LEAF: u32 = 66;
/// LDAP result code: entryAlreadyExists.
const RC_ENTRY_ALREADY_EXISTS: u32 = 68;

/// Map an LDAP result code onto the error taxonomy.
fn check_result(rc: u32, text: &str, operation: &str, dn: &str) -> ConnectorResult<()> {
    match rc {
        RC_SUCCESS => Ok(()),
        RC_NO_SUCH_OBJECT => Err(ConnectorError::not_found(dn)),
        RC_ENTRY_ALREADY_EXISTS => Err(ConnectorError::already_exists(dn)),
        RC_NOT_ALLOWED_ON_NON_LEAF => Err(ConnectorError::HasChildren {
            identifier: dn.to_string(),
            child: None,
        }),
        RC_INVALID_CREDENTIALS => Err(ConnectorError::AuthenticationFailed),
        rc => Err(ConnectorError::transport_with_code(
            format!("LDAP {operation} on {dn} failed with code {rc}: {text}"),
            rc,
        )),
    }
}

fn check(result: &LdapResult, operation: &str, dn: &str) -> ConnectorResult<()> {
    check_result(result.rc, &result.text, operation, dn)
}

fn ldap_scope(scope: SearchScope) -> Scope {
    match scope {
        SearchScope::Base => Scope::Base,
        SearchScope::OneLevel => Scope::OneLevel,
        SearchScope::Subtree => Scope::Subtree,
    }
}

/// Requested attribute list; empty means all user attributes.
fn requested_attributes<'a>(attributes: &[&'a str]) -> Vec<&'a str> {
    if attributes.is_empty() {
        vec!["*"]
    } else {
        attributes.to_vec()
    }
}

fn to_ldap_mod(modification: Modification) -> Mod<String> {
    match modification {
        Modification::Add(name, values) => Mod::Add(name, values.into_iter().collect()),
        Modification::Replace(name, values) => Mod::Replace(name, values.into_iter().collect()),
        Modification::Delete(name, values) => Mod::Delete(name, values.into_iter().collect()),
    }
}

fn entry_to_object(entry: SearchEntry) -> DirectoryObject {
    let attributes: AttributeMap = entry.attrs.into_iter().collect();
    DirectoryObject::new(entry.dn, attributes)
}

/// LDAP session for one Active Directory domain.
pub struct LdapSession {
    /// Configuration.
    config: ActiveDirectoryConfig,

    /// Display name for this session.
    display_name: String,

    /// Cached LDAP connection (lazily initialized).
    connection: Arc<RwLock<Option<Ldap>>>,

    /// Whether the session has been disposed.
    disposed: Arc<RwLock<bool>>,
}

impl LdapSession {
    /// Create a new session with the given configuration.
    ///
    /// No network traffic happens until the first operation.
    pub fn new(config: ActiveDirectoryConfig) -> ConnectorResult<Self> {
        config.validate()?;
        config.tls.validate_security();

        let display_name = format!("AD: {} ({})", config.domain, config.host);

        Ok(Self {
            config,
            display_name,
            connection: Arc::new(RwLock::new(None)),
            disposed: Arc::new(RwLock::new(false)),
        })
    }

    /// The configuration this session was built with.
    pub fn config(&self) -> &ActiveDirectoryConfig {
        &self.config
    }

    /// Get an LDAP connection, creating one if necessary.
    async fn get_connection(&self) -> ConnectorResult<Ldap> {
        if *self.disposed.read().await {
            return Err(ConnectorError::transport("session has been disposed"));
        }

        // Try to reuse existing connection
        {
            let conn_guard = self.connection.read().await;
            if let Some(ref conn) = *conn_guard {
                return Ok(conn.clone());
            }
        }

        let conn = self.create_connection().await?;

        {
            let mut conn_guard = self.connection.write().await;
            *conn_guard = Some(conn.clone());
        }

        Ok(conn)
    }

    /// Drop the cached connection so the next call reconnects.
    async fn reset_connection(&self) {
        self.connection.write().await.take();
    }

    /// Create a new LDAP connection and bind.
    async fn create_connection(&self) -> ConnectorResult<Ldap> {
        let url = self.config.url();

        debug!(url = %url, "Connecting to directory server");

        let settings = LdapConnSettings::new()
            .set_conn_timeout(self.config.connection.connection_timeout())
            .set_starttls(self.config.tls.enabled && !self.config.use_ssl)
            .set_no_tls_verify(!self.config.tls.verify_certificate);

        let (conn, mut ldap) = LdapConnAsync::with_settings(settings, &url)
            .await
            .map_err(|e| {
                ConnectorError::connection_failed_with_source(
                    format!("Failed to connect to directory server at {url}"),
                    e,
                )
            })?;

        // Spawn the connection driver
        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                warn!(error = %e, "LDAP connection driver error");
            }
        });

        let bind_identity = self.config.bind_identity();
        let bind_password = self.config.password.as_deref().unwrap_or("");

        debug!(bind_identity = %bind_identity, "Performing LDAP bind");

        let result = ldap
            .simple_bind(&bind_identity, bind_password)
            .await
            .map_err(|e| {
                ConnectorError::connection_failed_with_source(
                    format!("LDAP bind failed for {bind_identity}"),
                    e,
                )
            })?;

        match result.rc {
            RC_SUCCESS => {}
            RC_INVALID_CREDENTIALS => return Err(ConnectorError::AuthenticationFailed),
            rc => {
                return Err(ConnectorError::connection_failed(format!(
                    "LDAP bind failed with code {}: {}",
                    rc, result.text
                )))
            }
        }

        info!(host = %self.config.host, domain = %self.config.domain, "Directory connection established");

        Ok(ldap)
    }

    /// Turn a protocol-level failure into a transport error, dropping the
    /// connection it happened on.
    async fn transport_failure(&self, operation: &str, dn: &Dn, e: ldap3::LdapError) -> ConnectorError {
        self.reset_connection().await;
        ConnectorError::transport_with_source(format!("LDAP {operation} on {dn} failed"), e)
    }
}

#[async_trait]
impl Connector for LdapSession {
    fn display_name(&self) -> &str {
        &self.display_name
    }

    #[instrument(skip(self))]
    async fn test_connection(&self) -> ConnectorResult<()> {
        let base = self.config.domain_dn();
        let found = self
            .search(&base, SearchScope::Base, &Filter::any_object(), &["dn"])
            .await
            .map_err(|e| match e {
                ConnectorError::ObjectNotFound { .. } => ConnectorError::connection_failed(
                    format!("Domain DN '{base}' not found or not accessible"),
                ),
                other => other,
            })?;

        if found.is_empty() {
            return Err(ConnectorError::connection_failed(format!(
                "Domain DN '{base}' not found or not accessible"
            )));
        }

        info!("Directory connection test successful");
        Ok(())
    }

    async fn dispose(&self) -> ConnectorResult<()> {
        *self.disposed.write().await = true;

        let mut conn_guard = self.connection.write().await;
        if let Some(mut ldap) = conn_guard.take() {
            if let Err(e) = ldap.unbind().await {
                warn!(error = %e, "Error during LDAP unbind");
            }
        }

        info!("Directory session disposed");
        Ok(())
    }
}

#[async_trait]
impl DirectorySession for LdapSession {
    #[instrument(skip(self, filter, attributes), fields(base = %base, filter = %filter.to_ldap()))]
    async fn search(
        &self,
        base: &Dn,
        scope: SearchScope,
        filter: &Filter,
        attributes: &[&str],
    ) -> ConnectorResult<Vec<DirectoryObject>> {
        let mut ldap = self.get_connection().await?;
        let ldap_filter = filter.to_ldap();

        let result = match ldap
            .with_timeout(self.config.connection.operation_timeout())
            .search(
                base.as_str(),
                ldap_scope(scope),
                &ldap_filter,
                requested_attributes(attributes),
            )
            .await
        {
            Ok(result) => result,
            Err(e) => return Err(self.transport_failure("search", base, e).await),
        };

        let ldap3::SearchResult(entries, status) = result;
        check(&status, "search", base.as_str())?;

        let objects: Vec<DirectoryObject> = entries
            .into_iter()
            .map(SearchEntry::construct)
            .map(entry_to_object)
            .collect();

        debug!(count = objects.len(), "LDAP search completed");
        Ok(objects)
    }

    #[instrument(skip(self, attributes), fields(dn = %dn))]
    async fn add(&self, dn: &Dn, attributes: Vec<(String, Vec<String>)>) -> ConnectorResult<()> {
        let mut ldap = self.get_connection().await?;

        let ldap_attrs: Vec<(String, HashSet<String>)> = attributes
            .into_iter()
            .filter(|(_, values)| !values.is_empty())
            .map(|(name, values)| (name, values.into_iter().collect()))
            .collect();

        let result = match ldap
            .with_timeout(self.config.connection.operation_timeout())
            .add(dn.as_str(), ldap_attrs)
            .await
        {
            Ok(result) => result,
            Err(e) => return Err(self.transport_failure("add", dn, e).await),
        };
        check(&result, "add", dn.as_str())?;

        info!("LDAP entry created");
        Ok(())
    }

    #[instrument(skip(self, modifications), fields(dn = %dn, count = modifications.len()))]
    async fn modify(&self, dn: &Dn, modifications: Vec<Modification>) -> ConnectorResult<()> {
        let mut ldap = self.get_connection().await?;
        let mods: Vec<Mod<String>> = modifications.into_iter().map(to_ldap_mod).collect();

        let result = match ldap
            .with_timeout(self.config.connection.operation_timeout())
            .modify(dn.as_str(), mods)
            .await
        {
            Ok(result) => result,
            Err(e) => return Err(self.transport_failure("modify", dn, e).await),
        };
        check(&result, "modify", dn.as_str())?;

        info!("LDAP entry modified");
        Ok(())
    }

    #[instrument(skip(self), fields(dn = %dn))]
    async fn delete(&self, dn: &Dn) -> ConnectorResult<()> {
        let mut ldap = self.get_connection().await?;

        let result = match ldap
            .with_timeout(self.config.connection.operation_timeout())
            .delete(dn.as_str())
            .await
        {
            Ok(result) => result,
            Err(e) => return Err(self.transport_failure("delete", dn, e).await),
        };
        check(&result, "delete", dn.as_str())?;

        info!("LDAP entry deleted");
        Ok(())
    }

    #[instrument(skip(self), fields(dn = %dn))]
    async fn modify_dn(
        &self,
        dn: &Dn,
        new_rdn: &str,
        delete_old_rdn: bool,
        new_superior: Option<&Dn>,
    ) -> ConnectorResult<()> {
        let mut ldap = self.get_connection().await?;

        let result = match ldap
            .with_timeout(self.config.connection.operation_timeout())
            .modifydn(
                dn.as_str(),
                new_rdn,
                delete_old_rdn,
                new_superior.map(Dn::as_str),
            )
            .await
        {
            Ok(result) => result,
            Err(e) => return Err(self.transport_failure("modify DN", dn, e).await),
        };
        check(&result, "modify DN", dn.as_str())?;

        info!(new_rdn = %new_rdn, "LDAP entry renamed");
        Ok(())
    }
}

impl std::fmt::Debug for LdapSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LdapSession")
            .field("config", &self.config.redacted())
            .field("display_name", &self.display_name)
            .finish_non_exhaustive()
    }
}
