//! # LDAP Connector
//!
//! Active Directory entity repositories and group membership
//! reconciliation over LDAP.
//!
//! ## Features
//!
//! - LDAP v3 sessions over ldap:// or ldaps://, with optional STARTTLS
//! - Computer, organizational unit and security group repositories
//! - Declarative group membership reconciliation with fail-closed member
//!   resolution
//! - Resource lifecycle drivers for declarative callers
//!
//! ## Example
//!
//! ```ignore
//! use dirsync_connector_ldap::{ActiveDirectory, ActiveDirectoryConfig};
//! use dirsync_connector_ldap::ad::MemberSet;
//!
//! let config = ActiveDirectoryConfig::new("dc1.example.com", "example.com", "svc-sync")
//!     .with_password("secret");
//!
//! let ad = ActiveDirectory::from_config(config)?;
//! let group = ad.groups().find("admins", &"ou=Groups,dc=example,dc=com".into()).await?;
//!
//! let old: MemberSet = ["alice"].into_iter().collect();
//! let new: MemberSet = ["alice", "bob"].into_iter().collect();
//! ad.reconciler().reconcile(&group.unwrap().dn, &old, &new, false).await?;
//! ```

pub mod ad;
pub mod config;
pub mod connector;
pub mod directory;
pub mod store;

// Re-exports
pub use ad::ActiveDirectory;
pub use config::ActiveDirectoryConfig;
pub use connector::LdapSession;
pub use directory::DirectoryClient;
pub use store::ObjectStore;
