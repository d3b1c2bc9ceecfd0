//! # Connector Framework
//!
//! Core abstractions for reconciling declared state against a hierarchical
//! directory service.
//!
//! ## Architecture
//!
//! - [`DirectorySession`] - Raw protocol operations (search, add, modify,
//!   delete, modify-DN) over one established session
//! - [`Dn`] - Case-preserving, case-insensitively compared identities
//! - [`AttributeDelta`] - Added/changed/removed attribute values for one modify
//! - [`Filter`] - Typed search predicates
//! - [`InMemoryDirectory`] - A session implementation with no server behind it
//!
//! ## Crate Organization
//!
//! - [`error`] - Error taxonomy with context wrapping
//! - [`dn`] - Distinguished names and the normalization helper
//! - [`operation`] - Entries, attribute maps, deltas, filters
//! - [`traits`] - Connector and session traits
//! - [`config`] - Configuration types and traits
//! - [`memory`] - In-memory directory

pub mod config;
pub mod dn;
pub mod error;
pub mod memory;
pub mod operation;
pub mod traits;

pub use dn::Dn;
pub use memory::InMemoryDirectory;
pub use operation::{AttributeDelta, Filter};
pub use traits::DirectorySession;

/// Prelude module for convenient imports.
///
/// ```
/// use dirsync_connector::prelude::*;
/// ```
pub mod prelude {
    // Error handling
    pub use crate::error::{ConnectorError, ConnectorResult, ResultExt};

    // Identities
    pub use crate::dn::{normalize, Dn};

    // Traits
    pub use crate::traits::{Connector, DirectorySession};

    // Operations
    pub use crate::operation::{
        AttributeDelta, AttributeMap, DirectoryObject, Filter, Modification, SearchScope,
    };

    // Configuration
    pub use crate::config::{ConnectionSettings, ConnectorConfig, TlsConfig};

    // Testing
    pub use crate::memory::{DirectoryWrite, InMemoryDirectory};
}

// Re-export async_trait for connector implementors
pub use async_trait::async_trait;
