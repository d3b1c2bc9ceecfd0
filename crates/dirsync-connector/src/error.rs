//! Connector Framework error types
//!
//! Error definitions shared by every layer between the directory session and
//! the resource drivers. Classification helpers look through context layers,
//! so wrapping an error never changes how callers branch on it.

use thiserror::Error;

/// Error that can occur during directory operations.
#[derive(Debug, Error)]
pub enum ConnectorError {
    // Connection errors (usually transient)
    /// Failed to establish connection to the directory server.
    #[error("connection failed: {message}")]
    ConnectionFailed {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Invalid bind credentials.
    #[error("authentication failed: invalid credentials")]
    AuthenticationFailed,

    // Configuration errors (permanent)
    /// Connector configuration is invalid.
    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    // Object errors
    /// The targeted identity does not exist.
    #[error("object not found: {identifier}")]
    ObjectNotFound { identifier: String },

    /// A create targeted an occupied identity.
    #[error("object already exists: {identifier}")]
    ObjectAlreadyExists { identifier: String },

    /// Delete refused because the subtree below the identity is not empty.
    #[error("object {identifier} has child entries{}", child.as_deref().map(|c| format!(" (e.g. {c})")).unwrap_or_default())]
    HasChildren {
        identifier: String,
        child: Option<String>,
    },

    /// One or more member names could not be mapped to directory identities.
    #[error("unresolved members: {}", names.join(", "))]
    UnresolvedMembers { names: Vec<String> },

    /// A lookup that must be unique matched more than one entry.
    #[error("expected at most one entry for {lookup}, found {count}")]
    AmbiguousMatch { lookup: String, count: usize },

    /// Invalid data format.
    #[error("invalid data: {message}")]
    InvalidData { message: String },

    // Protocol errors
    /// Any protocol or network failure not classified above.
    #[error("transport error: {message}")]
    Transport {
        message: String,
        result_code: Option<u32>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// An error wrapped with call-site context.
    #[error("{context}: {source}")]
    Context {
        context: String,
        source: Box<ConnectorError>,
    },
}

impl ConnectorError {
    /// The innermost error, with all context layers removed.
    pub fn root(&self) -> &ConnectorError {
        let mut current = self;
        while let ConnectorError::Context { source, .. } = current {
            current = source;
        }
        current
    }

    /// Wrap this error with call-site context.
    #[must_use]
    pub fn with_context(self, context: impl Into<String>) -> Self {
        ConnectorError::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Whether the targeted identity does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self.root(), ConnectorError::ObjectNotFound { .. })
    }

    /// Whether a create hit an occupied identity.
    pub fn is_already_exists(&self) -> bool {
        matches!(self.root(), ConnectorError::ObjectAlreadyExists { .. })
    }

    /// Whether a delete was refused because of child entries.
    pub fn has_children(&self) -> bool {
        matches!(self.root(), ConnectorError::HasChildren { .. })
    }

    /// The unresolved member names, if this is an unresolved-member failure.
    pub fn unresolved_members(&self) -> Option<&[String]> {
        match self.root() {
            ConnectorError::UnresolvedMembers { names } => Some(names),
            _ => None,
        }
    }

    /// The LDAP result code reported by the server, if any.
    pub fn result_code(&self) -> Option<u32> {
        match self.root() {
            ConnectorError::Transport { result_code, .. } => *result_code,
            ConnectorError::ObjectNotFound { .. } => Some(32),
            ConnectorError::HasChildren { .. } => Some(66),
            ConnectorError::ObjectAlreadyExists { .. } => Some(68),
            ConnectorError::AuthenticationFailed => Some(49),
            _ => None,
        }
    }

    /// Check if this error is transient and re-running the reconciliation may help.
    ///
    /// Nothing in this workspace retries; the classification is for callers.
    pub fn is_transient(&self) -> bool {
        matches!(
            self.root(),
            ConnectorError::ConnectionFailed { .. } | ConnectorError::Transport { .. }
        )
    }

    /// Get an error code for classification.
    pub fn error_code(&self) -> &'static str {
        match self.root() {
            ConnectorError::ConnectionFailed { .. } => "CONNECTION_FAILED",
            ConnectorError::AuthenticationFailed => "AUTH_FAILED",
            ConnectorError::InvalidConfiguration { .. } => "INVALID_CONFIG",
            ConnectorError::ObjectNotFound { .. } => "OBJECT_NOT_FOUND",
            ConnectorError::ObjectAlreadyExists { .. } => "OBJECT_EXISTS",
            ConnectorError::HasChildren { .. } => "HAS_CHILDREN",
            ConnectorError::UnresolvedMembers { .. } => "UNRESOLVED_MEMBER",
            ConnectorError::AmbiguousMatch { .. } => "AMBIGUOUS_MATCH",
            ConnectorError::InvalidData { .. } => "INVALID_DATA",
            ConnectorError::Transport { .. } => "TRANSPORT",
            ConnectorError::Context { .. } => unreachable!("root() strips context"),
        }
    }

    // Convenience constructors

    /// Create a connection failed error.
    pub fn connection_failed(message: impl Into<String>) -> Self {
        ConnectorError::ConnectionFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Create a connection failed error with source.
    pub fn connection_failed_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ConnectorError::ConnectionFailed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        ConnectorError::Transport {
            message: message.into(),
            result_code: None,
            source: None,
        }
    }

    /// Create a transport error carrying an LDAP result code.
    pub fn transport_with_code(message: impl Into<String>, result_code: u32) -> Self {
        ConnectorError::Transport {
            message: message.into(),
            result_code: Some(result_code),
            source: None,
        }
    }

    /// Create a transport error with source.
    pub fn transport_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ConnectorError::Transport {
            message: message.into(),
            result_code: None,
            source: Some(Box::new(source)),
        }
    }

    /// Create a not-found error for an identity.
    pub fn not_found(identifier: impl Into<String>) -> Self {
        ConnectorError::ObjectNotFound {
            identifier: identifier.into(),
        }
    }

    /// Create an already-exists error for an identity.
    pub fn already_exists(identifier: impl Into<String>) -> Self {
        ConnectorError::ObjectAlreadyExists {
            identifier: identifier.into(),
        }
    }

    /// Create an unresolved-members error; names are sorted and deduplicated.
    pub fn unresolved(names: impl IntoIterator<Item = String>) -> Self {
        let mut names: Vec<String> = names.into_iter().collect();
        names.sort();
        names.dedup();
        ConnectorError::UnresolvedMembers { names }
    }
}

/// Result type for connector operations.
pub type ConnectorResult<T> = Result<T, ConnectorError>;

/// Attach call-site context to a failed result.
pub trait ResultExt<T> {
    /// Wrap the error, if any, with the context produced by `f`.
    fn context<C, F>(self, f: F) -> ConnectorResult<T>
    where
        C: Into<String>,
        F: FnOnce() -> C;
}

impl<T> ResultExt<T> for ConnectorResult<T> {
    fn context<C, F>(self, f: F) -> ConnectorResult<T>
    where
        C: Into<String>,
        F: FnOnce() -> C,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_preserves_classification() {
        let err = ConnectorError::not_found("cn=a,dc=example,dc=com")
            .with_context("update description")
            .with_context("update group");

        assert!(err.is_not_found());
        assert!(!err.is_already_exists());
        assert_eq!(err.error_code(), "OBJECT_NOT_FOUND");
        assert_eq!(
            err.to_string(),
            "update group: update description: object not found: cn=a,dc=example,dc=com"
        );
    }

    #[test]
    fn test_result_ext_context() {
        let result: ConnectorResult<()> = Err(ConnectorError::already_exists("ou=x"));
        let err = result.context(|| "create ou x").unwrap_err();
        assert!(err.is_already_exists());
        assert!(err.to_string().starts_with("create ou x: "));
    }

    #[test]
    fn test_unresolved_members_sorted_and_complete() {
        let err = ConnectorError::unresolved(vec![
            "zed".to_string(),
            "ghost".to_string(),
            "zed".to_string(),
        ]);
        assert_eq!(
            err.unresolved_members(),
            Some(&["ghost".to_string(), "zed".to_string()][..])
        );
        assert_eq!(err.to_string(), "unresolved members: ghost, zed");
    }

    #[test]
    fn test_has_children_display() {
        let err = ConnectorError::HasChildren {
            identifier: "ou=a,dc=x".to_string(),
            child: Some("cn=b,ou=a,dc=x".to_string()),
        };
        assert!(err.has_children());
        assert_eq!(
            err.to_string(),
            "object ou=a,dc=x has child entries (e.g. cn=b,ou=a,dc=x)"
        );

        let err = ConnectorError::HasChildren {
            identifier: "ou=a,dc=x".to_string(),
            child: None,
        };
        assert_eq!(err.to_string(), "object ou=a,dc=x has child entries");
    }

    #[test]
    fn test_transient_errors() {
        let transient_errors = vec![
            ConnectorError::connection_failed("test"),
            ConnectorError::transport("test"),
            ConnectorError::transport_with_code("busy", 51).with_context("search"),
        ];

        for err in transient_errors {
            assert!(
                err.is_transient(),
                "Expected {} to be transient",
                err.error_code()
            );
        }
    }

    #[test]
    fn test_permanent_errors() {
        let permanent_errors = vec![
            ConnectorError::AuthenticationFailed,
            ConnectorError::InvalidConfiguration {
                message: "test".to_string(),
            },
            ConnectorError::already_exists("test"),
            ConnectorError::not_found("test"),
            ConnectorError::unresolved(vec!["ghost".to_string()]),
        ];

        for err in permanent_errors {
            assert!(
                !err.is_transient(),
                "Expected {} to not be transient",
                err.error_code()
            );
        }
    }

    #[test]
    fn test_result_codes() {
        assert_eq!(ConnectorError::not_found("x").result_code(), Some(32));
        assert_eq!(ConnectorError::already_exists("x").result_code(), Some(68));
        assert_eq!(
            ConnectorError::transport_with_code("x", 53).result_code(),
            Some(53)
        );
        assert_eq!(ConnectorError::transport("x").result_code(), None);
    }
}
