//! Active Directory connector configuration
//!
//! Connection, bind and search-base settings for one AD domain.

use serde::{Deserialize, Serialize};

use dirsync_connector::config::{ConnectionSettings, ConnectorConfig, TlsConfig};
use dirsync_connector::dn::Dn;
use dirsync_connector::error::{ConnectorError, ConnectorResult};

/// Configuration for an Active Directory domain.
#[derive(Clone, Serialize, Deserialize)]
pub struct ActiveDirectoryConfig {
    /// Domain controller hostname or IP address.
    pub host: String,

    /// LDAP port (389 for LDAP, 636 for LDAPS).
    #[serde(default = "default_ldap_port")]
    pub port: u16,

    /// AD domain name (e.g., "example.com").
    pub domain: String,

    /// Use LDAPS instead of plain LDAP.
    #[serde(default)]
    pub use_ssl: bool,

    /// StartTLS and certificate verification.
    #[serde(default)]
    pub tls: TlsConfig,

    /// Bind user: a plain account name, a UPN or a full DN.
    pub user: String,

    /// Bind password.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Base DN for member name lookups; defaults to the domain DN.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_base: Option<String>,

    /// Connection settings (timeouts).
    #[serde(default)]
    pub connection: ConnectionSettings,
}

impl std::fmt::Debug for ActiveDirectoryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveDirectoryConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("domain", &self.domain)
            .field("use_ssl", &self.use_ssl)
            .field("tls", &self.tls)
            .field("user", &self.user)
            .field(
                "password",
                &self.password.as_ref().map(|_| "***REDACTED***"),
            )
            .field("user_base", &self.user_base)
            .field("connection", &self.connection)
            .finish()
    }
}

fn default_ldap_port() -> u16 {
    389
}

/// Environment variables read by [`ActiveDirectoryConfig::from_env`].
pub mod env {
    pub const HOST: &str = "AD_HOST";
    pub const PORT: &str = "AD_PORT";
    pub const DOMAIN: &str = "AD_DOMAIN";
    pub const USE_TLS: &str = "AD_USE_TLS";
    pub const NO_CERT_VERIFY: &str = "AD_NO_CERT_VERIFY";
    pub const USER: &str = "AD_USER";
    pub const PASSWORD: &str = "AD_PASSWORD";
    pub const USER_BASE: &str = "AD_USER_BASE";
}

fn parse_bool(name: &str, value: &str) -> ConnectorResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConnectorError::InvalidConfiguration {
            message: format!("{name}: expected a boolean, got {other:?}"),
        }),
    }
}

impl ActiveDirectoryConfig {
    /// Create a new config with required fields; StartTLS on, verified.
    pub fn new(host: impl Into<String>, domain: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: default_ldap_port(),
            domain: domain.into(),
            use_ssl: false,
            tls: TlsConfig::default(),
            user: user.into(),
            password: None,
            user_base: None,
            connection: ConnectionSettings::default(),
        }
    }

    /// Set bind password.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Use LDAPS on port 636 (StartTLS off).
    #[must_use]
    pub fn with_ssl(mut self) -> Self {
        self.use_ssl = true;
        self.port = 636;
        self.tls.enabled = false;
        self
    }

    /// Set TLS options.
    #[must_use]
    pub fn with_tls(mut self, tls: TlsConfig) -> Self {
        self.tls = tls;
        self
    }

    /// Set the base DN for member lookups.
    pub fn with_user_base(mut self, base: impl Into<String>) -> Self {
        self.user_base = Some(base.into());
        self
    }

    /// Read the configuration from `AD_*` environment variables.
    pub fn from_env() -> ConnectorResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from a variable lookup.
    ///
    /// Missing optional variables fall back to defaults: port 389, StartTLS
    /// on, certificate verification on.
    pub fn from_lookup<F>(lookup: F) -> ConnectorResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| ConnectorError::InvalidConfiguration {
                    message: format!("{key} is required"),
                })
        };

        let mut config = Self::new(
            required(env::HOST)?,
            required(env::DOMAIN)?,
            required(env::USER)?,
        );
        config.password = lookup(env::PASSWORD);
        config.user_base = lookup(env::USER_BASE).filter(|v| !v.trim().is_empty());

        if let Some(port) = lookup(env::PORT) {
            config.port = port
                .trim()
                .parse()
                .map_err(|_| ConnectorError::InvalidConfiguration {
                    message: format!("{}: invalid port {port:?}", env::PORT),
                })?;
        }
        if let Some(value) = lookup(env::USE_TLS) {
            config.tls.enabled = parse_bool(env::USE_TLS, &value)?;
        }
        if let Some(value) = lookup(env::NO_CERT_VERIFY) {
            config.tls.verify_certificate = !parse_bool(env::NO_CERT_VERIFY, &value)?;
        }

        config.validate()?;
        config.tls.validate_security();
        Ok(config)
    }

    /// The domain as a DN: `Example.com` becomes `dc=example,dc=com`.
    #[must_use]
    pub fn domain_dn(&self) -> Dn {
        let dn = self
            .domain
            .trim()
            .split('.')
            .filter(|part| !part.is_empty())
            .map(|part| format!("dc={}", part.to_lowercase()))
            .collect::<Vec<_>>()
            .join(",");
        Dn::new(dn)
    }

    /// The name used for the simple bind.
    ///
    /// A DN or a UPN is used as given; a plain account name becomes
    /// `user@domain`.
    #[must_use]
    pub fn bind_identity(&self) -> String {
        let user = self.user.trim();
        if user.contains('=') || user.contains('@') {
            user.to_string()
        } else {
            format!("{}@{}", user, self.domain.trim())
        }
    }

    /// Get the LDAP URL.
    #[must_use]
    pub fn url(&self) -> String {
        let scheme = if self.use_ssl { "ldaps" } else { "ldap" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }

    /// Base DN for member name lookups.
    #[must_use]
    pub fn user_base_dn(&self) -> Dn {
        match &self.user_base {
            Some(base) => Dn::new(base.as_str()),
            None => self.domain_dn(),
        }
    }
}

impl ConnectorConfig for ActiveDirectoryConfig {
    fn validate(&self) -> ConnectorResult<()> {
        if self.host.trim().is_empty() {
            return Err(ConnectorError::InvalidConfiguration {
                message: "host is required".to_string(),
            });
        }

        if self.domain.trim().is_empty() || self.domain_dn().is_root() {
            return Err(ConnectorError::InvalidConfiguration {
                message: "domain is required".to_string(),
            });
        }

        if self.user.trim().is_empty() {
            return Err(ConnectorError::InvalidConfiguration {
                message: "user is required".to_string(),
            });
        }

        if self.port == 0 {
            return Err(ConnectorError::InvalidConfiguration {
                message: "port must be non-zero".to_string(),
            });
        }

        if self.use_ssl && self.tls.enabled {
            return Err(ConnectorError::InvalidConfiguration {
                message: "cannot use both SSL and STARTTLS".to_string(),
            });
        }

        Ok(())
    }

    fn redacted(&self) -> Self {
        let mut config = self.clone();
        if config.password.is_some() {
            config.password = Some("***REDACTED***".to_string());
        }
        config
    }
}
