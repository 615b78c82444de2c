//! LDAP connection configuration
//!
//! Transport settings for sessions opened by [`LdapConnector`](crate::LdapConnector).
//! Server URL and credentials come from the adapter's bind request.

use ldap3::LdapConnSettings;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use dirclaims::error::{ClaimsError, ClaimsResult};

/// URL schemes accepted by the connector.
pub const SUPPORTED_SCHEMES: [&str; 3] = ["ldap://", "ldaps://", "ldapi://"];

/// Configuration for LDAP sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LdapConfig {
    /// Connection timeout in seconds.
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_secs: u64,

    /// Timeout for each search, add, modify and delete, in seconds.
    #[serde(default = "default_operation_timeout")]
    pub operation_timeout_secs: u64,

    /// Use STARTTLS upgrade on plain LDAP connection.
    #[serde(default)]
    pub use_starttls: bool,

    /// Skip server certificate verification.
    #[serde(default)]
    pub no_tls_verify: bool,
}

fn default_connection_timeout() -> u64 {
    30
}

fn default_operation_timeout() -> u64 {
    60
}

impl Default for LdapConfig {
    fn default() -> Self {
        Self {
            connection_timeout_secs: default_connection_timeout(),
            operation_timeout_secs: default_operation_timeout(),
            use_starttls: false,
            no_tls_verify: false,
        }
    }
}

impl LdapConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the connection timeout.
    pub fn with_connection_timeout(mut self, secs: u64) -> Self {
        self.connection_timeout_secs = secs;
        self
    }

    /// Set the per-operation timeout.
    pub fn with_operation_timeout(mut self, secs: u64) -> Self {
        self.operation_timeout_secs = secs;
        self
    }

    /// Upgrade plain connections with STARTTLS.
    pub fn with_starttls(mut self) -> Self {
        self.use_starttls = true;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> ClaimsResult<()> {
        if self.connection_timeout_secs == 0 {
            return Err(ClaimsError::invalid_configuration(
                "connection_timeout_secs must be positive",
            ));
        }
        if self.operation_timeout_secs == 0 {
            return Err(ClaimsError::invalid_configuration(
                "operation_timeout_secs must be positive",
            ));
        }
        if self.no_tls_verify {
            tracing::warn!(
                target: "security",
                "TLS certificate verification is DISABLED for LDAP sessions"
            );
        }
        Ok(())
    }

    /// Check that `url` can be used with this configuration.
    pub fn check_url(&self, url: &str) -> ClaimsResult<()> {
        let lower = url.to_ascii_lowercase();
        if !SUPPORTED_SCHEMES.iter().any(|scheme| lower.starts_with(scheme)) {
            return Err(ClaimsError::invalid_configuration(format!(
                "unsupported LDAP URL: {url}"
            )));
        }
        if self.use_starttls && !lower.starts_with("ldap://") {
            return Err(ClaimsError::invalid_configuration(
                "STARTTLS requires an ldap:// URL",
            ));
        }
        Ok(())
    }

    /// Connection timeout as Duration.
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }

    /// Per-operation timeout as Duration.
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }

    /// `ldap3` connection settings.
    pub fn settings(&self) -> LdapConnSettings {
        LdapConnSettings::new()
            .set_conn_timeout(self.connection_timeout())
            .set_starttls(self.use_starttls)
            .set_no_tls_verify(self.no_tls_verify)
    }
}
