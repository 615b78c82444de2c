//! # LDAP Sessions
//!
//! `ldap3`-backed directory sessions for `dirclaims`.
//!
//! [`LdapConnector`] opens a connection per bind request, performs a simple
//! bind and hands the adapter an [`LdapSession`] for searches and writes.
//!
//! ## Features
//!
//! - LDAP v3 protocol support
//! - SSL/TLS and STARTTLS
//! - Per-operation timeouts
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use dirclaims::prelude::*;
//! use dirclaims_ldap::{LdapConfig, LdapConnector};
//!
//! let connector = LdapConnector::new(LdapConfig::new().with_starttls())?;
//!
//! let adapter = DirectoryAdapter::new(
//!     DirectoryOptions::new("ou=people,dc=example,dc=com", "uid"),
//!     Arc::new(connector),
//! )?
//! .with_credentials(BindCredentials::new(
//!     "ldap://ldap.example.com",
//!     "cn=admin,dc=example,dc=com",
//!     "secret",
//! ))
//! .bind(None)
//! .await?;
//! ```

pub mod config;
pub mod connector;

// Re-exports
pub use config::LdapConfig;
pub use connector::{LdapConnector, LdapSession};
