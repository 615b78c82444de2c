//! # Directory Claims
//!
//! Translate directory entries into identity claims and back.
//!
//! This crate maps flat directory attribute records (an LDAP entry with
//! single- or multi-valued string attributes) onto nested claim documents
//! such as OIDC user profiles, and computes the attribute changes needed to
//! store an updated claim document back into the directory.
//!
//! ## Architecture
//!
//! - [`filter`] - Compile nested operator trees into LDAP filter text
//! - [`transform`] - Value transforms applied between attributes and claims
//! - [`mapping`] - Declarative claim mapping, forward and reverse
//! - [`aliases`] - Synonym families for attributes stored under several names
//! - [`reconcile`] - Minimal add / replace / delete changes for an entry
//! - [`adapter`] - Orchestrates the above against a directory session
//!
//! Nothing in this crate opens a network connection. Directory access goes
//! through the [`DirectoryConnector`](traits::DirectoryConnector) and
//! [`DirectorySession`](traits::DirectorySession) traits; the
//! `dirclaims-ldap` crate implements them with `ldap3`.
//!
//! ## Example
//!
//! ```ignore
//! use dirclaims::prelude::*;
//!
//! let mapping = MappingSpec::from_json(r#"{
//!     "sub": {"attribute": ["uid", "userid"]},
//!     "email": "mail",
//!     "address.locality": "l"
//! }"#)?;
//!
//! let options = DirectoryOptions::new("ou=people,dc=example,dc=com", "uid")
//!     .with_object_class("inetOrgPerson")
//!     .with_upsert(UpsertOptions::new("uid", ["top", "inetOrgPerson"]));
//!
//! let adapter = DirectoryAdapter::new(options, connector)?
//!     .with_mapping(mapping)?
//!     .with_credentials(BindCredentials::new(url, "cn=admin,dc=example,dc=com", password))
//!     .bind(None)
//!     .await?;
//!
//! let claims = adapter.find("bob").await?;
//! adapter.upsert("bob", &updated_claims).await?;
//! ```

pub mod adapter;
pub mod aliases;
pub mod config;
pub mod error;
pub mod filter;
pub mod mapping;
pub mod reconcile;
pub mod record;
pub mod traits;
pub mod transform;

/// Prelude module for convenient imports.
///
/// ```
/// use dirclaims::prelude::*;
/// ```
pub mod prelude {
    // Records
    pub use crate::record::{AttributeRecord, AttributeValue, ClaimDocument, DN_ATTRIBUTE};

    // Error handling
    pub use crate::error::{ClaimsError, ClaimsResult};

    // Filters
    pub use crate::filter::{build_filter, escape_dn_value, escape_filter_value, FilterNode};

    // Mapping
    pub use crate::aliases::{find_aliases, AliasTable};
    pub use crate::mapping::{
        map_claims, reverse_claims, AttributeMapping, AttributeSelector, ClaimMapper, MappingSpec,
    };
    pub use crate::transform::TransformEngine;

    // Reconciliation
    pub use crate::reconcile::{diff, ModifyOperation, MutationIntent};

    // Configuration
    pub use crate::config::{BindCredentials, BindRequest, DirectoryOptions, UpsertOptions};

    // Traits
    pub use crate::traits::{DirectoryConnector, DirectorySession, SearchScope};

    // Adapter
    pub use crate::adapter::{DirectoryAdapter, ReconcileReport, UpsertOutcome};
}

// Re-export async_trait for session implementors
pub use async_trait::async_trait;
