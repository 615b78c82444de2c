//! Directory client traits
//!
//! The capabilities the adapter needs from a directory client. The core
//! library never performs network I/O itself; implementations such as the
//! `dirclaims-ldap` crate provide these.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::config::BindRequest;
use crate::error::ClaimsResult;
use crate::reconcile::MutationIntent;
use crate::record::AttributeRecord;

/// Search scope relative to the base DN.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SearchScope {
    /// Only the base entry itself.
    #[serde(rename = "base")]
    Base,
    /// Immediate children of the base entry.
    #[serde(rename = "one")]
    OneLevel,
    /// The base entry and its whole subtree.
    #[default]
    #[serde(rename = "sub")]
    Subtree,
}

impl fmt::Display for SearchScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchScope::Base => write!(f, "base"),
            SearchScope::OneLevel => write!(f, "one"),
            SearchScope::Subtree => write!(f, "sub"),
        }
    }
}

/// An authenticated session against a directory.
///
/// Records returned by [`search`](Self::search) carry their distinguished
/// name under [`DN_ATTRIBUTE`](crate::record::DN_ATTRIBUTE).
#[async_trait]
pub trait DirectorySession: Send + Sync {
    /// Search for entries matching `filter` below `base_dn`.
    async fn search(
        &self,
        base_dn: &str,
        filter: &str,
        scope: SearchScope,
    ) -> ClaimsResult<Vec<AttributeRecord>>;

    /// Create a new entry.
    ///
    /// A `dn` key in `attributes` is ignored.
    async fn add(&self, dn: &str, attributes: &AttributeRecord) -> ClaimsResult<()>;

    /// Apply a single attribute change to an entry.
    async fn modify(&self, dn: &str, intent: &MutationIntent) -> ClaimsResult<()>;

    /// Delete an entry.
    async fn delete(&self, dn: &str) -> ClaimsResult<()>;
}

/// Opens authenticated sessions.
#[async_trait]
pub trait DirectoryConnector: Send + Sync {
    /// Connect and bind with the given credentials.
    ///
    /// Rejected credentials must surface as
    /// [`ClaimsError::AuthenticationFailed`](crate::error::ClaimsError::AuthenticationFailed).
    async fn authenticate(&self, request: &BindRequest) -> ClaimsResult<Arc<dyn DirectorySession>>;
}
