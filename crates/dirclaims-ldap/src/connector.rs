//! LDAP connector implementation
//!
//! Implements the directory session traits on top of `ldap3`.

use async_trait::async_trait;
use ldap3::{Ldap, LdapConnAsync, LdapResult, Mod, Scope, SearchEntry};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use dirclaims::config::BindRequest;
use dirclaims::error::{ClaimsError, ClaimsResult};
use dirclaims::reconcile::{ModifyOperation, MutationIntent};
use dirclaims::record::{AttributeRecord, DN_ATTRIBUTE};
use dirclaims::traits::{DirectoryConnector, DirectorySession, SearchScope};

use crate::config::LdapConfig;

/// `invalidCredentials`
const RC_INVALID_CREDENTIALS: u32 = 49;
/// `noSuchObject`
const RC_NO_SUCH_OBJECT: u32 = 32;
/// `entryAlreadyExists`
const RC_ALREADY_EXISTS: u32 = 68;

/// Opens authenticated LDAP sessions.
#[derive(Debug, Clone, Default)]
pub struct LdapConnector {
    config: LdapConfig,
}

impl LdapConnector {
    /// Create a new LDAP connector with the given configuration.
    pub fn new(config: LdapConfig) -> ClaimsResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// The connector configuration.
    pub fn config(&self) -> &LdapConfig {
        &self.config
    }
}

#[async_trait]
impl DirectoryConnector for LdapConnector {
    #[instrument(skip(self, request), fields(url = %request.url, bind_dn = %request.bind_dn))]
    async fn authenticate(&self, request: &BindRequest) -> ClaimsResult<Arc<dyn DirectorySession>> {
        self.config.check_url(&request.url)?;

        debug!("Connecting to LDAP server");

        let (conn, mut ldap) = LdapConnAsync::with_settings(self.config.settings(), &request.url)
            .await
            .map_err(|e| {
                ClaimsError::connection_failed_with_source(
                    format!("Failed to connect to LDAP server at {}", request.url),
                    e,
                )
            })?;

        // Spawn the connection driver
        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                warn!(error = %e, "LDAP connection driver error");
            }
        });

        debug!("Performing LDAP bind");

        let result = ldap
            .simple_bind(&request.bind_dn, &request.password)
            .await
            .map_err(|e| {
                ClaimsError::connection_failed_with_source(
                    format!("LDAP bind failed for {}", request.bind_dn),
                    e,
                )
            })?;

        if result.rc != 0 {
            if let Err(e) = ldap.unbind().await {
                debug!(error = %e, "Error during LDAP unbind");
            }
            return Err(bind_error(&result));
        }

        info!("LDAP bind successful");

        let session: Arc<dyn DirectorySession> =
            Arc::new(LdapSession::new(ldap, self.config.operation_timeout()));
        Ok(session)
    }
}

/// Error for a bind the server answered with a non-zero result code.
///
/// The server was reached, so none of these are connection failures.
fn bind_error(result: &LdapResult) -> ClaimsError {
    match result.rc {
        RC_INVALID_CREDENTIALS => ClaimsError::AuthenticationFailed,
        rc => ClaimsError::operation_failed(format!(
            "LDAP bind failed with code {rc}: {}",
            result.text
        )),
    }
}

/// An authenticated LDAP session.
#[derive(Clone)]
pub struct LdapSession {
    ldap: Ldap,
    timeout: Duration,
}

impl std::fmt::Debug for LdapSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LdapSession")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl LdapSession {
    /// Wrap an already bound `ldap3` handle.
    pub fn new(ldap: Ldap, timeout: Duration) -> Self {
        Self { ldap, timeout }
    }

    fn handle(&self) -> Ldap {
        let mut ldap = self.ldap.clone();
        ldap.with_timeout(self.timeout);
        ldap
    }

    fn to_scope(scope: SearchScope) -> Scope {
        match scope {
            SearchScope::Base => Scope::Base,
            SearchScope::OneLevel => Scope::OneLevel,
            SearchScope::Subtree => Scope::Subtree,
        }
    }

    /// Convert an LDAP search entry to a record, DN first.
    ///
    /// Attributes are ordered by name. Values that are not valid UTF-8 are
    /// dropped.
    fn entry_to_record(entry: SearchEntry) -> AttributeRecord {
        let mut record = AttributeRecord::new().with(DN_ATTRIBUTE, entry.dn);

        let mut attrs: Vec<(String, Vec<String>)> = entry.attrs.into_iter().collect();
        attrs.sort_by(|a, b| a.0.cmp(&b.0));

        for (name, mut values) in attrs {
            match values.len() {
                0 => {}
                1 => record.set(name, values.remove(0)),
                _ => record.set(name, values),
            }
        }

        if !entry.bin_attrs.is_empty() {
            debug!(
                attributes = ?entry.bin_attrs.keys().collect::<Vec<_>>(),
                "Skipping binary attributes"
            );
        }

        record
    }

    /// Convert a record to the attribute list `ldap3` adds.
    fn record_to_attrs(attributes: &AttributeRecord) -> Vec<(String, HashSet<String>)> {
        attributes
            .iter()
            .filter(|(name, value)| name.as_str() != DN_ATTRIBUTE && value.has_data())
            .map(|(name, value)| {
                let values = value.values().into_iter().map(str::to_string).collect();
                (name.clone(), values)
            })
            .collect()
    }

    /// Convert a mutation intent to an `ldap3` modification.
    fn intent_to_mod(intent: &MutationIntent) -> Mod<String> {
        let attribute = intent.attribute.clone();
        let values: HashSet<String> = intent.values.iter().cloned().collect();

        match intent.operation {
            ModifyOperation::Add => Mod::Add(attribute, values),
            ModifyOperation::Replace => Mod::Replace(attribute, values),
            ModifyOperation::Delete => Mod::Delete(attribute, values),
        }
    }

    fn check_result(result: LdapResult, dn: &str, operation: &str) -> ClaimsResult<()> {
        match result.rc {
            0 => Ok(()),
            RC_NO_SUCH_OBJECT => Err(ClaimsError::ObjectNotFound {
                identifier: dn.to_string(),
            }),
            RC_ALREADY_EXISTS => Err(ClaimsError::ObjectAlreadyExists {
                identifier: dn.to_string(),
            }),
            rc => Err(ClaimsError::operation_failed(format!(
                "LDAP {operation} failed with code {rc}: {}",
                result.text
            ))),
        }
    }
}

#[async_trait]
impl DirectorySession for LdapSession {
    #[instrument(skip(self))]
    async fn search(
        &self,
        base_dn: &str,
        filter: &str,
        scope: SearchScope,
    ) -> ClaimsResult<Vec<AttributeRecord>> {
        let mut ldap = self.handle();

        debug!("Searching LDAP");

        let result = ldap
            .search(base_dn, Self::to_scope(scope), filter, vec!["*"])
            .await
            .map_err(|e| ClaimsError::operation_failed_with_source("LDAP search failed", e))?;

        // A missing base simply has no entries
        if result.1.rc == RC_NO_SUCH_OBJECT {
            debug!(base_dn = %base_dn, "Search base does not exist");
            return Ok(Vec::new());
        }

        let (entries, _) = result.success().map_err(|e| {
            ClaimsError::operation_failed_with_source("LDAP search failed", e)
        })?;

        let records: Vec<AttributeRecord> = entries
            .into_iter()
            .map(SearchEntry::construct)
            .map(Self::entry_to_record)
            .collect();

        debug!(total_found = records.len(), "LDAP search completed");

        Ok(records)
    }

    #[instrument(skip(self, attributes))]
    async fn add(&self, dn: &str, attributes: &AttributeRecord) -> ClaimsResult<()> {
        let mut ldap = self.handle();
        let attrs = Self::record_to_attrs(attributes);

        debug!(attributes = attrs.len(), "Creating LDAP entry");

        let result = ldap.add(dn, attrs).await.map_err(|e| {
            ClaimsError::operation_failed_with_source(format!("Failed to create entry: {dn}"), e)
        })?;
        Self::check_result(result, dn, "add")?;

        info!(dn = %dn, "LDAP entry created successfully");

        Ok(())
    }

    #[instrument(skip(self, intent), fields(attribute = %intent.attribute, operation = %intent.operation))]
    async fn modify(&self, dn: &str, intent: &MutationIntent) -> ClaimsResult<()> {
        let mut ldap = self.handle();

        let result = ldap
            .modify(dn, vec![Self::intent_to_mod(intent)])
            .await
            .map_err(|e| {
                ClaimsError::operation_failed_with_source(format!("Failed to update entry: {dn}"), e)
            })?;
        Self::check_result(result, dn, "modify")?;

        debug!(dn = %dn, "LDAP entry updated");

        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete(&self, dn: &str) -> ClaimsResult<()> {
        let mut ldap = self.handle();

        let result = ldap.delete(dn).await.map_err(|e| {
            ClaimsError::operation_failed_with_source(format!("Failed to delete entry: {dn}"), e)
        })?;
        Self::check_result(result, dn, "delete")?;

        info!(dn = %dn, "LDAP entry deleted successfully");

        Ok(())
    }
}
