//! Directory adapter
//!
//! Ties filter construction, claim mapping and entry reconciliation to a
//! directory session. An adapter is cheap to clone; binding or deriving
//! returns a new adapter and never changes the one it was called on.

use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::config::{BindCredentials, DirectoryOptions};
use crate::error::{ClaimsError, ClaimsResult};
use crate::filter::FilterNode;
use crate::mapping::{ClaimMapper, MappingSpec};
use crate::reconcile::{diff, MutationIntent};
use crate::record::{AttributeRecord, ClaimDocument, DN_ATTRIBUTE};
use crate::traits::{DirectoryConnector, DirectorySession, SearchScope};

/// Attribute holding an entry's object classes.
pub const OBJECT_CLASS_ATTRIBUTE: &str = "objectClass";

/// Filter used when a built filter comes out empty.
const MATCH_ALL: &str = "(objectClass=*)";

/// Result of an [`upsert`](DirectoryAdapter::upsert).
#[derive(Debug)]
pub enum UpsertOutcome {
    /// A new entry was created at `dn`.
    Created { dn: String },
    /// An existing entry was reconciled.
    Updated(ReconcileReport),
}

impl UpsertOutcome {
    /// DN of the created or updated entry.
    pub fn dn(&self) -> &str {
        match self {
            UpsertOutcome::Created { dn } => dn,
            UpsertOutcome::Updated(report) => &report.dn,
        }
    }
}

/// What reconciling one entry did.
///
/// Changes are applied one at a time; a rejected change is recorded in
/// `failed` and the remaining ones are still attempted.
#[derive(Debug, Default)]
pub struct ReconcileReport {
    /// DN of the reconciled entry.
    pub dn: String,
    /// Changes the directory accepted.
    pub applied: Vec<MutationIntent>,
    /// Changes the directory rejected, as [`ClaimsError::MutationFailed`].
    pub failed: Vec<ClaimsError>,
}

impl ReconcileReport {
    /// Whether every change was applied.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Whether the entry already matched.
    pub fn is_unchanged(&self) -> bool {
        self.applied.is_empty() && self.failed.is_empty()
    }
}

/// Finds, binds, upserts and deletes directory entries in claim form.
#[derive(Clone)]
pub struct DirectoryAdapter {
    options: Arc<DirectoryOptions>,
    mapper: Arc<ClaimMapper>,
    credentials: BindCredentials,
    connector: Arc<dyn DirectoryConnector>,
    session: Option<Arc<dyn DirectorySession>>,
}

impl fmt::Debug for DirectoryAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectoryAdapter")
            .field("options", &self.options)
            .field("mapped_claims", &self.mapper.spec().len())
            .field("credentials", &self.credentials)
            .field("bound", &self.session.is_some())
            .finish()
    }
}

impl DirectoryAdapter {
    /// Create an unbound adapter with an empty mapping.
    pub fn new(
        options: DirectoryOptions,
        connector: Arc<dyn DirectoryConnector>,
    ) -> ClaimsResult<Self> {
        options.validate()?;

        Ok(Self {
            options: Arc::new(options),
            mapper: Arc::new(ClaimMapper::default()),
            credentials: BindCredentials::default(),
            connector,
            session: None,
        })
    }

    /// Use `spec` for claim mapping.
    ///
    /// With an empty mapping, entries are exposed and stored with their raw
    /// attribute names.
    pub fn with_mapping(mut self, spec: MappingSpec) -> ClaimsResult<Self> {
        spec.validate()?;
        self.mapper = Arc::new(ClaimMapper::new(spec));
        Ok(self)
    }

    /// Use these credentials for [`bind`](Self::bind).
    pub fn with_credentials(mut self, credentials: BindCredentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// Use an already authenticated session.
    pub fn with_session(mut self, session: Arc<dyn DirectorySession>) -> Self {
        self.session = Some(session);
        self
    }

    /// The adapter options.
    pub fn options(&self) -> &DirectoryOptions {
        &self.options
    }

    /// The claim mapper.
    pub fn mapper(&self) -> &ClaimMapper {
        &self.mapper
    }

    /// Whether the adapter holds a session.
    pub fn is_bound(&self) -> bool {
        self.session.is_some()
    }

    fn session(&self) -> ClaimsResult<&Arc<dyn DirectorySession>> {
        self.session.as_ref().ok_or(ClaimsError::NotConnected)
    }

    /// Authenticate and return an adapter holding the new session.
    ///
    /// `overrides` are merged over the configured credentials. URL, bind DN
    /// and password must all be known afterwards. Rejections other than
    /// connection failures are reported as
    /// [`ClaimsError::AuthenticationFailed`].
    #[instrument(skip(self, overrides))]
    pub async fn bind(&self, overrides: Option<&BindCredentials>) -> ClaimsResult<Self> {
        let credentials = match overrides {
            Some(overrides) => self.credentials.merge(overrides),
            None => self.credentials.clone(),
        };
        let request = credentials.to_request()?;

        debug!(url = %request.url, bind_dn = %request.bind_dn, "Binding to directory");

        let session = match self.connector.authenticate(&request).await {
            Ok(session) => session,
            Err(e @ ClaimsError::ConnectionFailed { .. }) => return Err(e),
            Err(e) => {
                debug!(bind_dn = %request.bind_dn, error = %e, "Bind rejected");
                return Err(ClaimsError::AuthenticationFailed);
            }
        };

        info!(bind_dn = %request.bind_dn, "Directory bind successful");

        Ok(Self {
            credentials,
            session: Some(session),
            ..self.clone()
        })
    }

    /// An adapter sharing this session with a different base DN or mapping.
    ///
    /// A new mapping gets its own alias table.
    pub fn derive(
        &self,
        base_dn: Option<&str>,
        mapping: Option<MappingSpec>,
    ) -> ClaimsResult<Self> {
        let mut derived = self.clone();

        if let Some(base_dn) = base_dn {
            let mut options = (*self.options).clone();
            options.base_dn = base_dn.to_string();
            options.validate()?;
            derived.options = Arc::new(options);
        }

        match mapping {
            Some(spec) => derived.with_mapping(spec),
            None => Ok(derived),
        }
    }

    /// Run a search with a filter tree.
    ///
    /// An empty filter matches every entry in scope.
    #[instrument(skip(self, filter))]
    pub async fn search(
        &self,
        filter: &FilterNode,
        base_dn: &str,
        scope: SearchScope,
    ) -> ClaimsResult<Vec<AttributeRecord>> {
        let session = self.session()?;

        let mut filter_text = filter.build();
        if filter_text.is_empty() {
            filter_text = MATCH_ALL.to_string();
        }

        debug!(filter = %filter_text, base_dn = %base_dn, scope = %scope, "Searching directory");

        let entries = session.search(base_dn, &filter_text, scope).await?;

        debug!(count = entries.len(), "Search completed");

        Ok(entries)
    }

    /// `(&(objectClass=<class>)(<attribute>=<value>)<extra filter>)`
    fn lookup_filter(&self, key: Option<(&str, &str)>) -> FilterNode {
        let mut operands = vec![FilterNode::predicate(format!(
            "{}={}",
            OBJECT_CLASS_ATTRIBUTE, self.options.object_class
        ))];

        if let Some((attribute, value)) = key {
            operands.push(FilterNode::eq(attribute, value));
        }

        if let Some(extra) = self.options.filter.as_ref().filter(|f| !f.is_empty()) {
            operands.push(extra.clone());
        }

        FilterNode::and(operands)
    }

    /// Look up the entry for `id` without mapping it.
    ///
    /// Without an id the base DN itself is read. Returns `None` unless
    /// exactly one entry matches.
    #[instrument(skip(self))]
    pub async fn raw_find(
        &self,
        id: Option<&str>,
        scope: Option<SearchScope>,
    ) -> ClaimsResult<Option<AttributeRecord>> {
        let (filter, scope) = match id {
            Some(id) => (
                self.lookup_filter(Some((self.options.id_attribute.as_str(), id))),
                scope.unwrap_or(self.options.scope),
            ),
            None => (self.lookup_filter(None), SearchScope::Base),
        };

        let mut entries = self.search(&filter, &self.options.base_dn, scope).await?;

        if entries.len() != 1 {
            debug!(count = entries.len(), "Lookup did not match exactly one entry");
            return Ok(None);
        }

        Ok(entries.pop())
    }

    /// Look up the entry for `id` as claims.
    #[instrument(skip(self))]
    pub async fn find(&self, id: &str) -> ClaimsResult<Option<ClaimDocument>> {
        let Some(entry) = self.raw_find(Some(id), None).await? else {
            return Ok(None);
        };

        if self.mapper.is_empty() {
            return Ok(Some(ClaimDocument::from_record(&entry)));
        }

        let force_array: Vec<&str> = self
            .options
            .force_array_claims
            .iter()
            .map(String::as_str)
            .collect();

        Ok(Some(self.mapper.map_claims(&entry, &force_array)))
    }

    /// Authenticate as the entry whose bind attribute equals `id`.
    ///
    /// The returned adapter is bound as that entry and uses its DN as base.
    /// No match and several matches are both reported as
    /// [`ClaimsError::AuthenticationFailed`].
    #[instrument(skip(self, password))]
    pub async fn find_and_bind(&self, id: &str, password: &str) -> ClaimsResult<Self> {
        let Some(bind_attribute) = self.options.bind_attribute.as_deref() else {
            debug!("Entries are not allowed to bind");
            return Err(ClaimsError::MissingOption {
                option: "bind_attribute",
            });
        };

        let filter = self.lookup_filter(Some((bind_attribute, id)));
        let entries = self
            .search(&filter, &self.options.base_dn, self.options.scope)
            .await?;

        let dn = match entries.as_slice() {
            [entry] => entry.dn().map(str::to_string).ok_or_else(|| {
                ClaimsError::operation_failed("search result carries no distinguished name")
            })?,
            [] => {
                debug!("Bind entry not found");
                return Err(ClaimsError::AuthenticationFailed);
            }
            _ => {
                warn!(count = entries.len(), "Bind entry not unique");
                return Err(ClaimsError::AuthenticationFailed);
            }
        };

        let credentials = BindCredentials::default()
            .with_bind_dn(dn.clone())
            .with_password(password);

        self.derive(Some(&dn), None)?
            .bind(Some(&credentials))
            .await
    }

    /// Create or reconcile the entry for `id` from a claim payload.
    ///
    /// Fails with [`ClaimsError::LostPayload`] before touching the directory
    /// when a non-empty payload maps to no attribute.
    #[instrument(skip(self, payload))]
    pub async fn upsert(&self, id: &str, payload: &ClaimDocument) -> ClaimsResult<UpsertOutcome> {
        let desired = if self.mapper.is_empty() {
            payload.to_record()
        } else {
            self.mapper.reverse_claims(payload)
        };

        if desired.is_empty() && !payload.is_empty() {
            warn!(id = %id, "Payload maps to no directory attribute");
            return Err(ClaimsError::LostPayload { id: id.to_string() });
        }

        match self.raw_find(Some(id), None).await? {
            None => {
                debug!(id = %id, "Inserting new entry");
                let dn = self.insert_entry(id, desired).await?;
                Ok(UpsertOutcome::Created { dn })
            }
            Some(entry) => {
                debug!(id = %id, "Updating existing entry");
                let report = self.update_entry(&entry, &desired).await?;
                Ok(UpsertOutcome::Updated(report))
            }
        }
    }

    /// Create a new entry for `id` and return its DN.
    ///
    /// The RDN attribute is set to `id` and the object classes to the
    /// configured ones.
    #[instrument(skip(self, attributes))]
    pub async fn insert_entry(
        &self,
        id: &str,
        mut attributes: AttributeRecord,
    ) -> ClaimsResult<String> {
        let session = self.session()?;
        let upsert = self
            .options
            .upsert
            .as_ref()
            .ok_or(ClaimsError::MissingOption { option: "upsert" })?;

        attributes.remove(DN_ATTRIBUTE);
        attributes.set(upsert.rdn_attribute.clone(), id);
        attributes.set(OBJECT_CLASS_ATTRIBUTE, upsert.object_classes.clone());

        let dn = upsert.entry_dn(id, &self.options.base_dn);

        debug!(dn = %dn, attributes = attributes.len(), "Creating entry");

        session.add(&dn, &attributes).await?;

        info!(dn = %dn, "Entry created");

        Ok(dn)
    }

    /// Converge `existing` onto `desired`.
    ///
    /// The DN, object classes and RDN attribute are never changed. Attributes
    /// absent from `desired` are left alone.
    #[instrument(skip_all)]
    pub async fn update_entry(
        &self,
        existing: &AttributeRecord,
        desired: &AttributeRecord,
    ) -> ClaimsResult<ReconcileReport> {
        let session = self.session()?;
        let dn = existing
            .dn()
            .map(str::to_string)
            .ok_or_else(|| {
                ClaimsError::operation_failed("existing entry has no distinguished name")
            })?;

        let mut protected = vec![DN_ATTRIBUTE, OBJECT_CLASS_ATTRIBUTE];
        if let Some(upsert) = &self.options.upsert {
            protected.push(upsert.rdn_attribute.as_str());
        }

        let intents = diff(existing, desired, self.mapper.aliases(), &protected);

        debug!(dn = %dn, changes = intents.len(), "Reconciling entry");

        let mut report = ReconcileReport {
            dn,
            ..Default::default()
        };

        for intent in intents {
            match session.modify(&report.dn, &intent).await {
                Ok(()) => {
                    debug!(
                        attribute = %intent.attribute,
                        operation = %intent.operation,
                        "Change applied"
                    );
                    report.applied.push(intent);
                }
                Err(e) => {
                    warn!(
                        dn = %report.dn,
                        attribute = %intent.attribute,
                        operation = %intent.operation,
                        error = %e,
                        "Change not applied"
                    );
                    report.failed.push(ClaimsError::MutationFailed {
                        attribute: intent.attribute,
                        operation: intent.operation,
                        message: e.to_string(),
                    });
                }
            }
        }

        info!(
            dn = %report.dn,
            applied = report.applied.len(),
            failed = report.failed.len(),
            "Entry reconciled"
        );

        Ok(report)
    }

    /// Delete the entry for `id`.
    ///
    /// Returns `false` when no single entry matches.
    #[instrument(skip(self))]
    pub async fn destroy(&self, id: &str) -> ClaimsResult<bool> {
        let Some(entry) = self.raw_find(Some(id), None).await? else {
            debug!(id = %id, "Nothing to delete");
            return Ok(false);
        };
        let Some(dn) = entry.dn() else {
            debug!(id = %id, "Entry carries no distinguished name");
            return Ok(false);
        };

        if let Err(e) = self.session()?.delete(dn).await {
            warn!(dn = %dn, error = %e, "Entry cannot be deleted");
            return Err(e);
        }

        info!(dn = %dn, "Entry deleted");

        Ok(true)
    }

    /// Invalidate the entry for `id`.
    ///
    /// Directories have no notion of a consumed entry, so this deletes it.
    pub async fn consume(&self, id: &str) -> ClaimsResult<bool> {
        self.destroy(id).await
    }
}
