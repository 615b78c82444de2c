//! Shared test utilities for adapter integration tests.
//!
//! Provides an in-memory directory implementing the session and connector
//! traits, with enough filter evaluation for the adapter's lookups.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, Once};

use dirclaims::async_trait;
use dirclaims::prelude::*;

static INIT: Once = Once::new();

/// Initialize test logging (call once per test module).
pub fn init_test_logging() {
    INIT.call_once(|| {
        // Only initialize if RUST_LOG is set
        if std::env::var("RUST_LOG").is_ok() {
            tracing_subscriber::fmt()
                .with_test_writer()
                .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                .try_init()
                .ok();
        }
    });
}

pub const BASE_DN: &str = "ou=people,dc=example,dc=com";
pub const ADMIN_DN: &str = "cn=admin,dc=example,dc=com";
pub const ADMIN_PASSWORD: &str = "admin-secret";
pub const URL: &str = "ldap://memory.test";
pub const UNREACHABLE_URL: &str = "ldap://unreachable.test";

/// An in-memory directory.
#[derive(Default)]
pub struct MemoryDirectory {
    entries: Mutex<Vec<AttributeRecord>>,
    passwords: Mutex<HashMap<String, String>>,
    failing_attributes: Mutex<HashSet<String>>,
    modifications: Mutex<Vec<(String, MutationIntent)>>,
    binds: Mutex<Vec<String>>,
    searches: Mutex<Vec<String>>,
}

impl MemoryDirectory {
    pub fn new() -> Arc<Self> {
        let directory = Arc::new(Self::default());
        directory.set_password(ADMIN_DN, ADMIN_PASSWORD);
        directory
    }

    /// Store an entry; `record` must carry a `dn`.
    pub fn insert(&self, record: AttributeRecord) {
        self.entries.lock().unwrap().push(record);
    }

    pub fn set_password(&self, dn: &str, password: &str) {
        self.passwords
            .lock()
            .unwrap()
            .insert(dn.to_lowercase(), password.to_string());
    }

    /// Reject every modification of `attribute`.
    pub fn fail_attribute(&self, attribute: &str) {
        self.failing_attributes
            .lock()
            .unwrap()
            .insert(attribute.to_string());
    }

    pub fn entry(&self, dn: &str) -> Option<AttributeRecord> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .find(|e| same_dn(e.dn().unwrap_or_default(), dn))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn modifications(&self) -> Vec<(String, MutationIntent)> {
        self.modifications.lock().unwrap().clone()
    }

    pub fn binds(&self) -> Vec<String> {
        self.binds.lock().unwrap().clone()
    }

    pub fn searches(&self) -> Vec<String> {
        self.searches.lock().unwrap().clone()
    }
}

#[async_trait]
impl DirectorySession for MemoryDirectory {
    async fn search(
        &self,
        base_dn: &str,
        filter: &str,
        scope: SearchScope,
    ) -> ClaimsResult<Vec<AttributeRecord>> {
        self.searches.lock().unwrap().push(filter.to_string());

        Ok(self
            .entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| in_scope(e.dn().unwrap_or_default(), base_dn, scope))
            .filter(|e| matches_filter(filter, e))
            .cloned()
            .collect())
    }

    async fn add(&self, dn: &str, attributes: &AttributeRecord) -> ClaimsResult<()> {
        if self.entry(dn).is_some() {
            return Err(ClaimsError::ObjectAlreadyExists {
                identifier: dn.to_string(),
            });
        }

        let mut record = AttributeRecord::new().with(DN_ATTRIBUTE, dn);
        for (name, value) in attributes.iter() {
            if name != DN_ATTRIBUTE {
                record.set(name.clone(), value.clone());
            }
        }
        self.insert(record);
        Ok(())
    }

    async fn modify(&self, dn: &str, intent: &MutationIntent) -> ClaimsResult<()> {
        if self
            .failing_attributes
            .lock()
            .unwrap()
            .contains(&intent.attribute)
        {
            return Err(ClaimsError::operation_failed("constraint violation"));
        }

        let mut entries = self.entries.lock().unwrap();
        let entry = entries
            .iter_mut()
            .find(|e| same_dn(e.dn().unwrap_or_default(), dn))
            .ok_or_else(|| ClaimsError::ObjectNotFound {
                identifier: dn.to_string(),
            })?;

        let current: Vec<String> = entry
            .get(&intent.attribute)
            .map(|v| v.clone().into_values())
            .unwrap_or_default();

        let updated: Vec<String> = match intent.operation {
            ModifyOperation::Add => {
                let mut values = current;
                for value in &intent.values {
                    if !values.contains(value) {
                        values.push(value.clone());
                    }
                }
                values
            }
            ModifyOperation::Replace => intent.values.clone(),
            ModifyOperation::Delete if intent.values.is_empty() => Vec::new(),
            ModifyOperation::Delete => current
                .into_iter()
                .filter(|v| !intent.values.contains(v))
                .collect(),
        };

        match updated.len() {
            0 => {
                entry.remove(&intent.attribute);
            }
            1 => entry.set(intent.attribute.clone(), updated[0].clone()),
            _ => entry.set(intent.attribute.clone(), updated),
        }

        self.modifications
            .lock()
            .unwrap()
            .push((dn.to_string(), intent.clone()));
        Ok(())
    }

    async fn delete(&self, dn: &str) -> ClaimsResult<()> {
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|e| !same_dn(e.dn().unwrap_or_default(), dn));

        if entries.len() == before {
            return Err(ClaimsError::ObjectNotFound {
                identifier: dn.to_string(),
            });
        }
        Ok(())
    }
}

/// Connector handing out sessions on a shared [`MemoryDirectory`].
pub struct MemoryConnector {
    pub directory: Arc<MemoryDirectory>,
}

#[async_trait]
impl DirectoryConnector for MemoryConnector {
    async fn authenticate(
        &self,
        request: &BindRequest,
    ) -> ClaimsResult<Arc<dyn DirectorySession>> {
        if request.url == UNREACHABLE_URL {
            return Err(ClaimsError::connection_failed("connection refused"));
        }

        let known = self
            .directory
            .passwords
            .lock()
            .unwrap()
            .get(&request.bind_dn.to_lowercase())
            .cloned();

        match known {
            Some(password) if password == request.password => {
                self.directory
                    .binds
                    .lock()
                    .unwrap()
                    .push(request.bind_dn.clone());
                let session: Arc<dyn DirectorySession> = self.directory.clone();
                Ok(session)
            }
            _ => Err(ClaimsError::operation_failed("invalid credentials (49)")),
        }
    }
}

pub fn admin_credentials() -> BindCredentials {
    BindCredentials::new(URL, ADMIN_DN, ADMIN_PASSWORD)
}

pub fn person(uid: &str) -> AttributeRecord {
    AttributeRecord::new()
        .with(DN_ATTRIBUTE, format!("uid={uid},{BASE_DN}"))
        .with("objectClass", vec!["top", "inetOrgPerson"])
        .with("uid", uid)
}

/// A directory with the people container, bob and a retired account.
pub fn seeded_directory() -> Arc<MemoryDirectory> {
    let directory = MemoryDirectory::new();

    directory.insert(
        AttributeRecord::new()
            .with(DN_ATTRIBUTE, BASE_DN)
            .with("objectClass", vec!["top", "organizationalUnit"])
            .with("ou", "people"),
    );
    directory.insert(
        person("bob")
            .with("cn", "Bob Builder")
            .with("sn", "Builder")
            .with("mail", vec!["bob@example.com", "builder@example.com"])
            .with("l", "Zurich")
            .with("description", "managed by operators"),
    );
    directory.insert(
        person("ret")
            .with("cn", "Retired User")
            .with("employeeType", "retired"),
    );
    directory.set_password(&format!("uid=bob,{BASE_DN}"), "bob-secret");

    directory
}

pub fn profile_mapping() -> MappingSpec {
    MappingSpec::from_json(
        r#"{
            "sub": "uid",
            "name": "cn",
            "family_name": {"attribute": ["sn", "surname"]},
            "email": {"attribute": "mail", "array": true},
            "address.locality": "l"
        }"#,
    )
    .unwrap()
}

pub fn people_options() -> DirectoryOptions {
    DirectoryOptions::new(BASE_DN, "uid")
        .with_object_class("inetOrgPerson")
        .with_bind_attribute("uid")
        .with_upsert(UpsertOptions::new("uid", ["top", "inetOrgPerson"]))
}

/// An admin-bound adapter over `directory`.
pub async fn bound_adapter(
    directory: &Arc<MemoryDirectory>,
    options: DirectoryOptions,
    mapping: MappingSpec,
) -> DirectoryAdapter {
    init_test_logging();

    let connector = Arc::new(MemoryConnector {
        directory: directory.clone(),
    });

    DirectoryAdapter::new(options, connector)
        .unwrap()
        .with_mapping(mapping)
        .unwrap()
        .with_credentials(admin_credentials())
        .bind(None)
        .await
        .unwrap()
}

fn same_dn(left: &str, right: &str) -> bool {
    left.eq_ignore_ascii_case(right)
}

fn split_rdn(dn: &str) -> Option<&str> {
    let bytes = dn.as_bytes();
    (0..bytes.len())
        .find(|&i| bytes[i] == b',' && (i == 0 || bytes[i - 1] != b'\\'))
        .map(|i| &dn[i + 1..])
}

fn in_scope(dn: &str, base: &str, scope: SearchScope) -> bool {
    let parent = split_rdn(dn);
    match scope {
        SearchScope::Base => same_dn(dn, base),
        SearchScope::OneLevel => parent.is_some_and(|p| same_dn(p, base)),
        SearchScope::Subtree => {
            same_dn(dn, base) || dn.to_lowercase().ends_with(&format!(",{}", base.to_lowercase()))
        }
    }
}

/// Evaluate RFC 4515 filter text limited to `&`, `|`, `!`, equality and
/// presence.
pub fn matches_filter(filter: &str, entry: &AttributeRecord) -> bool {
    eval(filter, entry).map(|(result, _)| result).unwrap_or(false)
}

fn eval<'a>(filter: &'a str, entry: &AttributeRecord) -> Option<(bool, &'a str)> {
    let inner = filter.strip_prefix('(')?;

    match inner.chars().next()? {
        op @ ('&' | '|') => {
            let mut rest = &inner[1..];
            let mut results = Vec::new();
            while rest.starts_with('(') {
                let (result, next) = eval(rest, entry)?;
                results.push(result);
                rest = next;
            }
            let result = if op == '&' {
                results.iter().all(|r| *r)
            } else {
                results.iter().any(|r| *r)
            };
            Some((result, rest.strip_prefix(')')?))
        }
        '!' => {
            let (result, rest) = eval(&inner[1..], entry)?;
            Some((!result, rest.strip_prefix(')')?))
        }
        _ => {
            let end = inner.find(')')?;
            let (attribute, value) = inner[..end].split_once('=')?;
            Some((matches_predicate(attribute, value, entry), &inner[end + 1..]))
        }
    }
}

fn matches_predicate(attribute: &str, value: &str, entry: &AttributeRecord) -> bool {
    let Some((_, stored)) = entry
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(attribute))
    else {
        return false;
    };

    if value == "*" {
        return true;
    }

    let wanted = unescape(value);
    stored
        .values()
        .iter()
        .any(|v| v.eq_ignore_ascii_case(&wanted))
}

fn unescape(value: &str) -> String {
    value
        .replace("\\2a", "*")
        .replace("\\28", "(")
        .replace("\\29", ")")
        .replace("\\00", "\0")
        .replace("\\5c", "\\")
}
