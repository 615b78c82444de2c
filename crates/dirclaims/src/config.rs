//! Adapter configuration types
//!
//! Where entries live, how they are identified, how new ones are created,
//! and which credentials open a session.

use serde::{Deserialize, Serialize};

use crate::error::{ClaimsError, ClaimsResult};
use crate::filter::{escape_dn_value, FilterNode};
use crate::traits::SearchScope;

/// Directory layout and lookup options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryOptions {
    /// Base DN searches start from.
    pub base_dn: String,

    /// Object class every lookup is restricted to.
    #[serde(default = "default_object_class")]
    pub object_class: String,

    /// Default scope for lookups by id.
    #[serde(default)]
    pub scope: SearchScope,

    /// Attribute holding the entry identifier used by `find` and `upsert`.
    pub id_attribute: String,

    /// Attribute holding the login name used by `find_and_bind`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind_attribute: Option<String>,

    /// Extra filter appended to every lookup.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<FilterNode>,

    /// How new entries are created; upserts of unknown ids fail without it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upsert: Option<UpsertOptions>,

    /// Claims always returned as arrays.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub force_array_claims: Vec<String>,
}

fn default_object_class() -> String {
    "*".to_string()
}

impl DirectoryOptions {
    /// Create options with the given base DN and id attribute.
    pub fn new(base_dn: impl Into<String>, id_attribute: impl Into<String>) -> Self {
        Self {
            base_dn: base_dn.into(),
            object_class: default_object_class(),
            scope: SearchScope::default(),
            id_attribute: id_attribute.into(),
            bind_attribute: None,
            filter: None,
            upsert: None,
            force_array_claims: Vec::new(),
        }
    }

    /// Restrict lookups to an object class.
    pub fn with_object_class(mut self, object_class: impl Into<String>) -> Self {
        self.object_class = object_class.into();
        self
    }

    /// Set the default lookup scope.
    pub fn with_scope(mut self, scope: SearchScope) -> Self {
        self.scope = scope;
        self
    }

    /// Allow `find_and_bind` on this attribute.
    pub fn with_bind_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.bind_attribute = Some(attribute.into());
        self
    }

    /// Append an extra filter to every lookup.
    pub fn with_filter(mut self, filter: impl Into<FilterNode>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Enable entry creation.
    pub fn with_upsert(mut self, upsert: UpsertOptions) -> Self {
        self.upsert = Some(upsert);
        self
    }

    /// Always return these claims as arrays.
    pub fn with_force_array_claims<I, S>(mut self, claims: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.force_array_claims = claims.into_iter().map(Into::into).collect();
        self
    }

    /// Validate the options.
    pub fn validate(&self) -> ClaimsResult<()> {
        if self.base_dn.is_empty() {
            return Err(ClaimsError::MissingOption { option: "base_dn" });
        }
        if self.id_attribute.is_empty() {
            return Err(ClaimsError::MissingOption {
                option: "id_attribute",
            });
        }
        if self.object_class.is_empty() {
            return Err(ClaimsError::invalid_configuration(
                "object_class must not be empty",
            ));
        }
        if let Some(upsert) = &self.upsert {
            upsert.validate()?;
        }
        Ok(())
    }
}

/// How new entries are placed and typed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertOptions {
    /// Attribute forming the relative DN; it is set to the entry id.
    pub rdn_attribute: String,

    /// Container between the RDN and the base DN, e.g. `ou=people`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,

    /// Object classes of created entries.
    pub object_classes: Vec<String>,
}

impl UpsertOptions {
    /// Create upsert options.
    pub fn new<I, S>(rdn_attribute: impl Into<String>, object_classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            rdn_attribute: rdn_attribute.into(),
            container: None,
            object_classes: object_classes.into_iter().map(Into::into).collect(),
        }
    }

    /// Place new entries in a container below the base DN.
    pub fn with_container(mut self, container: impl Into<String>) -> Self {
        self.container = Some(container.into());
        self
    }

    /// The DN a new entry with `id` receives below `base_dn`.
    pub fn entry_dn(&self, id: &str, base_dn: &str) -> String {
        let rdn = format!("{}={}", self.rdn_attribute, escape_dn_value(id));
        match self.container.as_deref().filter(|c| !c.is_empty()) {
            Some(container) => format!("{rdn},{container},{base_dn}"),
            None => format!("{rdn},{base_dn}"),
        }
    }

    fn validate(&self) -> ClaimsResult<()> {
        if self.rdn_attribute.is_empty() {
            return Err(ClaimsError::MissingOption {
                option: "upsert.rdn_attribute",
            });
        }
        if self.object_classes.is_empty() {
            return Err(ClaimsError::MissingOption {
                option: "upsert.object_classes",
            });
        }
        Ok(())
    }
}

/// Connection credentials; any field may be supplied later as an override.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindCredentials {
    /// Directory server URL, e.g. `ldaps://ldap.example.com:636`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// DN to bind as.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind_dn: Option<String>,

    /// Bind password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl std::fmt::Debug for BindCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BindCredentials")
            .field("url", &self.url)
            .field("bind_dn", &self.bind_dn)
            .field("password", &self.password.as_ref().map(|_| "***REDACTED***"))
            .finish()
    }
}

impl BindCredentials {
    /// Create complete credentials.
    pub fn new(
        url: impl Into<String>,
        bind_dn: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            url: Some(url.into()),
            bind_dn: Some(bind_dn.into()),
            password: Some(password.into()),
        }
    }

    /// Set the server URL.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Set the bind DN.
    pub fn with_bind_dn(mut self, bind_dn: impl Into<String>) -> Self {
        self.bind_dn = Some(bind_dn.into());
        self
    }

    /// Set the password.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Overlay `overrides` onto these credentials; set fields win.
    pub fn merge(&self, overrides: &BindCredentials) -> BindCredentials {
        BindCredentials {
            url: overrides.url.clone().or_else(|| self.url.clone()),
            bind_dn: overrides.bind_dn.clone().or_else(|| self.bind_dn.clone()),
            password: overrides.password.clone().or_else(|| self.password.clone()),
        }
    }

    /// Check completeness and produce a bind request.
    ///
    /// Fields are checked in the order url, bind DN, password; the first
    /// missing or empty one is reported.
    pub fn to_request(&self) -> ClaimsResult<BindRequest> {
        fn require(value: &Option<String>, option: &'static str) -> ClaimsResult<String> {
            value
                .as_deref()
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .ok_or(ClaimsError::MissingOption { option })
        }

        Ok(BindRequest {
            url: require(&self.url, "url")?,
            bind_dn: require(&self.bind_dn, "bind")?,
            password: require(&self.password, "password")?,
        })
    }
}

/// Complete credentials handed to a [`DirectoryConnector`](crate::traits::DirectoryConnector).
#[derive(Clone, PartialEq, Eq)]
pub struct BindRequest {
    /// Directory server URL.
    pub url: String,
    /// DN to bind as.
    pub bind_dn: String,
    /// Bind password.
    pub password: String,
}

impl std::fmt::Debug for BindRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BindRequest")
            .field("url", &self.url)
            .field("bind_dn", &self.bind_dn)
            .field("password", &"***REDACTED***")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_directory_options_defaults() {
        let options: DirectoryOptions = serde_json::from_value(json!({
            "base_dn": "dc=example,dc=com",
            "id_attribute": "uid"
        }))
        .unwrap();

        assert_eq!(options.object_class, "*");
        assert_eq!(options.scope, SearchScope::Subtree);
        assert!(options.bind_attribute.is_none());
        assert!(options.filter.is_none());
        assert!(options.force_array_claims.is_empty());
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_directory_options_full() {
        let options: DirectoryOptions = serde_json::from_value(json!({
            "base_dn": "ou=people,dc=example,dc=com",
            "object_class": "inetOrgPerson",
            "scope": "one",
            "id_attribute": "uid",
            "bind_attribute": "mail",
            "filter": ["!", "employeeType=retired"],
            "upsert": {
                "rdn_attribute": "uid",
                "container": "ou=staff",
                "object_classes": ["top", "inetOrgPerson"]
            },
            "force_array_claims": ["groups"]
        }))
        .unwrap();

        assert_eq!(options.scope, SearchScope::OneLevel);
        assert_eq!(
            options.filter.as_ref().map(FilterNode::build),
            Some("(!(employeeType=retired))".to_string())
        );
        assert_eq!(options.force_array_claims, vec!["groups"]);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_directory_options_validation() {
        let err = DirectoryOptions::new("", "uid").validate().unwrap_err();
        assert!(matches!(err, ClaimsError::MissingOption { option: "base_dn" }));

        let err = DirectoryOptions::new("dc=example,dc=com", "")
            .validate()
            .unwrap_err();
        assert!(matches!(err, ClaimsError::MissingOption { option: "id_attribute" }));

        let err = DirectoryOptions::new("dc=example,dc=com", "uid")
            .with_upsert(UpsertOptions::new("uid", Vec::<String>::new()))
            .validate()
            .unwrap_err();
        assert_eq!(err.error_code(), "MISSING_OPTION");
    }

    #[test]
    fn test_entry_dn() {
        let upsert = UpsertOptions::new("uid", ["inetOrgPerson"]);
        assert_eq!(
            upsert.entry_dn("bob", "dc=example,dc=com"),
            "uid=bob,dc=example,dc=com"
        );

        let upsert = upsert.with_container("ou=people");
        assert_eq!(
            upsert.entry_dn("Doe, John", "dc=example,dc=com"),
            "uid=Doe\\, John,ou=people,dc=example,dc=com"
        );
    }

    #[test]
    fn test_credentials_merge() {
        let base = BindCredentials::new("ldap://localhost", "cn=admin", "secret");
        let merged = base.merge(
            &BindCredentials::default()
                .with_bind_dn("uid=bob,dc=example,dc=com")
                .with_password("bobpass"),
        );

        assert_eq!(merged.url.as_deref(), Some("ldap://localhost"));
        assert_eq!(merged.bind_dn.as_deref(), Some("uid=bob,dc=example,dc=com"));
        assert_eq!(merged.password.as_deref(), Some("bobpass"));
    }

    #[test]
    fn test_credentials_missing_fields() {
        let err = BindCredentials::default().to_request().unwrap_err();
        assert!(matches!(err, ClaimsError::MissingOption { option: "url" }));

        let err = BindCredentials::default()
            .with_url("ldap://localhost")
            .to_request()
            .unwrap_err();
        assert!(matches!(err, ClaimsError::MissingOption { option: "bind" }));

        let err = BindCredentials::default()
            .with_url("ldap://localhost")
            .with_bind_dn("cn=admin")
            .with_password("")
            .to_request()
            .unwrap_err();
        assert!(matches!(err, ClaimsError::MissingOption { option: "password" }));
    }

    #[test]
    fn test_credentials_debug_is_redacted() {
        let creds = BindCredentials::new("ldap://localhost", "cn=admin", "super-secret");
        let debug = format!("{creds:?}");
        assert!(debug.contains("***REDACTED***"));
        assert!(!debug.contains("super-secret"));

        let request = creds.to_request().unwrap();
        assert!(!format!("{request:?}").contains("super-secret"));
        assert_eq!(request.bind_dn, "cn=admin");
    }
}
