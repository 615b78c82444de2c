//! Claim mapping between directory attributes and claim documents.
//!
//! A [`MappingSpec`] lists, for every claim path, the attribute mappings it
//! may be sourced from. Candidates are tried in order and the first one
//! whose attribute carries data wins. In JSON form a claim maps to a bare
//! attribute name, a single mapping object, or a list of either:
//!
//! ```json
//! {
//!   "email": "mail",
//!   "sub": [{"attribute": ["uid", "userid"], "lowercase": true}],
//!   "address.locality": ["l", "localityName"],
//!   "picture": {"attribute": "labeledURI", "label": "photo"},
//!   "birthdate": []
//! }
//! ```
//!
//! A list of names declares *candidates*; a list inside `attribute`
//! declares *synonyms* of one logical attribute. A claim with an empty
//! candidate list is never mapped.

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::sync::OnceLock;
use tracing::debug;

use crate::aliases::{find_aliases, AliasTable};
use crate::error::{ClaimsError, ClaimsResult};
use crate::record::{AttributeRecord, AttributeValue, ClaimDocument};
use crate::transform::TransformEngine;

/// The attribute (or synonym family) a mapping reads from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeSelector {
    /// A single attribute name.
    Name(String),
    /// Synonyms of one logical attribute; the first is the root.
    Synonyms(Vec<String>),
}

impl AttributeSelector {
    /// All declared names, root first.
    pub fn names(&self) -> &[String] {
        match self {
            AttributeSelector::Name(name) => std::slice::from_ref(name),
            AttributeSelector::Synonyms(names) => names,
        }
    }

    /// The canonical name reverse mapping writes to.
    pub fn root(&self) -> Option<&str> {
        self.names().first().map(String::as_str)
    }

    /// The first declared name that carries data in `record`.
    pub fn first_present(&self, record: &AttributeRecord) -> Option<&str> {
        self.names()
            .iter()
            .map(String::as_str)
            .find(|name| record.has_data(name))
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// How one claim is derived from a directory attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeMapping {
    /// Source attribute or synonym family.
    pub attribute: AttributeSelector,

    /// Literal appended to the value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,

    /// Lowercase the value.
    #[serde(default, skip_serializing_if = "is_false")]
    pub lowercase: bool,

    /// Value substitution table.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replace: Option<IndexMap<String, String>>,

    /// Split the value into an array on this delimiter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub separator: Option<String>,

    /// Sub-claim names the split parts are assigned to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assign: Option<Vec<String>>,

    /// Keep only `"<content> <label>"` entries with this label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    /// Parse the value as JSON text.
    #[serde(default, skip_serializing_if = "is_false")]
    pub json: bool,

    /// Always produce an array.
    #[serde(default, skip_serializing_if = "is_false")]
    pub array: bool,
}

impl AttributeMapping {
    /// Map from a single attribute.
    pub fn new(attribute: impl Into<String>) -> Self {
        Self::from_selector(AttributeSelector::Name(attribute.into()))
    }

    /// Map from a synonym family; the first name is the root.
    pub fn synonyms<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_selector(AttributeSelector::Synonyms(
            names.into_iter().map(Into::into).collect(),
        ))
    }

    fn from_selector(attribute: AttributeSelector) -> Self {
        Self {
            attribute,
            suffix: None,
            lowercase: false,
            replace: None,
            separator: None,
            assign: None,
            label: None,
            json: false,
            array: false,
        }
    }

    /// Append a suffix.
    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = Some(suffix.into());
        self
    }

    /// Lowercase values.
    pub fn with_lowercase(mut self) -> Self {
        self.lowercase = true;
        self
    }

    /// Substitute values through a table.
    pub fn with_replace<I, K, V>(mut self, table: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.replace = Some(
            table
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }

    /// Split values on a delimiter.
    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = Some(separator.into());
        self
    }

    /// Assign split parts to sub-claims.
    pub fn with_assign<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.assign = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Select labelled entries.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Parse values as JSON.
    pub fn with_json(mut self) -> Self {
        self.json = true;
        self
    }

    /// Force array results.
    pub fn with_array(mut self) -> Self {
        self.array = true;
        self
    }
}

impl From<&str> for AttributeMapping {
    fn from(attribute: &str) -> Self {
        AttributeMapping::new(attribute)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDefinition {
    Name(String),
    Mapping(AttributeMapping),
}

impl RawDefinition {
    fn into_mapping(self) -> AttributeMapping {
        match self {
            RawDefinition::Name(name) => AttributeMapping::new(name),
            RawDefinition::Mapping(mapping) => mapping,
        }
    }
}

// Candidates must be tried first: a derived struct also accepts a sequence,
// so `["street", "streetAddress"]` would otherwise parse as one mapping.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawClaimRule {
    Candidates(Vec<RawDefinition>),
    One(RawDefinition),
}

/// Declarative table from claim path to candidate attribute mappings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingSpec {
    claims: IndexMap<String, Vec<AttributeMapping>>,
}

impl<'de> Deserialize<'de> for MappingSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = IndexMap::<String, RawClaimRule>::deserialize(deserializer)?;
        let claims = raw
            .into_iter()
            .map(|(claim, rule)| {
                let candidates = match rule {
                    RawClaimRule::Candidates(list) => {
                        list.into_iter().map(RawDefinition::into_mapping).collect()
                    }
                    RawClaimRule::One(definition) => vec![definition.into_mapping()],
                };
                (claim, candidates)
            })
            .collect();
        Ok(Self { claims })
    }
}

impl Serialize for MappingSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.claims.serialize(serializer)
    }
}

impl MappingSpec {
    /// Create an empty mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the JSON form.
    pub fn from_json(text: &str) -> ClaimsResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Set the candidates for a claim path.
    pub fn insert(&mut self, claim: impl Into<String>, candidates: Vec<AttributeMapping>) {
        self.claims.insert(claim.into(), candidates);
    }

    /// Add a claim using builder pattern.
    pub fn with(
        mut self,
        claim: impl Into<String>,
        candidates: impl IntoIterator<Item = AttributeMapping>,
    ) -> Self {
        self.insert(claim, candidates.into_iter().collect());
        self
    }

    /// Candidates for a claim path; empty when the claim is not mapped.
    pub fn candidates(&self, claim: &str) -> &[AttributeMapping] {
        self.claims.get(claim).map(Vec::as_slice).unwrap_or_default()
    }

    /// Iterate over claim paths and their candidates.
    pub fn claims(&self) -> impl Iterator<Item = (&str, &[AttributeMapping])> {
        self.claims
            .iter()
            .map(|(claim, candidates)| (claim.as_str(), candidates.as_slice()))
    }

    /// Check that every mapping can be resolved.
    ///
    /// An empty candidate list is allowed (the claim is simply never
    /// mapped), but each candidate must name at least one attribute and
    /// `assign` needs a `separator` to split on.
    pub fn validate(&self) -> ClaimsResult<()> {
        for (claim, candidates) in self.claims() {
            if claim.is_empty() || claim.split('.').any(str::is_empty) {
                return Err(ClaimsError::InvalidMapping {
                    message: format!("malformed claim path '{claim}'"),
                });
            }
            for mapping in candidates {
                let names = mapping.attribute.names();
                if names.is_empty() || names.iter().any(String::is_empty) {
                    return Err(ClaimsError::InvalidMapping {
                        message: format!("claim '{claim}' has an empty attribute name"),
                    });
                }
                if mapping.assign.is_some() && mapping.separator.is_none() {
                    return Err(ClaimsError::InvalidMapping {
                        message: format!("claim '{claim}' uses assign without separator"),
                    });
                }
            }
        }
        Ok(())
    }

    /// Number of claims.
    pub fn len(&self) -> usize {
        self.claims.len()
    }

    /// Check if the mapping has no claims.
    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }
}

/// Map a directory record to a claim document.
///
/// Claims whose candidates find no data, or whose transform chain yields
/// nothing, are left out. Claims listed in `force_array` are wrapped into
/// one-element arrays when they come out scalar.
pub fn map_claims(
    spec: &MappingSpec,
    record: &AttributeRecord,
    force_array: &[&str],
) -> ClaimDocument {
    let engine = TransformEngine::new();
    let mut document = ClaimDocument::new();

    for (claim, candidates) in spec.claims() {
        let Some((mapping, attribute)) = candidates
            .iter()
            .find_map(|m| m.attribute.first_present(record).map(|a| (m, a)))
        else {
            continue;
        };

        let Some(source) = record.get(attribute) else {
            continue;
        };

        debug!(claim = %claim, attribute = %attribute, "Mapping claim");

        let Some(mut value) = engine.forward(mapping, source.to_claim_value()) else {
            debug!(claim = %claim, "Transform produced no value");
            continue;
        };

        if force_array.contains(&claim) && !value.is_array() {
            value = Value::Array(vec![value]);
        }

        if !document.set_path(claim, value) {
            debug!(claim = %claim, "Claim parent is not an object; skipped");
        }
    }

    document
}

/// Project a claim document back onto directory attributes.
///
/// Every mapped claim whose top-level segment is present in the document is
/// reversed through its first candidate and stored under the candidate's
/// root attribute name. Claims stored under the same attribute are merged
/// into one multi-valued attribute.
pub fn reverse_claims(spec: &MappingSpec, document: &ClaimDocument) -> AttributeRecord {
    let engine = TransformEngine::new();
    let mut record = AttributeRecord::new();

    for (claim, candidates) in spec.claims() {
        let top = claim.split('.').next().unwrap_or(claim);
        if !document.contains_key(top) {
            continue;
        }

        let Some(mapping) = candidates.first() else {
            debug!(claim = %claim, "No mapping definition");
            continue;
        };

        let Some(value) = document.get_path(claim).filter(|v| !is_blank(v)) else {
            debug!(claim = %claim, "Claim not found");
            continue;
        };

        let reversed = engine
            .reverse(mapping, value.clone())
            .and_then(|v| AttributeValue::from_claim_value(&v));
        let (Some(reversed), Some(target)) = (reversed, mapping.attribute.root()) else {
            debug!(claim = %claim, "Reverse mapping lost the value");
            continue;
        };

        debug!(claim = %claim, attribute = %target, "Reversed claim");
        match record.get(target).cloned() {
            // Claims sharing an attribute are collected into one value set
            Some(earlier) => {
                let mut values = earlier.into_values();
                for value in reversed.into_values() {
                    if !values.contains(&value) {
                        values.push(value);
                    }
                }
                record.set(target, AttributeValue::Multi(values));
            }
            None => record.set(target, reversed),
        }
    }

    record
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// A mapping together with its memoized alias table.
///
/// The alias table is derived on first use and never recomputed; a new
/// mapping means a new `ClaimMapper`.
#[derive(Debug, Default)]
pub struct ClaimMapper {
    spec: MappingSpec,
    aliases: OnceLock<AliasTable>,
}

impl ClaimMapper {
    /// Create a mapper for the given mapping.
    pub fn new(spec: MappingSpec) -> Self {
        Self {
            spec,
            aliases: OnceLock::new(),
        }
    }

    /// The underlying mapping.
    pub fn spec(&self) -> &MappingSpec {
        &self.spec
    }

    /// Whether the mapping has no claims.
    pub fn is_empty(&self) -> bool {
        self.spec.is_empty()
    }

    /// The alias table, computed once.
    pub fn aliases(&self) -> &AliasTable {
        self.aliases.get_or_init(|| find_aliases(&self.spec))
    }

    /// See [`map_claims`].
    pub fn map_claims(&self, record: &AttributeRecord, force_array: &[&str]) -> ClaimDocument {
        map_claims(&self.spec, record, force_array)
    }

    /// See [`reverse_claims`].
    pub fn reverse_claims(&self, document: &ClaimDocument) -> AttributeRecord {
        reverse_claims(&self.spec, document)
    }
}

impl From<MappingSpec> for ClaimMapper {
    fn from(spec: MappingSpec) -> Self {
        ClaimMapper::new(spec)
    }
}
