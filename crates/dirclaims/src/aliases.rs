//! Attribute alias resolution.
//!
//! A mapping may declare several synonymous attribute names for one logical
//! value (`{"attribute": ["uid", "userid"]}`). Reverse mapping always writes
//! the root name, but an existing entry may store the value under any
//! synonym; the alias table lets reconciliation find it.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::mapping::{AttributeSelector, MappingSpec};
use crate::record::AttributeRecord;

/// Synonym families keyed by their root attribute name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AliasTable {
    families: IndexMap<String, Vec<String>>,
}

impl AliasTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a synonym family under its first name.
    ///
    /// Families with fewer than two names are ignored. A later family with
    /// the same root replaces the earlier one.
    pub fn register(&mut self, family: &[String]) {
        if let [root, _, ..] = family {
            self.families.insert(root.clone(), family.to_vec());
        }
    }

    /// The synonym family rooted at `root`, root first.
    pub fn family(&self, root: &str) -> Option<&[String]> {
        self.families.get(root).map(Vec::as_slice)
    }

    /// The name under which `entry` stores the value for `key`.
    ///
    /// For a registered root this is the first synonym present on the
    /// entry; otherwise, or when no synonym is present, `key` itself.
    pub fn resolve<'a>(&'a self, key: &'a str, entry: &AttributeRecord) -> &'a str {
        self.family(key)
            .and_then(|family| family.iter().find(|name| entry.has(name)))
            .map_or(key, String::as_str)
    }

    /// Iterate over roots and their families.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.families
            .iter()
            .map(|(root, family)| (root.as_str(), family.as_slice()))
    }

    /// Number of registered families.
    pub fn len(&self) -> usize {
        self.families.len()
    }

    /// Check if no family is registered.
    pub fn is_empty(&self) -> bool {
        self.families.is_empty()
    }
}

/// Collect every synonym family declared anywhere in `spec`.
pub fn find_aliases(spec: &MappingSpec) -> AliasTable {
    let mut table = AliasTable::new();

    for (_, candidates) in spec.claims() {
        for mapping in candidates {
            if let AttributeSelector::Synonyms(names) = &mapping.attribute {
                table.register(names);
            }
        }
    }

    table
}
