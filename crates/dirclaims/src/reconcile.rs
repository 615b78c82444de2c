//! Entry reconciliation.
//!
//! Computes the attribute changes that converge an existing directory entry
//! onto a desired attribute record. Only attributes present in the desired
//! record are managed; everything else on the entry is left alone.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::aliases::AliasTable;
use crate::record::{AttributeRecord, AttributeValue};

/// Kind of attribute change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModifyOperation {
    /// Add values to an attribute.
    Add,
    /// Replace all values of an attribute.
    Replace,
    /// Delete the listed values from an attribute.
    Delete,
}

impl fmt::Display for ModifyOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModifyOperation::Add => write!(f, "add"),
            ModifyOperation::Replace => write!(f, "replace"),
            ModifyOperation::Delete => write!(f, "delete"),
        }
    }
}

/// A single requested attribute change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationIntent {
    /// Attribute the change applies to.
    pub attribute: String,
    /// Change kind.
    pub operation: ModifyOperation,
    /// Values to add, replace with, or delete.
    pub values: Vec<String>,
}

impl MutationIntent {
    fn new(attribute: &str, operation: ModifyOperation, values: Vec<String>) -> Self {
        Self {
            attribute: attribute.to_string(),
            operation,
            values,
        }
    }

    /// Add `values` to `attribute`.
    pub fn add(attribute: &str, values: Vec<String>) -> Self {
        Self::new(attribute, ModifyOperation::Add, values)
    }

    /// Replace `attribute` with `values`.
    pub fn replace(attribute: &str, values: Vec<String>) -> Self {
        Self::new(attribute, ModifyOperation::Replace, values)
    }

    /// Delete `values` from `attribute`.
    pub fn delete(attribute: &str, values: Vec<String>) -> Self {
        Self::new(attribute, ModifyOperation::Delete, values)
    }
}

/// Compute the changes that turn `existing` into `desired`.
///
/// For every key of `desired` not listed in `protected_keys`:
///
/// - the existing value is looked up under the first synonym the entry
///   actually stores (see [`AliasTable::resolve`]);
/// - a missing or empty existing value yields an `add` under the key;
/// - two unequal single values yield a `replace` under the key;
/// - otherwise both sides are compared as sets, yielding at most one `add`
///   and one `delete`, both under the stored name.
///
/// Intents follow the key order of `desired`.
pub fn diff(
    existing: &AttributeRecord,
    desired: &AttributeRecord,
    aliases: &AliasTable,
    protected_keys: &[&str],
) -> Vec<MutationIntent> {
    let mut intents = Vec::new();

    for (key, wanted) in desired.iter() {
        let key = key.as_str();
        if protected_keys.contains(&key) {
            continue;
        }

        let stored_as = aliases.resolve(key, existing);

        let current = match existing.get(stored_as) {
            Some(value) if value.has_data() => value,
            _ => {
                let values = wanted.clone().into_values();
                if !values.is_empty() {
                    intents.push(MutationIntent::add(key, values));
                }
                continue;
            }
        };

        match (current, wanted) {
            (AttributeValue::Single(old), AttributeValue::Single(new)) => {
                if old != new {
                    intents.push(MutationIntent::replace(key, vec![new.clone()]));
                }
            }
            _ => {
                let old = current.values();
                let new = wanted.values();

                let to_add = difference(&new, &old);
                let to_delete = difference(&old, &new);

                if !to_add.is_empty() {
                    intents.push(MutationIntent::add(stored_as, to_add));
                }
                if !to_delete.is_empty() {
                    intents.push(MutationIntent::delete(stored_as, to_delete));
                }
            }
        }
    }

    intents
}

/// Values of `left` missing from `right`, first occurrence order, no duplicates.
fn difference(left: &[&str], right: &[&str]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for value in left {
        if !right.contains(value) && !out.iter().any(|seen| seen == value) {
            out.push((*value).to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{AttributeMapping, MappingSpec};
    use crate::aliases::find_aliases;

    fn uid_aliases() -> AliasTable {
        find_aliases(
            &MappingSpec::new().with("sub", [AttributeMapping::synonyms(["uid", "userid"])]),
        )
    }

    #[test]
    fn test_scalar_change_is_replace() {
        let existing = AttributeRecord::new().with("cn", "Old");
        let desired = AttributeRecord::new().with("cn", "New");

        let intents = diff(&existing, &desired, &AliasTable::new(), &[]);
        assert_eq!(intents, vec![MutationIntent::replace("cn", vec!["New".into()])]);
    }

    #[test]
    fn test_equal_records_are_noop() {
        let record = AttributeRecord::new()
            .with("cn", "Bob")
            .with("mail", vec!["a@x", "b@x"]);

        assert!(diff(&record, &record, &AliasTable::new(), &[]).is_empty());

        // Same set in a different order
        let reordered = AttributeRecord::new()
            .with("cn", "Bob")
            .with("mail", vec!["b@x", "a@x"]);
        assert!(diff(&record, &reordered, &AliasTable::new(), &[]).is_empty());
    }

    #[test]
    fn test_disjoint_sets_yield_one_add_and_one_delete() {
        let existing = AttributeRecord::new().with("mail", vec!["a@x", "b@x"]);
        let desired = AttributeRecord::new().with("mail", vec!["c@x", "d@x", "c@x"]);

        let intents = diff(&existing, &desired, &AliasTable::new(), &[]);
        assert_eq!(
            intents,
            vec![
                MutationIntent::add("mail", vec!["c@x".into(), "d@x".into()]),
                MutationIntent::delete("mail", vec!["a@x".into(), "b@x".into()]),
            ]
        );
    }

    #[test]
    fn test_scalar_against_multi_uses_sets() {
        let existing = AttributeRecord::new().with("mail", "a@x");
        let desired = AttributeRecord::new().with("mail", vec!["a@x", "b@x"]);

        let intents = diff(&existing, &desired, &AliasTable::new(), &[]);
        assert_eq!(intents, vec![MutationIntent::add("mail", vec!["b@x".into()])]);
    }

    #[test]
    fn test_absent_attribute_is_added() {
        let existing = AttributeRecord::new().with("cn", "Bob").with("sn", "");
        let desired = AttributeRecord::new()
            .with("sn", "Builder")
            .with("mail", vec!["a@x", "b@x"])
            .with("memberOf", Vec::<String>::new());

        let intents = diff(&existing, &desired, &AliasTable::new(), &[]);
        assert_eq!(
            intents,
            vec![
                MutationIntent::add("sn", vec!["Builder".into()]),
                MutationIntent::add("mail", vec!["a@x".into(), "b@x".into()]),
            ]
        );
    }

    #[test]
    fn test_alias_stored_value_is_reconciled_in_place() {
        let existing = AttributeRecord::new().with("userid", vec!["bob", "bobby"]);
        let desired = AttributeRecord::new().with("uid", "bob");

        let intents = diff(&existing, &desired, &uid_aliases(), &[]);
        assert_eq!(
            intents,
            vec![MutationIntent::delete("userid", vec!["bobby".into()])]
        );
    }

    #[test]
    fn test_alias_without_stored_synonym_adds_root() {
        let existing = AttributeRecord::new().with("cn", "Bob");
        let desired = AttributeRecord::new().with("uid", "bob");

        let intents = diff(&existing, &desired, &uid_aliases(), &[]);
        assert_eq!(intents, vec![MutationIntent::add("uid", vec!["bob".into()])]);
    }

    #[test]
    fn test_protected_and_unmanaged_keys_untouched() {
        let existing = AttributeRecord::new()
            .with("dn", "uid=bob,dc=example,dc=com")
            .with("objectClass", vec!["top", "person"])
            .with("description", "operator note")
            .with("cn", "Bob");
        let desired = AttributeRecord::new()
            .with("dn", "uid=other,dc=example,dc=com")
            .with("objectClass", vec!["top"])
            .with("cn", "Bob");

        let intents = diff(&existing, &desired, &AliasTable::new(), &["dn", "objectClass"]);
        assert!(intents.is_empty());
    }

    #[test]
    fn test_operation_wire_names() {
        assert_eq!(ModifyOperation::Replace.to_string(), "replace");
        let intent = MutationIntent::delete("mail", vec!["a@x".into()]);
        assert_eq!(
            serde_json::to_value(&intent).unwrap(),
            serde_json::json!({"attribute": "mail", "operation": "delete", "values": ["a@x"]})
        );
    }
}
