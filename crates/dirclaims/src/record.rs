//! Attribute records and claim documents
//!
//! The two shapes the mapping engine translates between: flat directory
//! attribute records and nested claim documents.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Key holding the distinguished name on records returned by a search.
pub const DN_ATTRIBUTE: &str = "dn";

/// A directory attribute value, either single or multi-valued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// A single string value.
    Single(String),
    /// Multiple values, in directory order.
    Multi(Vec<String>),
}

impl AttributeValue {
    /// Whether the value carries any data.
    ///
    /// Empty strings and empty sequences count as absent.
    pub fn has_data(&self) -> bool {
        match self {
            AttributeValue::Single(s) => !s.is_empty(),
            AttributeValue::Multi(values) => !values.is_empty(),
        }
    }

    /// Get as a string if this is a single value.
    pub fn as_single(&self) -> Option<&str> {
        match self {
            AttributeValue::Single(s) => Some(s),
            AttributeValue::Multi(_) => None,
        }
    }

    /// Check if this is multi-valued.
    pub fn is_multi_valued(&self) -> bool {
        matches!(self, AttributeValue::Multi(_))
    }

    /// Get all values as string slices (works for both shapes).
    pub fn values(&self) -> Vec<&str> {
        match self {
            AttributeValue::Single(s) => vec![s.as_str()],
            AttributeValue::Multi(values) => values.iter().map(String::as_str).collect(),
        }
    }

    /// Consume into a sequence, wrapping single values.
    pub fn into_values(self) -> Vec<String> {
        match self {
            AttributeValue::Single(s) => vec![s],
            AttributeValue::Multi(values) => values,
        }
    }

    /// Convert to the JSON value the transform chain operates on.
    pub fn to_claim_value(&self) -> Value {
        match self {
            AttributeValue::Single(s) => Value::String(s.clone()),
            AttributeValue::Multi(values) => {
                Value::Array(values.iter().cloned().map(Value::String).collect())
            }
        }
    }

    /// Convert a claim value back into directory form.
    ///
    /// Numbers and booleans are rendered as text, nested sequences are
    /// flattened and objects are stored as JSON text. Returns `None` for
    /// null and for sequences without any usable element.
    pub fn from_claim_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Array(items) => {
                let mut values = Vec::with_capacity(items.len());
                flatten_into(items, &mut values);
                if values.is_empty() {
                    None
                } else {
                    Some(AttributeValue::Multi(values))
                }
            }
            other => scalar_text(other).map(AttributeValue::Single),
        }
    }
}

fn flatten_into(items: &[Value], out: &mut Vec<String>) {
    for item in items {
        match item {
            Value::Array(nested) => flatten_into(nested, out),
            other => out.extend(scalar_text(other)),
        }
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        AttributeValue::Single(s)
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::Single(s.to_string())
    }
}

impl<T: Into<String>> From<Vec<T>> for AttributeValue {
    fn from(values: Vec<T>) -> Self {
        AttributeValue::Multi(values.into_iter().map(Into::into).collect())
    }
}

/// A flat set of directory attributes, in insertion order.
///
/// Records returned by a search carry their distinguished name under
/// [`DN_ATTRIBUTE`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributeRecord {
    attributes: IndexMap<String, AttributeValue>,
}

impl AttributeRecord {
    /// Create a new empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an attribute value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<AttributeValue>) {
        self.attributes.insert(name.into(), value.into());
    }

    /// Set an attribute using builder pattern.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.set(name, value);
        self
    }

    /// Get an attribute value.
    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }

    /// Get a single-valued attribute.
    pub fn get_single(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(AttributeValue::as_single)
    }

    /// Check if an attribute key exists, regardless of its value.
    pub fn has(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    /// Check if an attribute exists and carries data.
    pub fn has_data(&self, name: &str) -> bool {
        self.get(name).is_some_and(AttributeValue::has_data)
    }

    /// The distinguished name, when the record came from a search.
    pub fn dn(&self) -> Option<&str> {
        self.get_single(DN_ATTRIBUTE)
    }

    /// Remove an attribute.
    pub fn remove(&mut self, name: &str) -> Option<AttributeValue> {
        self.attributes.shift_remove(name)
    }

    /// Get all attribute names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.attributes.keys().map(String::as_str)
    }

    /// Get the number of attributes.
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// Check if the record is empty.
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Iterate over all attributes.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &AttributeValue)> {
        self.attributes.iter()
    }

    /// Convert into the underlying map.
    pub fn into_map(self) -> IndexMap<String, AttributeValue> {
        self.attributes
    }
}

impl FromIterator<(String, AttributeValue)> for AttributeRecord {
    fn from_iter<T: IntoIterator<Item = (String, AttributeValue)>>(iter: T) -> Self {
        Self {
            attributes: iter.into_iter().collect(),
        }
    }
}

/// A claim document: nested JSON objects addressed by dot-separated paths.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClaimDocument {
    claims: Map<String, Value>,
}

impl ClaimDocument {
    /// Create a new empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a document from a JSON value; `None` unless it is an object.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(claims) => Some(Self { claims }),
            _ => None,
        }
    }

    /// Expose raw directory attributes as top-level claims.
    pub fn from_record(record: &AttributeRecord) -> Self {
        record
            .iter()
            .map(|(name, value)| (name.clone(), value.to_claim_value()))
            .collect()
    }

    /// Store top-level claims directly as directory attributes.
    ///
    /// Claims without a usable value are dropped.
    pub fn to_record(&self) -> AttributeRecord {
        self.claims
            .iter()
            .filter_map(|(name, value)| {
                AttributeValue::from_claim_value(value).map(|v| (name.clone(), v))
            })
            .collect()
    }

    /// Get a top-level claim.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.claims.get(key)
    }

    /// Check whether a top-level claim exists.
    pub fn contains_key(&self, key: &str) -> bool {
        self.claims.contains_key(key)
    }

    /// Resolve a dot-separated path such as `address.locality`.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        segments.try_fold(self.claims.get(first)?, |node, segment| {
            node.as_object()?.get(segment)
        })
    }

    /// Assign a value at a dot-separated path, creating intermediate objects.
    ///
    /// Returns `false` when an intermediate segment already holds a
    /// non-object value; the document is left unchanged in that case.
    pub fn set_path(&mut self, path: &str, value: Value) -> bool {
        let (parents, leaf) = match path.rsplit_once('.') {
            Some((parents, leaf)) => (Some(parents), leaf),
            None => (None, path),
        };

        let mut target = &mut self.claims;
        for segment in parents.into_iter().flat_map(|p| p.split('.')) {
            let slot = target
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if slot.is_null() {
                *slot = Value::Object(Map::new());
            }
            match slot {
                Value::Object(next) => target = next,
                _ => return false,
            }
        }

        target.insert(leaf.to_string(), value);
        true
    }

    /// Top-level claim names.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.claims.keys().map(String::as_str)
    }

    /// Get the number of top-level claims.
    pub fn len(&self) -> usize {
        self.claims.len()
    }

    /// Check if the document is empty.
    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }

    /// Convert into a JSON object value.
    pub fn into_value(self) -> Value {
        Value::Object(self.claims)
    }
}

impl FromIterator<(String, Value)> for ClaimDocument {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self {
            claims: iter.into_iter().collect(),
        }
    }
}

impl From<Map<String, Value>> for ClaimDocument {
    fn from(claims: Map<String, Value>) -> Self {
        Self { claims }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_attribute_record() {
        let record = AttributeRecord::new()
            .with("dn", "uid=bob,ou=people,dc=example,dc=com")
            .with("mail", "bob@example.com")
            .with("objectClass", vec!["top", "person"]);

        assert_eq!(record.dn(), Some("uid=bob,ou=people,dc=example,dc=com"));
        assert_eq!(record.get_single("mail"), Some("bob@example.com"));
        assert_eq!(
            record.get("objectClass").map(AttributeValue::values),
            Some(vec!["top", "person"])
        );
        assert!(!record.has("sn"));
    }

    #[test]
    fn test_record_preserves_insertion_order() {
        let record = AttributeRecord::new()
            .with("sn", "Doe")
            .with("cn", "John Doe")
            .with("mail", "john@example.com");

        let names: Vec<&str> = record.names().collect();
        assert_eq!(names, vec!["sn", "cn", "mail"]);
    }

    #[test]
    fn test_empty_values_have_no_data() {
        let record = AttributeRecord::new()
            .with("mail", "")
            .with("memberOf", Vec::<String>::new())
            .with("cn", "x");

        assert!(!record.has_data("mail"));
        assert!(!record.has_data("memberOf"));
        assert!(record.has_data("cn"));
        assert!(record.has("mail"));
    }

    #[test]
    fn test_record_deserializes_from_json() {
        let record: AttributeRecord = serde_json::from_value(json!({
            "cn": "John",
            "mail": ["a@example.com", "b@example.com"]
        }))
        .unwrap();

        assert_eq!(record.get_single("cn"), Some("John"));
        assert!(record.get("mail").unwrap().is_multi_valued());
    }

    #[test]
    fn test_value_from_claim() {
        assert_eq!(
            AttributeValue::from_claim_value(&json!("x")),
            Some(AttributeValue::Single("x".into()))
        );
        assert_eq!(
            AttributeValue::from_claim_value(&json!(true)),
            Some(AttributeValue::Single("true".into()))
        );
        assert_eq!(
            AttributeValue::from_claim_value(&json!(["a", ["b", "c"]])),
            Some(AttributeValue::from(vec!["a", "b", "c"]))
        );
        assert_eq!(AttributeValue::from_claim_value(&json!(null)), None);
        assert_eq!(AttributeValue::from_claim_value(&json!([])), None);
    }

    #[test]
    fn test_claim_paths() {
        let mut doc = ClaimDocument::new();
        assert!(doc.set_path("email", json!("a@b.com")));
        assert!(doc.set_path("address.locality", json!("Zurich")));
        assert!(doc.set_path("address.country", json!("CH")));

        assert_eq!(doc.get_path("address.locality"), Some(&json!("Zurich")));
        assert_eq!(doc.get_path("address.region"), None);
        assert_eq!(doc.get_path("email.domain"), None);
        assert_eq!(
            doc.into_value(),
            json!({
                "email": "a@b.com",
                "address": {"locality": "Zurich", "country": "CH"}
            })
        );
    }

    #[test]
    fn test_set_path_refuses_scalar_parent() {
        let mut doc = ClaimDocument::new();
        doc.set_path("address", json!("Main Street 1"));

        assert!(!doc.set_path("address.locality", json!("Zurich")));
        assert_eq!(doc.get("address"), Some(&json!("Main Street 1")));
    }

    #[test]
    fn test_document_from_record() {
        let record = AttributeRecord::new()
            .with("uid", "bob")
            .with("mail", vec!["a@x", "b@x"]);

        let doc = ClaimDocument::from_record(&record);
        assert_eq!(doc.to_record(), record);
        assert_eq!(doc.into_value(), json!({"uid": "bob", "mail": ["a@x", "b@x"]}));
    }

    #[test]
    fn test_document_to_record_drops_null() {
        let doc = ClaimDocument::from_value(json!({"uid": "bob", "mail": null, "age": 42}))
            .unwrap();

        let record = doc.to_record();
        assert_eq!(record.get_single("uid"), Some("bob"));
        assert_eq!(record.get_single("age"), Some("42"));
        assert!(!record.has("mail"));
    }
}
