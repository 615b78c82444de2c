//! Value transformation engine.
//!
//! Each option of an [`AttributeMapping`] has a forward function (directory
//! value to claim value) and, where the option is invertible, a reverse
//! function. Values are JSON values: strings for single-valued attributes,
//! arrays for multi-valued ones, and whatever `json` parsing or `assign`
//! produces in between.
//!
//! Forward order: `replace`, then `separator` (+ `assign`) or `json`, then
//! `label`, `lowercase`, `suffix` and finally `array` coercion. The reverse
//! chain runs the invertible steps in the opposite order.

use indexmap::IndexMap;
use serde_json::{Map, Value};
use tracing::debug;

use crate::mapping::AttributeMapping;

/// Transformation engine for applying mapping options to claim values.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransformEngine;

impl TransformEngine {
    /// Create a new transformation engine.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Run the forward chain on a directory value.
    ///
    /// Returns `None` when the value is null or a step yields nothing (a
    /// malformed JSON payload, no entry carrying the requested label).
    pub fn forward(&self, mapping: &AttributeMapping, value: Value) -> Option<Value> {
        let mut value = present(value)?;

        if let Some(table) = &mapping.replace {
            value = replace_values(value, table);
        }

        if let Some(separator) = non_empty(&mapping.separator) {
            value = split_values(value, separator);
            if let Some(names) = &mapping.assign {
                value = assign_values(value, names);
            }
        } else if mapping.json {
            value = present(parse_json(value)?)?;
        }

        if let Some(label) = non_empty(&mapping.label) {
            value = select_label(value, label)?;
        }

        if mapping.lowercase {
            value = lowercase_values(value);
        }

        if let Some(suffix) = non_empty(&mapping.suffix) {
            value = append_suffix(value, suffix);
        }

        if mapping.array && !value.is_array() {
            value = Value::Array(vec![value]);
        }

        Some(value)
    }

    /// Run the reverse chain on a claim value.
    ///
    /// `lowercase` and `array` have no inverse and are skipped.
    pub fn reverse(&self, mapping: &AttributeMapping, value: Value) -> Option<Value> {
        let mut value = present(value)?;

        if let Some(suffix) = non_empty(&mapping.suffix) {
            value = strip_suffix(value, suffix);
        }

        if let Some(label) = non_empty(&mapping.label) {
            value = attach_label(value, label)?;
        }

        if let Some(separator) = non_empty(&mapping.separator) {
            if let Some(names) = &mapping.assign {
                value = unassign_values(value, names);
            }
            value = join_values(value, separator)?;
        } else if mapping.json {
            value = serialize_json(value)?;
        }

        if let Some(table) = &mapping.replace {
            value = reverse_replace_values(value, table);
        }

        Some(value)
    }
}

fn present(value: Value) -> Option<Value> {
    if value.is_null() {
        None
    } else {
        Some(value)
    }
}

fn non_empty(option: &Option<String>) -> Option<&str> {
    option.as_deref().filter(|s| !s.is_empty())
}

/// Apply `f` to a string, or to every string element of an array.
///
/// Other values pass through unchanged.
fn map_strings(value: Value, f: impl Fn(String) -> Value) -> Value {
    match value {
        Value::String(s) => f(s),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| match item {
                    Value::String(s) => f(s),
                    other => other,
                })
                .collect(),
        ),
        other => other,
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Swap values found in the table; unknown values pass through.
pub fn replace_values(value: Value, table: &IndexMap<String, String>) -> Value {
    map_strings(value, |s| match table.get(&s) {
        Some(swapped) => Value::String(swapped.clone()),
        None => Value::String(s),
    })
}

/// Undo [`replace_values`] through the inverted table.
///
/// When several keys map to the same value the first declared key wins.
pub fn reverse_replace_values(value: Value, table: &IndexMap<String, String>) -> Value {
    map_strings(value, |s| {
        match table.iter().find(|(_, swapped)| **swapped == s) {
            Some((original, _)) => Value::String(original.clone()),
            None => Value::String(s),
        }
    })
}

/// Split a string into an array on `separator`.
///
/// Array elements are split individually, producing nested arrays.
pub fn split_values(value: Value, separator: &str) -> Value {
    map_strings(value, |s| {
        Value::Array(
            s.split(separator)
                .map(|part| Value::String(part.to_string()))
                .collect(),
        )
    })
}

/// Join an array back into a string with `separator`.
///
/// Strings pass through. An array whose elements are all arrays is treated
/// as a multi-valued attribute and joins each element separately.
pub fn join_values(value: Value, separator: &str) -> Option<Value> {
    match value {
        Value::String(s) => Some(Value::String(s)),
        Value::Array(items) if !items.is_empty() && items.iter().all(Value::is_array) => {
            let joined = items
                .into_iter()
                .filter_map(|item| join_values(item, separator))
                .collect();
            Some(Value::Array(joined))
        }
        Value::Array(items) => {
            let parts: Vec<String> = items
                .iter()
                .filter(|item| !item.is_null())
                .map(|item| match item {
                    Value::Array(_) => join_values(item.clone(), separator)
                        .map(|joined| value_text(&joined))
                        .unwrap_or_default(),
                    other => value_text(other),
                })
                .collect();
            Some(Value::String(parts.join(separator)))
        }
        _ => None,
    }
}

/// Zip a split array onto sub-claim names, matching from the end.
///
/// The trailing values go to the trailing names; when there are more values
/// than names, the first name collects the leading surplus as an array.
/// With fewer values than names, the leading names stay unset.
pub fn assign_values(value: Value, names: &[String]) -> Value {
    let Value::Array(items) = value else {
        return value;
    };
    if names.is_empty() {
        return Value::Array(items);
    }

    let count = names.len();
    let len = items.len();
    let mut assigned = Map::new();

    for (position, name) in names.iter().enumerate() {
        let slot = if position == 0 && len > count {
            Some(Value::Array(items[..=len - count].to_vec()))
        } else {
            (len + position)
                .checked_sub(count)
                .and_then(|index| items.get(index).cloned())
        };

        if let Some(slot) = slot.filter(|v| !v.is_null()) {
            assigned.insert(name.clone(), slot);
        }
    }

    Value::Object(assigned)
}

/// Flatten assigned sub-claims back into a positional array.
///
/// An array of objects yields one positional array per object.
pub fn unassign_values(value: Value, names: &[String]) -> Value {
    fn flatten(object: &Map<String, Value>, names: &[String]) -> Value {
        let mut positional = Vec::new();
        for name in names {
            match object.get(name) {
                Some(Value::Array(values)) => positional.extend(values.iter().cloned()),
                Some(Value::Null) | None => {}
                Some(other) => positional.push(other.clone()),
            }
        }
        Value::Array(positional)
    }

    match value {
        Value::Object(object) => flatten(&object, names),
        Value::Array(items) if items.iter().any(Value::is_object) => Value::Array(
            items
                .into_iter()
                .map(|item| match item {
                    Value::Object(object) => flatten(&object, names),
                    other => other,
                })
                .collect(),
        ),
        other => other,
    }
}

/// Parse JSON text (or every element of an array of JSON text).
///
/// A malformed element makes the whole value unusable.
pub fn parse_json(value: Value) -> Option<Value> {
    fn parse(text: &str) -> Option<Value> {
        match serde_json::from_str(text) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                debug!(error = %e, "JSON parsing failed");
                None
            }
        }
    }

    match value {
        Value::String(s) => parse(&s),
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::String(s) => parse(&s),
                other => Some(other),
            })
            .collect::<Option<Vec<_>>>()
            .map(Value::Array),
        _ => None,
    }
}

/// Serialize a value (or every array element) back to JSON text.
pub fn serialize_json(value: Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::Array(items) => Some(Value::Array(
            items
                .iter()
                .map(|item| Value::String(item.to_string()))
                .collect(),
        )),
        other => Some(Value::String(other.to_string())),
    }
}

/// Keep only entries carrying `label`, unwrapped to their content.
///
/// Strings are read as `"<content> <label>"`, objects are looked up by the
/// label key. One match yields the content itself, several yield an array.
pub fn select_label(value: Value, label: &str) -> Option<Value> {
    fn pick(item: &Value, label: &str) -> Option<Value> {
        match item {
            Value::String(s) => match s.split_once(' ') {
                Some((content, tag)) if tag == label => Some(Value::String(content.to_string())),
                _ => None,
            },
            Value::Object(object) => object.get(label).filter(|v| !v.is_null()).cloned(),
            Value::Array(pair) => match (pair.first(), pair.get(1)) {
                (Some(content), Some(Value::String(tag))) if tag == label => Some(content.clone()),
                _ => None,
            },
            _ => None,
        }
    }

    match value {
        Value::Array(items) => {
            let mut matches: Vec<Value> =
                items.iter().filter_map(|item| pick(item, label)).collect();
            match matches.len() {
                0 => None,
                1 => matches.pop(),
                _ => Some(Value::Array(matches)),
            }
        }
        other => pick(&other, label),
    }
}

/// Re-append `" <label>"` to every value.
pub fn attach_label(value: Value, label: &str) -> Option<Value> {
    let labelled: Vec<Value> = match value {
        Value::Null => return None,
        Value::Array(items) => items
            .iter()
            .filter(|item| !item.is_null())
            .map(|item| Value::String(format!("{} {}", value_text(item), label)))
            .collect(),
        other => vec![Value::String(format!("{} {}", value_text(&other), label))],
    };

    match labelled.len() {
        0 => None,
        1 => labelled.into_iter().next(),
        _ => Some(Value::Array(labelled)),
    }
}

/// Lowercase a string or every string element.
pub fn lowercase_values(value: Value) -> Value {
    map_strings(value, |s| Value::String(s.to_lowercase()))
}

/// Append `suffix` to a string or every string element.
pub fn append_suffix(value: Value, suffix: &str) -> Value {
    map_strings(value, |s| Value::String(format!("{s}{suffix}")))
}

/// Remove `suffix` from a string or every string element.
///
/// Removal is not anchored: every occurrence of `suffix` is removed, not
/// just a trailing one, so `"a@x.b@x"` with suffix `"@x"` becomes `"a.b"`.
pub fn strip_suffix(value: Value, suffix: &str) -> Value {
    map_strings(value, |s| Value::String(s.replace(suffix, "")))
}
