//! LDAP filter construction
//!
//! Compiles a nested operator tree into RFC 4515 filter text. The tree uses
//! the list form common in directory tooling: `["&", "uid=bob", ["|", ...]]`,
//! where the first slot holds `&`, `|` or `!` and the remaining slots are
//! operands. Anything that is not an operator is a literal predicate.
//!
//! Building is total: malformed or empty input degrades to an empty string
//! at the level where it occurs.

use serde::{Deserialize, Serialize};

/// Conjunction operator.
pub const AND: &str = "&";
/// Disjunction operator.
pub const OR: &str = "|";
/// Negation operator.
pub const NOT: &str = "!";

/// A node in a filter tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterNode {
    /// A literal predicate such as `uid=bob`, or an operator token.
    Predicate(String),
    /// An operator followed by its operands, or a nested tree.
    List(Vec<FilterNode>),
}

impl FilterNode {
    /// A literal predicate.
    pub fn predicate(predicate: impl Into<String>) -> Self {
        FilterNode::Predicate(predicate.into())
    }

    /// An equality predicate with the value escaped.
    pub fn eq(attribute: &str, value: &str) -> Self {
        FilterNode::Predicate(format!("{}={}", attribute, escape_filter_value(value)))
    }

    /// Conjunction of the given operands.
    pub fn and(operands: impl IntoIterator<Item = FilterNode>) -> Self {
        Self::operator(AND, operands)
    }

    /// Disjunction of the given operands.
    pub fn or(operands: impl IntoIterator<Item = FilterNode>) -> Self {
        Self::operator(OR, operands)
    }

    /// Negation of a single operand.
    pub fn negate(operand: FilterNode) -> Self {
        Self::operator(NOT, [operand])
    }

    fn operator(op: &str, operands: impl IntoIterator<Item = FilterNode>) -> Self {
        let mut list = vec![FilterNode::predicate(op)];
        list.extend(operands);
        FilterNode::List(list)
    }

    /// Append operands to this node.
    ///
    /// A list node is extended in place; a predicate becomes the operator
    /// slot of a new list, matching how the list form is read.
    pub fn extend(self, operands: impl IntoIterator<Item = FilterNode>) -> Self {
        let mut list = match self {
            FilterNode::List(list) => list,
            predicate => vec![predicate],
        };
        list.extend(operands);
        FilterNode::List(list)
    }

    /// Whether this node is empty (an empty predicate or an empty list).
    pub fn is_empty(&self) -> bool {
        match self {
            FilterNode::Predicate(p) => p.is_empty(),
            FilterNode::List(list) => list.is_empty(),
        }
    }

    /// Compile this node into filter text.
    pub fn build(&self) -> String {
        match self {
            FilterNode::List(list) => build_list(list),
            predicate => build_list(std::slice::from_ref(predicate)),
        }
    }
}

impl From<&str> for FilterNode {
    fn from(predicate: &str) -> Self {
        FilterNode::predicate(predicate)
    }
}

impl From<String> for FilterNode {
    fn from(predicate: String) -> Self {
        FilterNode::Predicate(predicate)
    }
}

impl From<Vec<FilterNode>> for FilterNode {
    fn from(list: Vec<FilterNode>) -> Self {
        FilterNode::List(list)
    }
}

/// Compile an optional filter tree; absent input is an empty conjunction.
pub fn build_filter(node: Option<&FilterNode>) -> String {
    node.map(FilterNode::build).unwrap_or_default()
}

fn build_list(list: &[FilterNode]) -> String {
    let Some((op, operands)) = list.split_first() else {
        return String::new();
    };

    match op {
        FilterNode::Predicate(op) if op == AND || op == OR => {
            let parts: Vec<String> = operands
                .iter()
                .filter(|node| !node.is_empty())
                .map(FilterNode::build)
                .filter(|part| !part.is_empty())
                .collect();

            match parts.len() {
                0 => String::new(),
                1 => parts.into_iter().next().unwrap_or_default(),
                _ => format!("({}{})", op, parts.concat()),
            }
        }
        FilterNode::Predicate(op) if op == NOT => match operands.first() {
            Some(operand) if !operand.is_empty() => {
                let inner = operand.build();
                if inner.is_empty() {
                    String::new()
                } else {
                    format!("(!{inner})")
                }
            }
            _ => String::new(),
        },
        FilterNode::List(nested) => build_list(nested),
        FilterNode::Predicate(literal) if literal.is_empty() => String::new(),
        FilterNode::Predicate(literal) => format!("({literal})"),
    }
}

/// Escape special characters in LDAP filter values (RFC 4515).
pub fn escape_filter_value(value: &str) -> String {
    value
        .replace('\\', "\\5c")
        .replace('*', "\\2a")
        .replace('(', "\\28")
        .replace(')', "\\29")
        .replace('\0', "\\00")
}

/// Escape special characters in DN attribute values per RFC 4514.
///
/// Characters that must be escaped:
/// - Leading or trailing SPACE (escaped as \20)
/// - Leading # (escaped as \23)
/// - Characters: , + " \ < > ; = (escaped with backslash prefix)
/// - NUL character (escaped as \00)
pub fn escape_dn_value(value: &str) -> String {
    let count = value.chars().count();
    let mut result = String::with_capacity(value.len() * 2);

    for (i, ch) in value.chars().enumerate() {
        let is_first = i == 0;
        let is_last = i + 1 == count;

        match ch {
            ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=' => {
                result.push('\\');
                result.push(ch);
            }
            '\0' => result.push_str("\\00"),
            ' ' if is_first || is_last => result.push_str("\\20"),
            '#' if is_first => result.push_str("\\23"),
            _ => result.push(ch),
        }
    }

    result
}
