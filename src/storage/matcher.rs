//! Matching helpers
//!
//! Value comparison, operator queries, literal/`$eq`/`$ne` queries and
//! case-insensitive name patterns.

use std::cmp::Ordering;

use regex::{Regex, RegexBuilder};
use serde_json::Value;

use crate::error::{MpdbError, Result};

use super::Document;

// =============================================================================
// Comparators
// =============================================================================

/// Comparison operator accepted in operator queries and name filters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
}

impl Comparator {
    pub const ALL: [Comparator; 6] = [
        Comparator::Eq,
        Comparator::Ne,
        Comparator::Gt,
        Comparator::Lt,
        Comparator::Ge,
        Comparator::Le,
    ];

    /// Parse a wire symbol (`==`, `!=`, `>`, `<`, `>=`, `<=`)
    pub fn parse(symbol: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.symbol() == symbol)
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Comparator::Eq => "==",
            Comparator::Ne => "!=",
            Comparator::Gt => ">",
            Comparator::Lt => "<",
            Comparator::Ge => ">=",
            Comparator::Le => "<=",
        }
    }

    pub fn is_equality(&self) -> bool {
        matches!(self, Comparator::Eq | Comparator::Ne)
    }

    /// Name filters only support `==` and `!=`
    pub fn require_equality(self) -> Result<Self> {
        if self.is_equality() {
            Ok(self)
        } else {
            Err(MpdbError::validation(format!(
                "Operator '{}' is not supported for name filters",
                self.symbol()
            )))
        }
    }

    /// Compare a (possibly missing) field value against `expected`
    pub fn apply(&self, actual: Option<&Value>, expected: &Value) -> bool {
        let Some(actual) = actual else {
            return matches!(self, Comparator::Ne);
        };
        match self {
            Comparator::Eq => values_equal(actual, expected),
            Comparator::Ne => !values_equal(actual, expected),
            Comparator::Gt => order(actual, expected) == Some(Ordering::Greater),
            Comparator::Lt => order(actual, expected) == Some(Ordering::Less),
            Comparator::Ge => matches!(order(actual, expected), Some(Ordering::Greater | Ordering::Equal)),
            Comparator::Le => matches!(order(actual, expected), Some(Ordering::Less | Ordering::Equal)),
        }
    }

    /// Apply the operator to a bare database/collection name
    pub fn matches_name(&self, name: &str, value: &str) -> bool {
        self.apply(Some(&Value::String(name.to_string())), &Value::String(value.to_string()))
    }
}

/// Equality with numbers compared by value (`25` equals `25.0`)
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        _ => a == b,
    }
}

/// Ordering is only defined number-to-number and string-to-string
fn order(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

// =============================================================================
// Queries
// =============================================================================

/// `{ "$field": field, <op>: value }`
#[derive(Debug, Clone, PartialEq)]
pub struct OperatorQuery {
    pub field: String,
    pub op: Comparator,
    pub value: Value,
}

impl OperatorQuery {
    pub fn matches(&self, doc: &Document) -> bool {
        self.op.apply(doc.get(&self.field), &self.value)
    }
}

/// `{ "$field": field, "<pattern>": {}, ... }`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegexQuery {
    pub field: String,
    pub patterns: Vec<String>,
}

/// True if `doc` satisfies every condition in `query`.
///
/// A condition is either a literal (equality) or an object of `$eq`/`$ne`
/// operators. Field names may use dot notation for nested objects.
pub fn matches_query(doc: &Document, query: &Document) -> bool {
    query.iter().all(|(field, condition)| {
        let actual = lookup(doc, field);
        match condition.as_object() {
            Some(ops) if is_operator_object(ops) => ops.iter().all(|(op, expected)| match op.as_str() {
                "$eq" => actual.map_or(false, |v| values_equal(v, expected)),
                "$ne" => actual.map_or(true, |v| !values_equal(v, expected)),
                _ => true,
            }),
            _ => actual.map_or(false, |v| values_equal(v, condition)),
        }
    })
}

fn is_operator_object(ops: &Document) -> bool {
    !ops.is_empty() && ops.keys().all(|k| k.starts_with('$'))
}

fn lookup<'a>(doc: &'a Document, field: &str) -> Option<&'a Value> {
    if let Some(value) = doc.get(field) {
        return Some(value);
    }
    let mut parts = field.split('.');
    let mut current = doc.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

// =============================================================================
// Name Patterns
// =============================================================================

/// Compile a case-insensitive pattern. `^` and `$` anchor as usual; a
/// leading `~` means "contains" and is stripped before compiling.
pub fn build_regex(pattern: &str) -> Option<Regex> {
    let effective = pattern.strip_prefix('~').unwrap_or(pattern);
    RegexBuilder::new(effective).case_insensitive(true).build().ok()
}

/// A compiled pattern, or the literal text when it does not compile
#[derive(Debug, Clone)]
pub enum NamePattern {
    Regex(Regex),
    Literal(String),
}

impl NamePattern {
    pub fn compile(pattern: &str) -> Self {
        match build_regex(pattern) {
            Some(regex) => NamePattern::Regex(regex),
            None => {
                tracing::warn!("Invalid pattern '{}', falling back to literal match", pattern);
                NamePattern::Literal(pattern.to_string())
            }
        }
    }

    pub fn is_match(&self, name: &str) -> bool {
        match self {
            NamePattern::Regex(regex) => regex.is_match(name),
            NamePattern::Literal(literal) => name == literal,
        }
    }
}
