//! In-memory evaluation of the query AST against a document. Used by the
//! memory storage adapter and shared by tests asserting query equivalence
//! against the relational adapter's SQL translation.

use std::cmp::Ordering;

use serde_json::Value;

use crate::ast::{Comparison, Filter};

pub fn matches(filter: &Filter, doc: &serde_json::Map<String, Value>) -> bool {
    match filter {
        Filter::MatchAll => true,
        Filter::And(clauses) => clauses.iter().all(|c| matches(c, doc)),
        Filter::Or(clauses) => clauses.iter().any(|c| matches(c, doc)),
        Filter::Nor(clauses) => !clauses.iter().any(|c| matches(c, doc)),
        Filter::Field { field, comparison } => {
            let value = doc.get(field).cloned().unwrap_or(Value::Null);
            matches_comparison(comparison, &value)
        }
    }
}

fn matches_comparison(comparison: &Comparison, value: &Value) -> bool {
    match comparison {
        Comparison::Eq(target) => value == target,
        Comparison::Ne(target) => value != target,
        Comparison::Gt(target) => compare(value, target) == Some(Ordering::Greater),
        Comparison::Gte(target) => matches!(compare(value, target), Some(Ordering::Greater | Ordering::Equal)),
        Comparison::Lt(target) => compare(value, target) == Some(Ordering::Less),
        Comparison::Lte(target) => matches!(compare(value, target), Some(Ordering::Less | Ordering::Equal)),
        Comparison::In(options) => options.contains(value),
        Comparison::Nin(options) => !options.contains(value),
        Comparison::Regex { pattern, options } => value
            .as_str()
            .map(|s| regex_match(pattern, options.as_deref(), s))
            .unwrap_or(false),
    }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Matches the relational adapter's `~`/`~*` semantics: `options == "i"`
/// means case-insensitive, anything else is a case-sensitive POSIX-style
/// regex search (matches anywhere in the string, not a full-string
/// anchor). An invalid pattern never matches rather than panicking.
fn regex_match(pattern: &str, options: Option<&str>, text: &str) -> bool {
    let pattern = if options == Some("i") { format!("(?i){pattern}") } else { pattern.to_string() };
    regex::Regex::new(&pattern).map(|re| re.is_match(text)).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> serde_json::Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn equality_and_logical_and_combine() {
        let filter = Filter::And(vec![
            Filter::Field { field: "a".into(), comparison: Comparison::Eq(json!(1)) },
            Filter::Field { field: "b".into(), comparison: Comparison::Eq(json!("x")) },
        ]);
        assert!(matches(&filter, &doc(json!({"a": 1, "b": "x"}))));
        assert!(!matches(&filter, &doc(json!({"a": 1, "b": "y"}))));
    }

    #[test]
    fn bare_field_and_and_wrapped_field_are_equivalent() {
        let bare = Filter::Field { field: "a".into(), comparison: Comparison::Eq(json!(1)) };
        let wrapped = Filter::And(vec![bare.clone()]);
        let document = doc(json!({"a": 1}));
        assert_eq!(matches(&bare, &document), matches(&wrapped, &document));
    }

    #[test]
    fn nor_negates_membership() {
        let filter = Filter::Nor(vec![Filter::Field {
            field: "status".into(),
            comparison: Comparison::Eq(json!("archived")),
        }]);
        assert!(matches(&filter, &doc(json!({"status": "active"}))));
        assert!(!matches(&filter, &doc(json!({"status": "archived"}))));
    }
}
