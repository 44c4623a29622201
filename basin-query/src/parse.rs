//! Parses a JSON-shaped query object into the adapter-neutral AST.

use serde_json::Value;

use crate::ast::{Comparison, Filter, Projection, Query, SortDirection};

#[derive(Debug)]
pub enum QueryError {
    NotAnObject,
    InvalidOperator(String),
    InvalidOperand { field: String, message: String },
    MixedProjection,
}

impl std::fmt::Display for QueryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryError::NotAnObject => write!(f, "query must be a JSON object"),
            QueryError::InvalidOperator(op) => write!(f, "unknown operator `{op}`"),
            QueryError::InvalidOperand { field, message } => {
                write!(f, "invalid operand for `{field}`: {message}")
            }
            QueryError::MixedProjection => {
                write!(f, "$fields cannot mix inclusion (1) and exclusion (0)")
            }
        }
    }
}

impl std::error::Error for QueryError {}

const MODIFIER_KEYS: &[&str] = &["$sort", "$limit", "$skip", "$fields", "$skipEvents"];

/// Parse a full query object: reserved modifier keys are stripped before
/// filter interpretation (spec §4.4).
pub fn parse_query(value: &Value) -> Result<Query, QueryError> {
    let object = value.as_object().ok_or(QueryError::NotAnObject)?;

    let mut filter_fields = serde_json::Map::new();
    for (key, val) in object {
        if !MODIFIER_KEYS.contains(&key.as_str()) {
            filter_fields.insert(key.clone(), val.clone());
        }
    }
    let filter = parse_filter_object(&filter_fields)?;

    let sort = match object.get("$sort") {
        Some(Value::Object(map)) => map
            .iter()
            .map(|(field, dir)| {
                let direction = if dir.as_i64() == Some(-1) {
                    SortDirection::Descending
                } else {
                    SortDirection::Ascending
                };
                (field.clone(), direction)
            })
            .collect(),
        _ => Vec::new(),
    };

    let limit = object.get("$limit").and_then(Value::as_u64);
    let skip = object.get("$skip").and_then(Value::as_u64);
    let skip_events = object.get("$skipEvents").map(truthy).unwrap_or(false);

    let fields = match object.get("$fields") {
        Some(Value::Object(map)) => Some(parse_projection(map)?),
        _ => None,
    };

    Ok(Query { filter, sort, limit, skip, fields, skip_events })
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_i64() != Some(0),
        Value::String(s) => s == "true" || s == "1",
        _ => false,
    }
}

fn parse_projection(map: &serde_json::Map<String, Value>) -> Result<Projection, QueryError> {
    let mut include = Vec::new();
    let mut exclude = Vec::new();
    for (field, val) in map {
        if truthy(val) {
            include.push(field.clone());
        } else {
            exclude.push(field.clone());
        }
    }
    match (include.is_empty(), exclude.is_empty()) {
        (false, false) => Err(QueryError::MixedProjection),
        (false, true) => Ok(Projection::Include(include)),
        _ => Ok(Projection::Exclude(exclude)),
    }
}

/// Parse a filter object — either logical keys (`$and`/`$or`/`$nor`) or
/// field-keyed clauses, combined conjunctively.
fn parse_filter_object(object: &serde_json::Map<String, Value>) -> Result<Filter, QueryError> {
    if object.is_empty() {
        return Ok(Filter::MatchAll);
    }

    let mut clauses = Vec::new();
    for (key, value) in object {
        match key.as_str() {
            "$and" => clauses.push(Filter::And(parse_clause_list(value)?)),
            "$or" => clauses.push(Filter::Or(parse_clause_list(value)?)),
            "$nor" => clauses.push(Filter::Nor(parse_clause_list(value)?)),
            field if field.starts_with('$') => return Err(QueryError::InvalidOperator(field.to_string())),
            field => clauses.push(parse_field_clause(field, value)?),
        }
    }

    if clauses.len() == 1 {
        Ok(clauses.into_iter().next().unwrap())
    } else {
        Ok(Filter::And(clauses))
    }
}

fn parse_clause_list(value: &Value) -> Result<Vec<Filter>, QueryError> {
    let array = value.as_array().ok_or(QueryError::InvalidOperand {
        field: "$and/$or/$nor".to_string(),
        message: "expected an array of clauses".to_string(),
    })?;
    array
        .iter()
        .map(|clause| {
            let object = clause.as_object().ok_or(QueryError::NotAnObject)?;
            parse_filter_object(object)
        })
        .collect()
}

fn parse_field_clause(field: &str, value: &Value) -> Result<Filter, QueryError> {
    let comparison = match value {
        Value::Object(ops) if ops.keys().any(|k| k.starts_with('$')) => parse_operator_object(field, ops)?,
        scalar => Comparison::Eq(scalar.clone()),
    };
    Ok(Filter::Field { field: field.to_string(), comparison })
}

fn parse_operator_object(
    field: &str,
    ops: &serde_json::Map<String, Value>,
) -> Result<Comparison, QueryError> {
    // Only one operator key is expected per spec.md's grammar; if a caller
    // supplies more than one, the first in iteration order wins.
    for (op, operand) in ops {
        if op == "$options" {
            continue;
        }
        return match op.as_str() {
            "$gt" => Ok(Comparison::Gt(operand.clone())),
            "$gte" => Ok(Comparison::Gte(operand.clone())),
            "$lt" => Ok(Comparison::Lt(operand.clone())),
            "$lte" => Ok(Comparison::Lte(operand.clone())),
            "$ne" => Ok(Comparison::Ne(operand.clone())),
            "$in" => Ok(Comparison::In(as_array(field, operand)?)),
            "$nin" => Ok(Comparison::Nin(as_array(field, operand)?)),
            "$regex" => {
                let pattern = operand.as_str().ok_or_else(|| QueryError::InvalidOperand {
                    field: field.to_string(),
                    message: "$regex expects a string pattern".to_string(),
                })?;
                let options = ops.get("$options").and_then(Value::as_str).map(str::to_string);
                Ok(Comparison::Regex { pattern: pattern.to_string(), options })
            }
            other => Err(QueryError::InvalidOperator(other.to_string())),
        };
    }
    Err(QueryError::InvalidOperand {
        field: field.to_string(),
        message: "empty operator object".to_string(),
    })
}

fn as_array(field: &str, value: &Value) -> Result<Vec<Value>, QueryError> {
    value
        .as_array()
        .cloned()
        .ok_or_else(|| QueryError::InvalidOperand {
            field: field.to_string(),
            message: "expected an array of values".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalar_equality_parses_to_eq_comparison() {
        let query = parse_query(&json!({"a": 1})).unwrap();
        assert_eq!(
            query.filter,
            Filter::Field { field: "a".to_string(), comparison: Comparison::Eq(json!(1)) }
        );
    }

    #[test]
    fn comparison_operators_parse() {
        let query = parse_query(&json!({"age": {"$gte": 21}})).unwrap();
        assert_eq!(
            query.filter,
            Filter::Field { field: "age".to_string(), comparison: Comparison::Gte(json!(21)) }
        );
    }

    #[test]
    fn logical_and_wraps_single_clause_equivalently_to_bare_field() {
        let bare = parse_query(&json!({"a": 1})).unwrap();
        let wrapped = parse_query(&json!({"$and": [{"a": 1}]})).unwrap();
        match (&bare.filter, &wrapped.filter) {
            (Filter::Field { field: f1, comparison: c1 }, Filter::And(clauses)) => {
                assert_eq!(clauses.len(), 1);
                assert_eq!(clauses[0], Filter::Field { field: f1.clone(), comparison: c1.clone() });
            }
            other => panic!("unexpected shapes: {other:?}"),
        }
    }

    #[test]
    fn modifiers_are_stripped_from_the_filter() {
        let query = parse_query(&json!({"a": 1, "$limit": 10, "$skip": 5})).unwrap();
        assert_eq!(query.limit, Some(10));
        assert_eq!(query.skip, Some(5));
        assert_eq!(
            query.filter,
            Filter::Field { field: "a".to_string(), comparison: Comparison::Eq(json!(1)) }
        );
    }

    #[test]
    fn skip_events_requires_explicit_truthy_value() {
        let query = parse_query(&json!({"$skipEvents": true})).unwrap();
        assert!(query.skip_events);
        let query = parse_query(&json!({})).unwrap();
        assert!(!query.skip_events);
    }

    #[test]
    fn mixed_projection_is_rejected() {
        let err = parse_query(&json!({"$fields": {"a": 1, "b": 0}})).unwrap_err();
        assert!(matches!(err, QueryError::MixedProjection));
    }

    #[test]
    fn unknown_top_level_operator_is_rejected() {
        let err = parse_query(&json!({"$bogus": 1})).unwrap_err();
        assert!(matches!(err, QueryError::InvalidOperator(_)));
    }
}
