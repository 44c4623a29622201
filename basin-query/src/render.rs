//! The inverse of `parse`: renders the AST back to the same wire-format
//! JSON object a client would have sent. Used by the handler bridge, which
//! hands a query to a handler as a plain table and must turn whatever the
//! handler left behind back into an AST (spec §4.3's ownership-filter
//! injection pattern: a handler reads `query`, adds an owner clause, and
//! the augmented query drives the storage call).

use serde_json::{Map, Value};

use crate::ast::{Comparison, Filter, Projection, Query, SortDirection};

pub fn query_to_json(query: &Query) -> Value {
    let mut object = match filter_to_json(&query.filter) {
        Value::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert("$and".to_string(), Value::Array(vec![other]));
            map
        }
    };

    if !query.sort.is_empty() {
        let mut sort = Map::new();
        for (field, direction) in &query.sort {
            let n = match direction {
                SortDirection::Ascending => 1,
                SortDirection::Descending => -1,
            };
            sort.insert(field.clone(), Value::from(n));
        }
        object.insert("$sort".to_string(), Value::Object(sort));
    }
    if let Some(limit) = query.limit {
        object.insert("$limit".to_string(), Value::from(limit));
    }
    if let Some(skip) = query.skip {
        object.insert("$skip".to_string(), Value::from(skip));
    }
    if query.skip_events {
        object.insert("$skipEvents".to_string(), Value::Bool(true));
    }
    if let Some(projection) = &query.fields {
        let mut fields = Map::new();
        match projection {
            Projection::Include(names) => {
                for name in names {
                    fields.insert(name.clone(), Value::from(1));
                }
            }
            Projection::Exclude(names) => {
                for name in names {
                    fields.insert(name.clone(), Value::from(0));
                }
            }
        }
        object.insert("$fields".to_string(), Value::Object(fields));
    }

    Value::Object(object)
}

fn filter_to_json(filter: &Filter) -> Value {
    match filter {
        Filter::MatchAll => Value::Object(Map::new()),
        Filter::Field { field, comparison } => {
            let mut map = Map::new();
            map.insert(field.clone(), comparison_to_json(comparison));
            Value::Object(map)
        }
        Filter::And(clauses) => wrap("$and", clauses),
        Filter::Or(clauses) => wrap("$or", clauses),
        Filter::Nor(clauses) => wrap("$nor", clauses),
    }
}

fn wrap(key: &str, clauses: &[Filter]) -> Value {
    let mut map = Map::new();
    map.insert(key.to_string(), Value::Array(clauses.iter().map(filter_to_json).collect()));
    Value::Object(map)
}

fn comparison_to_json(comparison: &Comparison) -> Value {
    match comparison {
        Comparison::Eq(v) => v.clone(),
        Comparison::Ne(v) => op("$ne", v.clone()),
        Comparison::Gt(v) => op("$gt", v.clone()),
        Comparison::Gte(v) => op("$gte", v.clone()),
        Comparison::Lt(v) => op("$lt", v.clone()),
        Comparison::Lte(v) => op("$lte", v.clone()),
        Comparison::In(values) => op("$in", Value::Array(values.clone())),
        Comparison::Nin(values) => op("$nin", Value::Array(values.clone())),
        Comparison::Regex { pattern, options } => {
            let mut map = Map::new();
            map.insert("$regex".to_string(), Value::String(pattern.clone()));
            if let Some(options) = options {
                map.insert("$options".to_string(), Value::String(options.clone()));
            }
            Value::Object(map)
        }
    }
}

fn op(key: &str, value: Value) -> Value {
    let mut map = Map::new();
    map.insert(key.to_string(), value);
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse_query;
    use serde_json::json;

    #[test]
    fn round_trips_a_simple_filter() {
        let query = parse_query(&json!({"status": "open", "$limit": 5})).unwrap();
        let rendered = query_to_json(&query);
        let reparsed = parse_query(&rendered).unwrap();
        assert_eq!(query, reparsed);
    }

    #[test]
    fn owner_clause_can_be_added_after_parsing() {
        let query = parse_query(&json!({"status": "open"})).unwrap();
        let mut object = query_to_json(&query).as_object().unwrap().clone();
        let existing = Value::Object(object.clone());
        object.clear();
        object.insert(
            "$and".to_string(),
            Value::Array(vec![existing, json!({"owner": "u1"})]),
        );
        let augmented = parse_query(&Value::Object(object)).unwrap();
        assert!(matches!(augmented.filter, Filter::And(clauses) if clauses.len() == 2));
    }
}
