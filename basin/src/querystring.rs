//! Translates an HTTP query string into the JSON-shaped object the Query
//! Model expects (spec §6: "query string is parsed as JSON-equivalent").
//! Bracket notation nests keys: `age[$gte]=21` becomes
//! `{"age": {"$gte": 21}}`, `$sort[createdAt]=-1` becomes
//! `{"$sort": {"createdAt": -1}}`.

use serde_json::Value;

pub fn parse_query_string(raw: &str) -> Value {
    let mut root = serde_json::Map::new();
    for (key, value) in form_urlencoded::parse(raw.as_bytes()) {
        let path = split_path(&key);
        let parsed = if is_list_operator(&path) { split_csv(&value) } else { coerce(&value) };
        insert_path(&mut root, &path, parsed);
    }
    Value::Object(root)
}

fn is_list_operator(path: &[String]) -> bool {
    matches!(path.last().map(String::as_str), Some("$in") | Some("$nin"))
}

fn split_csv(raw: &str) -> Value {
    Value::Array(raw.split(',').map(coerce).collect())
}

/// `a[b][c]` -> `["a", "b", "c"]`; a bare key is a single-element path.
fn split_path(key: &str) -> Vec<String> {
    let Some(bracket) = key.find('[') else {
        return vec![key.to_string()];
    };
    let mut parts = vec![key[..bracket].to_string()];
    let mut rest = &key[bracket..];
    while let Some(stripped) = rest.strip_prefix('[') {
        let Some(end) = stripped.find(']') else { break };
        parts.push(stripped[..end].to_string());
        rest = &stripped[end + 1..];
    }
    parts
}

fn insert_path(map: &mut serde_json::Map<String, Value>, path: &[String], value: Value) {
    match path {
        [] => {}
        [last] => {
            map.insert(last.clone(), value);
        }
        [first, rest @ ..] => {
            let entry = map
                .entry(first.clone())
                .or_insert_with(|| Value::Object(serde_json::Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(serde_json::Map::new());
            }
            insert_path(entry.as_object_mut().unwrap(), rest, value);
        }
    }
}

fn coerce(raw: &str) -> Value {
    match raw {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }
    if let Ok(i) = raw.parse::<i64>() {
        return Value::from(i);
    }
    if let Ok(f) = raw.parse::<f64>() {
        if let Some(n) = serde_json::Number::from_f64(f) {
            return Value::Number(n);
        }
    }
    Value::String(raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalar_pairs_coerce_by_type() {
        let value = parse_query_string("title=todo&priority=3&done=true");
        assert_eq!(value, json!({"title": "todo", "priority": 3, "done": true}));
    }

    #[test]
    fn bracket_notation_nests_operators() {
        let value = parse_query_string("age%5B%24gte%5D=21");
        assert_eq!(value, json!({"age": {"$gte": 21}}));
    }

    #[test]
    fn sort_modifier_parses_to_nested_object() {
        let value = parse_query_string("%24sort%5BcreatedAt%5D=-1");
        assert_eq!(value, json!({"$sort": {"createdAt": -1}}));
    }

    #[test]
    fn in_operator_splits_on_comma() {
        let value = parse_query_string("status%5B%24in%5D=a,b,c");
        assert_eq!(value, json!({"status": {"$in": ["a", "b", "c"]}}));
    }
}
