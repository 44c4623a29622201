//! The Storage Adapter contract (spec §4.5): uniform CRUD over document or
//! relational backends, plus query translation.

use basin_query::{Document, Query};

use crate::error::DataError;

/// Options accepted by [`StorageAdapter::find`] beyond what's already
/// encoded in the parsed `Query` — kept separate so adapters don't need to
/// special-case an empty projection/sort themselves.
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    pub query: Query,
}

#[async_trait::async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Insert a document, assigning an `id` if absent. The assigned `id`
    /// is a string, globally unique within the collection, stable
    /// thereafter.
    async fn insert(&self, collection: &str, doc: Document) -> Result<Document, DataError>;

    /// Partial merge at the top level; nested objects are replaced
    /// wholesale. Fails if `id` is absent from the store.
    async fn update(&self, collection: &str, id: &str, patch: Document) -> Result<Document, DataError>;

    async fn delete(&self, collection: &str, id: &str) -> Result<bool, DataError>;

    async fn find_one(&self, collection: &str, id: &str) -> Result<Option<Document>, DataError>;

    /// Honors `$sort`/`$limit`/`$skip`/`$fields` from the parsed query.
    async fn find(&self, collection: &str, query: &Query) -> Result<Vec<Document>, DataError>;

    async fn count(&self, collection: &str, query: &Query) -> Result<u64, DataError>;

    async fn rename_collection(&self, from: &str, to: &str) -> Result<(), DataError>;

    async fn drop_collection(&self, collection: &str) -> Result<(), DataError>;
}

/// Apply a `$fields` projection to a document after retrieval. Shared by
/// every adapter so the inclusion/exclusion semantics stay identical
/// regardless of backend.
pub fn apply_projection(doc: &mut Document, projection: &Option<basin_query::Projection>) {
    use basin_query::Projection;
    match projection {
        None => {}
        Some(Projection::Include(fields)) => {
            let keep: std::collections::HashSet<&String> = fields.iter().collect();
            doc.retain(|k, _| k == "id" || keep.contains(k));
        }
        Some(Projection::Exclude(fields)) => {
            for field in fields {
                doc.remove(field);
            }
        }
    }
}

/// Apply `$sort`/`$skip`/`$limit` to an already-filtered result set. Shared
/// helper for adapters that fetch the full filtered set before paging
/// in-process (the memory adapter; the SQL adapter pushes this down
/// instead).
pub fn apply_sort_skip_limit(mut docs: Vec<Document>, query: &Query) -> Vec<Document> {
    for (field, direction) in query.sort.iter().rev() {
        docs.sort_by(|a, b| {
            let av = a.get(field).cloned().unwrap_or(serde_json::Value::Null);
            let bv = b.get(field).cloned().unwrap_or(serde_json::Value::Null);
            let ordering = compare_json(&av, &bv);
            match direction {
                basin_query::SortDirection::Ascending => ordering,
                basin_query::SortDirection::Descending => ordering.reverse(),
            }
        });
    }
    let skip = query.skip.unwrap_or(0) as usize;
    let docs: Vec<Document> = docs.into_iter().skip(skip).collect();
    match query.limit {
        Some(limit) => docs.into_iter().take(limit as usize).collect(),
        None => docs,
    }
}

fn compare_json(a: &serde_json::Value, b: &serde_json::Value) -> std::cmp::Ordering {
    use serde_json::Value;
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .unwrap_or(0.0)
            .partial_cmp(&y.as_f64().unwrap_or(0.0))
            .unwrap_or(std::cmp::Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => std::cmp::Ordering::Equal,
    }
}
