//! An in-process storage adapter backed by `DashMap`. Used for tests and
//! single-node/dev deployments, and to cross-check the Postgres adapter's
//! query translation against the same integration tests (the "query
//! equivalence" invariant, spec §8).

use dashmap::DashMap;
use serde_json::Value;

use basin_query::{eval, Document, Query};

use crate::adapter::{apply_projection, apply_sort_skip_limit, StorageAdapter};
use crate::error::DataError;

#[derive(Default)]
pub struct MemoryAdapter {
    collections: DashMap<String, DashMap<String, Document>>,
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    fn collection(&self, name: &str) -> dashmap::mapref::one::Ref<'_, String, DashMap<String, Document>> {
        self.collections.entry(name.to_string()).or_default();
        self.collections.get(name).unwrap()
    }
}

#[async_trait::async_trait]
impl StorageAdapter for MemoryAdapter {
    async fn insert(&self, collection: &str, mut doc: Document) -> Result<Document, DataError> {
        let id = match doc.get("id").and_then(Value::as_str) {
            Some(id) => id.to_string(),
            None => {
                let id = uuid::Uuid::new_v4().to_string();
                doc.insert("id".to_string(), Value::String(id.clone()));
                id
            }
        };
        let store = self.collection(collection);
        if store.contains_key(&id) {
            return Err(DataError::Conflict(format!("id `{id}` already exists")));
        }
        store.insert(id, doc.clone());
        Ok(doc)
    }

    async fn update(&self, collection: &str, id: &str, patch: Document) -> Result<Document, DataError> {
        let store = self.collection(collection);
        let mut entry = store
            .get_mut(id)
            .ok_or_else(|| DataError::NotFound(format!("no document `{id}` in `{collection}`")))?;
        for (key, value) in patch {
            entry.insert(key, value);
        }
        Ok(entry.clone())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool, DataError> {
        let store = self.collection(collection);
        Ok(store.remove(id).is_some())
    }

    async fn find_one(&self, collection: &str, id: &str) -> Result<Option<Document>, DataError> {
        let store = self.collection(collection);
        Ok(store.get(id).map(|r| r.clone()))
    }

    async fn find(&self, collection: &str, query: &Query) -> Result<Vec<Document>, DataError> {
        let store = self.collection(collection);
        let mut docs: Vec<Document> = store
            .iter()
            .map(|entry| entry.value().clone())
            .filter(|doc| eval::matches(&query.filter, doc))
            .collect();
        docs = apply_sort_skip_limit(docs, query);
        for doc in &mut docs {
            apply_projection(doc, &query.fields);
        }
        Ok(docs)
    }

    async fn count(&self, collection: &str, query: &Query) -> Result<u64, DataError> {
        let store = self.collection(collection);
        Ok(store
            .iter()
            .filter(|entry| eval::matches(&query.filter, entry.value()))
            .count() as u64)
    }

    async fn rename_collection(&self, from: &str, to: &str) -> Result<(), DataError> {
        if let Some((_, store)) = self.collections.remove(from) {
            self.collections.insert(to.to_string(), store);
        }
        Ok(())
    }

    async fn drop_collection(&self, collection: &str) -> Result<(), DataError> {
        self.collections.remove(collection);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().unwrap().clone()
    }

    #[tokio::test]
    async fn insert_assigns_an_id_when_absent() {
        let adapter = MemoryAdapter::new();
        let stored = adapter.insert("todo", doc(json!({"title": "t"}))).await.unwrap();
        assert!(stored.get("id").and_then(Value::as_str).is_some());
    }

    #[tokio::test]
    async fn update_is_a_partial_merge() {
        let adapter = MemoryAdapter::new();
        let stored = adapter
            .insert("todo", doc(json!({"id": "1", "title": "t", "done": false})))
            .await
            .unwrap();
        let updated = adapter
            .update("todo", stored["id"].as_str().unwrap(), doc(json!({"done": true})))
            .await
            .unwrap();
        assert_eq!(updated["title"], "t");
        assert_eq!(updated["done"], true);
    }

    #[tokio::test]
    async fn update_missing_id_fails() {
        let adapter = MemoryAdapter::new();
        let err = adapter.update("todo", "missing", doc(json!({}))).await.unwrap_err();
        assert!(matches!(err, DataError::NotFound(_)));
    }

    #[tokio::test]
    async fn find_honors_filter_sort_limit() {
        let adapter = MemoryAdapter::new();
        for i in 0..5 {
            adapter
                .insert("n", doc(json!({"id": i.to_string(), "v": i})))
                .await
                .unwrap();
        }
        let query = basin_query::parse_query(&json!({"$sort": {"v": -1}, "$limit": 2})).unwrap();
        let results = adapter.find("n", &query).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0]["v"], 4);
        assert_eq!(results[1]["v"], 3);
    }
}
