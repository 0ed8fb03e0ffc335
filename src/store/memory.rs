use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{DocumentStore, StoreError};

/// In-process store for tests and dry runs
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, HashMap<String, Map<String, Value>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All documents in a collection, in no particular order
    pub async fn documents(&self, collection: &str) -> Vec<Value> {
        self.collections
            .read()
            .await
            .get(collection)
            .map(|docs| docs.values().cloned().map(Value::Object).collect())
            .unwrap_or_default()
    }

    pub async fn count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map_or(0, HashMap::len)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn put(&self, collection: &str, id: &str, document: Value) -> Result<(), StoreError> {
        let Value::Object(mut fields) = document else {
            return Err(StoreError::NotAnObject);
        };
        fields.insert("_id".to_string(), Value::String(id.to_string()));

        self.collections
            .write()
            .await
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), fields);
        Ok(())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError> {
        Ok(self
            .collections
            .read()
            .await
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned()
            .map(Value::Object))
    }

    async fn add_to_set(&self, collection: &str, id: &str, field: &str, value: Value) -> Result<bool, StoreError> {
        let mut collections = self.collections.write().await;
        let Some(document) = collections.get_mut(collection).and_then(|docs| docs.get_mut(id)) else {
            return Ok(false);
        };

        match document
            .entry(field.to_string())
            .or_insert_with(|| Value::Array(Vec::new()))
        {
            Value::Array(items) => {
                if !items.contains(&value) {
                    items.push(value);
                }
                Ok(true)
            }
            _ => Err(StoreError::NotAnArray(field.to_string())),
        }
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_put_replaces_and_get_returns_id() {
        let store = MemoryStore::new();
        store.put("courses", "c1", json!({"title": "A"})).await.unwrap();
        store.put("courses", "c1", json!({"title": "B"})).await.unwrap();

        let doc = store.get("courses", "c1").await.unwrap().unwrap();
        assert_eq!(doc["title"], "B");
        assert_eq!(doc["_id"], "c1");
        assert_eq!(store.count("courses").await, 1);
        assert!(store.get("courses", "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_rejects_non_object() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.put("courses", "c1", json!([1, 2])).await,
            Err(StoreError::NotAnObject)
        ));
    }

    #[tokio::test]
    async fn test_add_to_set_semantics() {
        let store = MemoryStore::new();
        assert!(!store.add_to_set("users", "u1", "enrolledCourses", json!("c1")).await.unwrap());

        store.put("users", "u1", json!({"name": "Ada", "role": "learner"})).await.unwrap();
        assert!(store.add_to_set("users", "u1", "enrolledCourses", json!("c1")).await.unwrap());
        assert!(store.add_to_set("users", "u1", "enrolledCourses", json!("c1")).await.unwrap());
        assert!(store.add_to_set("users", "u1", "enrolledCourses", json!("c2")).await.unwrap());

        let user = store.get("users", "u1").await.unwrap().unwrap();
        assert_eq!(user["enrolledCourses"], json!(["c1", "c2"]));

        assert!(matches!(
            store.add_to_set("users", "u1", "role", json!("x")).await,
            Err(StoreError::NotAnArray(_))
        ));
    }
}
