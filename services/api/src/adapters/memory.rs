//! services/api/src/adapters/memory.rs
//!
//! Process-local implementations of the storage ports, used when no
//! `DATABASE_URL` is configured and throughout the service's tests.

use async_trait::async_trait;
use course_forge_core::ports::{DocumentStore, ObjectStore, PortResult, ID_FIELD};
use serde_json::{Map, Value};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Returns true when every key/value in `filter` is present in `doc`.
///
/// Objects match recursively, so `{"a": {"b": 1}}` matches `{"a": {"b": 1, "c": 2}}`.
fn contains(doc: &Value, filter: &Value) -> bool {
    match (doc, filter) {
        (Value::Object(doc), Value::Object(filter)) => filter
            .iter()
            .all(|(k, v)| doc.get(k).is_some_and(|d| contains(d, v))),
        (d, f) => d == f,
    }
}

#[derive(Default)]
pub struct InMemoryDocumentStore {
    // collection -> documents in insertion order
    collections: RwLock<HashMap<String, Vec<Map<String, Value>>>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every document in `collection`, oldest first.
    pub async fn all(&self, collection: &str) -> Vec<Value> {
        self.collections
            .read()
            .await
            .get(collection)
            .map(|docs| docs.iter().cloned().map(Value::Object).collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn insert(&self, collection: &str, doc: Value) -> PortResult<String> {
        let mut body = match doc {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        let id = Uuid::new_v4().to_string();
        body.insert(ID_FIELD.to_string(), Value::String(id.clone()));

        self.collections
            .write()
            .await
            .entry(collection.to_string())
            .or_default()
            .push(body);
        Ok(id)
    }

    async fn find_one(&self, collection: &str, filter: Value) -> PortResult<Option<Value>> {
        let collections = self.collections.read().await;
        Ok(collections.get(collection).and_then(|docs| {
            docs.iter()
                .find(|doc| match &filter {
                    Value::Object(filter) => filter
                        .iter()
                        .all(|(k, v)| doc.get(k).is_some_and(|d| contains(d, v))),
                    _ => false,
                })
                .cloned()
                .map(Value::Object)
        }))
    }

    async fn update(&self, collection: &str, id: &str, patch: Value) -> PortResult<bool> {
        let mut collections = self.collections.write().await;
        let Some(doc) = collections.get_mut(collection).and_then(|docs| {
            docs.iter_mut()
                .find(|doc| doc.get(ID_FIELD).and_then(Value::as_str) == Some(id))
        }) else {
            return Ok(false);
        };

        if let Value::Object(patch) = patch {
            for (key, value) in patch {
                if key != ID_FIELD {
                    doc.insert(key, value);
                }
            }
        }
        Ok(true)
    }
}

#[derive(Default)]
pub struct InMemoryObjectStore {
    objects: RwLock<HashMap<String, String>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn get(&self, key: &str) -> PortResult<Option<String>> {
        Ok(self.objects.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, text: &str) -> PortResult<String> {
        self.objects
            .write()
            .await
            .insert(key.to_string(), text.to_string());
        Ok(key.to_string())
    }
}
