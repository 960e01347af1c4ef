//! In-memory document backend. No durability; state lives in process-wide
//! maps guarded by an RwLock. Used by tests and the "memory" database
//! backend for local development.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::store::document::{self, Document, DocumentStore, FindOptions, Page};
use crate::store::{StoreError, StoreResult};

#[derive(Default)]
pub struct MemoryDocumentStore {
    collections: RwLock<HashMap<String, Vec<Document>>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn internal_id(doc: &Document) -> StoreResult<String> {
    match doc.get("internal_id") {
        Some(Value::String(id)) if !id.is_empty() => Ok(id.clone()),
        _ => Err(StoreError::InvalidQuery(
            "document is missing internal_id".to_string(),
        )),
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn find(
        &self,
        collection: &str,
        filter: &Document,
        options: FindOptions,
    ) -> StoreResult<Page> {
        let collections = self.collections.read().await;
        let docs = collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|doc| document::matches(doc, filter))
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        Ok(document::paginate(docs, &options))
    }

    async fn insert(&self, collection: &str, docs: Vec<Document>) -> StoreResult<u64> {
        let mut collections = self.collections.write().await;
        let stored = collections.entry(collection.to_string()).or_default();
        for doc in &docs {
            let id = internal_id(doc)?;
            if stored
                .iter()
                .any(|existing| existing.get("internal_id") == Some(&Value::String(id.clone())))
            {
                return Err(StoreError::Conflict(format!(
                    "duplicate internal_id {id} in {collection}"
                )));
            }
        }
        let inserted = docs.len() as u64;
        stored.extend(docs);
        Ok(inserted)
    }

    async fn update(
        &self,
        collection: &str,
        filter: &Document,
        update: &Document,
    ) -> StoreResult<u64> {
        let mut collections = self.collections.write().await;
        let Some(stored) = collections.get_mut(collection) else {
            return Ok(0);
        };
        let mut updated = 0;
        for doc in stored.iter_mut() {
            if document::matches(doc, filter) {
                document::apply_update(doc, update);
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn delete(&self, collection: &str, filter: &Document) -> StoreResult<u64> {
        let mut collections = self.collections.write().await;
        let Some(stored) = collections.get_mut(collection) else {
            return Ok(0);
        };
        let before = stored.len();
        stored.retain(|doc| !document::matches(doc, filter));
        Ok((before - stored.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().expect("object").clone()
    }

    #[tokio::test]
    async fn insert_find_update_delete() {
        let store = MemoryDocumentStore::new();
        store
            .insert(
                "users",
                vec![
                    doc(json!({"internal_id": "u1", "username": "ada", "cr_time": 1})),
                    doc(json!({"internal_id": "u2", "username": "bob", "cr_time": 2})),
                ],
            )
            .await
            .unwrap();

        let page = store
            .find("users", &doc(json!({"username": "ada"})), FindOptions::default())
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.data[0].get("internal_id"), Some(&json!("u1")));

        let updated = store
            .update(
                "users",
                &doc(json!({"internal_id": "u1"})),
                &doc(json!({"$set": {"username": "ada2"}})),
            )
            .await
            .unwrap();
        assert_eq!(updated, 1);

        let deleted = store
            .delete("users", &doc(json!({"internal_id": "u2"})))
            .await
            .unwrap();
        assert_eq!(deleted, 1);

        let page = store
            .find("users", &Document::new(), FindOptions::default())
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.data[0].get("username"), Some(&json!("ada2")));
    }

    #[tokio::test]
    async fn duplicate_internal_id_conflicts() {
        let store = MemoryDocumentStore::new();
        store
            .insert("roles", vec![doc(json!({"internal_id": "r1"}))])
            .await
            .unwrap();
        let err = store
            .insert("roles", vec![doc(json!({"internal_id": "r1"}))])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn count_via_zero_limit() {
        let store = MemoryDocumentStore::new();
        store
            .insert(
                "tokens",
                vec![
                    doc(json!({"internal_id": "t1"})),
                    doc(json!({"internal_id": "t2"})),
                ],
            )
            .await
            .unwrap();
        let page = store
            .find("tokens", &Document::new(), FindOptions::limited(0))
            .await
            .unwrap();
        assert_eq!(page.total, 2);
        assert!(page.data.is_empty());
    }
}
