//! Token store over the document protocol. Expiry enforcement lives in the
//! token manager; this layer is raw record access.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::models::{CompiledPermission, Token};
use crate::store::document::{Document, DocumentStore, FindOptions, SortOrder};
use crate::store::{StoreError, StoreResult, TokenStore};

const COLLECTION: &str = "tokens";

pub struct DocTokenStore {
    docs: Arc<dyn DocumentStore>,
}

impl DocTokenStore {
    pub fn new(docs: Arc<dyn DocumentStore>) -> Self {
        Self { docs }
    }

    async fn find_one(&self, filter: Document, options: FindOptions) -> StoreResult<Token> {
        let page = self.docs.find(COLLECTION, &filter, options).await?;
        page.data
            .into_iter()
            .next()
            .map(from_doc)
            .transpose()?
            .ok_or(StoreError::NotFound)
    }
}

fn to_doc(token: &Token) -> StoreResult<Document> {
    match serde_json::to_value(token)? {
        Value::Object(doc) => Ok(doc),
        _ => Err(StoreError::Backend("token did not serialize to an object".into())),
    }
}

fn from_doc(doc: Document) -> StoreResult<Token> {
    Ok(serde_json::from_value(Value::Object(doc))?)
}

fn filter_eq(key: &str, value: &str) -> Document {
    let mut filter = Document::new();
    filter.insert(key.to_string(), Value::String(value.to_string()));
    filter
}

#[async_trait]
impl TokenStore for DocTokenStore {
    async fn store(&self, token: &Token) -> StoreResult<()> {
        self.docs.insert(COLLECTION, vec![to_doc(token)?]).await?;
        Ok(())
    }

    async fn get_by_access(&self, access_token: &str) -> StoreResult<Token> {
        self.find_one(filter_eq("access_token", access_token), FindOptions::limited(1))
            .await
    }

    async fn get_by_refresh(&self, refresh_token: &str) -> StoreResult<Token> {
        self.find_one(
            filter_eq("refresh_token", refresh_token),
            FindOptions::limited(1),
        )
        .await
    }

    async fn get_by_user(&self, user_id: &str) -> StoreResult<Token> {
        self.find_one(
            filter_eq("user_id", user_id),
            FindOptions {
                sort: Some(("cr_time".to_string(), SortOrder::Desc)),
                limit: Some(1),
                skip: 0,
            },
        )
        .await
    }

    async fn update_permissions(
        &self,
        token_id: &str,
        permissions: &[CompiledPermission],
        ch_time: i64,
    ) -> StoreResult<()> {
        let mut update = Document::new();
        update.insert(
            "$set".to_string(),
            json!({
                "compiled_permissions": permissions,
                "ch_time": ch_time,
            }),
        );
        let updated = self
            .docs
            .update(COLLECTION, &filter_eq("internal_id", token_id), &update)
            .await?;
        if updated == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn delete_by_id(&self, id: &str) -> StoreResult<u64> {
        self.docs.delete(COLLECTION, &filter_eq("internal_id", id)).await
    }

    async fn delete_by_user(&self, user_id: &str) -> StoreResult<u64> {
        self.docs.delete(COLLECTION, &filter_eq("user_id", user_id)).await
    }

    async fn delete_expired(&self, now_ns: i64) -> StoreResult<u64> {
        let mut filter = Document::new();
        filter.insert("refresh_expires_at".to_string(), json!({ "$lt": now_ns }));
        self.docs.delete(COLLECTION, &filter).await
    }
}
