//! User store over the document protocol.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::models::User;
use crate::store::document::{Document, DocumentStore, FindOptions};
use crate::store::{StoreError, StoreResult, UserFilter, UserStore};

const COLLECTION: &str = "users";

pub struct DocUserStore {
    docs: Arc<dyn DocumentStore>,
}

impl DocUserStore {
    pub fn new(docs: Arc<dyn DocumentStore>) -> Self {
        Self { docs }
    }

    async fn find_one(&self, filter: Document) -> StoreResult<User> {
        let page = self
            .docs
            .find(COLLECTION, &filter, FindOptions::limited(1))
            .await?;
        page.data
            .into_iter()
            .next()
            .map(from_doc)
            .transpose()?
            .ok_or(StoreError::NotFound)
    }
}

fn to_doc(user: &User) -> StoreResult<Document> {
    match serde_json::to_value(user)? {
        Value::Object(doc) => Ok(doc),
        _ => Err(StoreError::Backend("user did not serialize to an object".into())),
    }
}

fn from_doc(doc: Document) -> StoreResult<User> {
    Ok(serde_json::from_value(Value::Object(doc))?)
}

fn filter_eq(key: &str, value: &str) -> Document {
    let mut filter = Document::new();
    filter.insert(key.to_string(), Value::String(value.to_string()));
    filter
}

#[async_trait]
impl UserStore for DocUserStore {
    async fn create(&self, user: &User) -> StoreResult<()> {
        self.docs.insert(COLLECTION, vec![to_doc(user)?]).await?;
        Ok(())
    }

    async fn get_by_id(&self, id: &str) -> StoreResult<User> {
        self.find_one(filter_eq("internal_id", id)).await
    }

    async fn get_by_username(&self, username: &str) -> StoreResult<User> {
        self.find_one(filter_eq("username", username)).await
    }

    async fn get_by_email(&self, email: &str) -> StoreResult<User> {
        self.find_one(filter_eq("email", email)).await
    }

    async fn update(&self, filter: &Document, update: &Document) -> StoreResult<u64> {
        self.docs.update(COLLECTION, filter, update).await
    }

    async fn delete(&self, filter: &Document) -> StoreResult<u64> {
        self.docs.delete(COLLECTION, filter).await
    }

    async fn list(&self, filter: &UserFilter) -> StoreResult<(Vec<User>, u64)> {
        let mut base = Document::new();
        if let Some(active) = filter.active {
            base.insert("is_active".to_string(), Value::Bool(active));
        }
        if let Some(role) = &filter.role {
            base.insert("roles".to_string(), Value::String(role.clone()));
        }

        let page = self.docs.find(COLLECTION, &base, FindOptions::default()).await?;
        let mut users = page
            .data
            .into_iter()
            .map(from_doc)
            .collect::<StoreResult<Vec<_>>>()?;

        if let Some(search) = filter.search.as_deref().filter(|s| !s.is_empty()) {
            users.retain(|user| user.username.contains(search) || user.email.contains(search));
        }
        users.sort_by_key(|user| user.cr_time);

        let total = users.len() as u64;
        let skip = ((filter.page.max(1) - 1) * filter.limit) as usize;
        let users = users
            .into_iter()
            .skip(skip)
            .take(filter.limit as usize)
            .collect();
        Ok((users, total))
    }

    async fn find(&self, filter: &Document) -> StoreResult<Vec<User>> {
        let page = self
            .docs
            .find(COLLECTION, filter, FindOptions::default())
            .await?;
        page.data.into_iter().map(from_doc).collect()
    }

    async fn by_role(&self, role_id: &str) -> StoreResult<Vec<User>> {
        let mut filter = Document::new();
        filter.insert("roles".to_string(), json!(role_id));
        self.find(&filter).await
    }

    async fn count(&self) -> StoreResult<u64> {
        let page = self
            .docs
            .find(COLLECTION, &Document::new(), FindOptions::limited(0))
            .await?;
        Ok(page.total)
    }
}
