//! Role store over the document protocol.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::models::Role;
use crate::store::document::{Document, DocumentStore, FindOptions};
use crate::store::{RoleFilter, RoleStore, StoreError, StoreResult};

const COLLECTION: &str = "roles";

pub struct DocRoleStore {
    docs: Arc<dyn DocumentStore>,
}

impl DocRoleStore {
    pub fn new(docs: Arc<dyn DocumentStore>) -> Self {
        Self { docs }
    }

    async fn find_one(&self, filter: Document) -> StoreResult<Role> {
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

fn to_doc(role: &Role) -> StoreResult<Document> {
    match serde_json::to_value(role)? {
        Value::Object(doc) => Ok(doc),
        _ => Err(StoreError::Backend("role did not serialize to an object".into())),
    }
}

fn from_doc(doc: Document) -> StoreResult<Role> {
    Ok(serde_json::from_value(Value::Object(doc))?)
}

fn filter_eq(key: &str, value: &str) -> Document {
    let mut filter = Document::new();
    filter.insert(key.to_string(), Value::String(value.to_string()));
    filter
}

#[async_trait]
impl RoleStore for DocRoleStore {
    async fn create(&self, role: &Role) -> StoreResult<()> {
        self.docs.insert(COLLECTION, vec![to_doc(role)?]).await?;
        Ok(())
    }

    async fn get_by_id(&self, id: &str) -> StoreResult<Role> {
        self.find_one(filter_eq("internal_id", id)).await
    }

    async fn get_by_name(&self, name: &str) -> StoreResult<Role> {
        self.find_one(filter_eq("name", name)).await
    }

    async fn get_by_ids(&self, ids: &[String]) -> StoreResult<Vec<Role>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut filter = Document::new();
        filter.insert("internal_id".to_string(), json!({ "$in": ids }));
        let page = self
            .docs
            .find(COLLECTION, &filter, FindOptions::default())
            .await?;
        page.data.into_iter().map(from_doc).collect()
    }

    async fn update(&self, filter: &Document, update: &Document) -> StoreResult<u64> {
        self.docs.update(COLLECTION, filter, update).await
    }

    async fn delete(&self, filter: &Document) -> StoreResult<u64> {
        self.docs.delete(COLLECTION, filter).await
    }

    async fn list(&self, filter: &RoleFilter) -> StoreResult<(Vec<Role>, u64)> {
        let mut base = Document::new();
        if let Some(active) = filter.active {
            base.insert("is_active".to_string(), Value::Bool(active));
        }

        let page = self.docs.find(COLLECTION, &base, FindOptions::default()).await?;
        let mut roles = page
            .data
            .into_iter()
            .map(from_doc)
            .collect::<StoreResult<Vec<_>>>()?;

        if let Some(search) = filter.search.as_deref().filter(|s| !s.is_empty()) {
            roles.retain(|role| role.name.contains(search));
        }
        roles.sort_by_key(|role| role.cr_time);

        let total = roles.len() as u64;
        let skip = ((filter.page.max(1) - 1) * filter.limit) as usize;
        let roles = roles
            .into_iter()
            .skip(skip)
            .take(filter.limit as usize)
            .collect();
        Ok((roles, total))
    }

    async fn find(&self, filter: &Document) -> StoreResult<Vec<Role>> {
        let page = self
            .docs
            .find(COLLECTION, filter, FindOptions::default())
            .await?;
        page.data.into_iter().map(from_doc).collect()
    }
}
