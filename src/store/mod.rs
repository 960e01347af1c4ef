//! Persistence boundary. The core talks to three typed stores (users, roles,
//! tokens); each is implemented over the uniform document protocol in
//! [`document`], so swapping the backing store never touches the services.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{Role, Token, User};

pub mod document;
pub mod memory;
pub mod roles;
pub mod sqlite;
pub mod tokens;
pub mod users;

pub use document::{Document, DocumentStore, FindOptions, Page, SortOrder};
pub use memory::MemoryDocumentStore;
pub use roles::DocRoleStore;
pub use sqlite::SqliteDocumentStore;
pub use tokens::DocTokenStore;
pub use users::DocUserStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found")]
    NotFound,
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("invalid query: {0}")]
    InvalidQuery(String),
    #[error("backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<sea_orm::DbErr> for StoreError {
    fn from(value: sea_orm::DbErr) -> Self {
        StoreError::Backend(value.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(value: serde_json::Error) -> Self {
        StoreError::Backend(value.to_string())
    }
}

#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub page: u64,
    pub limit: u64,
    pub search: Option<String>,
    pub role: Option<String>,
    pub active: Option<bool>,
}

#[derive(Debug, Clone, Default)]
pub struct RoleFilter {
    pub page: u64,
    pub limit: u64,
    pub search: Option<String>,
    pub active: Option<bool>,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create(&self, user: &User) -> StoreResult<()>;
    async fn get_by_id(&self, id: &str) -> StoreResult<User>;
    async fn get_by_username(&self, username: &str) -> StoreResult<User>;
    async fn get_by_email(&self, email: &str) -> StoreResult<User>;
    async fn update(&self, filter: &Document, update: &Document) -> StoreResult<u64>;
    async fn delete(&self, filter: &Document) -> StoreResult<u64>;
    async fn list(&self, filter: &UserFilter) -> StoreResult<(Vec<User>, u64)>;
    /// Raw filter lookup, used by snapshot-refresh propagation.
    async fn find(&self, filter: &Document) -> StoreResult<Vec<User>>;
    /// Reverse lookup: every user whose role list contains `role_id`.
    async fn by_role(&self, role_id: &str) -> StoreResult<Vec<User>>;
    async fn count(&self) -> StoreResult<u64>;
}

#[async_trait]
pub trait RoleStore: Send + Sync {
    async fn create(&self, role: &Role) -> StoreResult<()>;
    async fn get_by_id(&self, id: &str) -> StoreResult<Role>;
    async fn get_by_name(&self, name: &str) -> StoreResult<Role>;
    /// Batch resolution; ids missing from the store are silently absent from
    /// the result.
    async fn get_by_ids(&self, ids: &[String]) -> StoreResult<Vec<Role>>;
    async fn update(&self, filter: &Document, update: &Document) -> StoreResult<u64>;
    async fn delete(&self, filter: &Document) -> StoreResult<u64>;
    async fn list(&self, filter: &RoleFilter) -> StoreResult<(Vec<Role>, u64)>;
    async fn find(&self, filter: &Document) -> StoreResult<Vec<Role>>;
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn store(&self, token: &Token) -> StoreResult<()>;
    async fn get_by_access(&self, access_token: &str) -> StoreResult<Token>;
    async fn get_by_refresh(&self, refresh_token: &str) -> StoreResult<Token>;
    /// Newest token record for a user.
    async fn get_by_user(&self, user_id: &str) -> StoreResult<Token>;
    /// Replaces only the compiled-permission snapshot and the change
    /// timestamp; token strings and expiries are untouched.
    async fn update_permissions(
        &self,
        token_id: &str,
        permissions: &[crate::models::CompiledPermission],
        ch_time: i64,
    ) -> StoreResult<()>;
    async fn delete_by_id(&self, id: &str) -> StoreResult<u64>;
    async fn delete_by_user(&self, user_id: &str) -> StoreResult<u64>;
    /// Removes every record whose refresh expiry is behind `now_ns`.
    async fn delete_expired(&self, now_ns: i64) -> StoreResult<u64>;
}

/// Bundle of the three typed stores over one document backend.
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn UserStore>,
    pub roles: Arc<dyn RoleStore>,
    pub tokens: Arc<dyn TokenStore>,
}

impl Stores {
    pub fn new(docs: Arc<dyn DocumentStore>) -> Self {
        Self {
            users: Arc::new(DocUserStore::new(docs.clone())),
            roles: Arc::new(DocRoleStore::new(docs.clone())),
            tokens: Arc::new(DocTokenStore::new(docs)),
        }
    }
}
