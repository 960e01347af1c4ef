//! Opaque token issuance and lifecycle.

use std::sync::Arc;
use std::time::Duration;

use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::Utc;
use rand::RngCore;

use crate::errors::AuthError;
use crate::models::{CompiledPermission, Token};
use crate::store::{StoreError, StoreResult, TokenStore};

/// Absolute nanoseconds since epoch; token expiries are compared in this unit.
pub fn now_ns() -> i64 {
    Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX)
}

pub fn now_secs() -> i64 {
    Utc::now().timestamp()
}

/// 32 cryptographically random bytes as 64 hex chars.
fn random_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Opaque internal id for stored records.
pub fn random_id() -> String {
    let mut bytes = [0u8; 24];
    rand::thread_rng().fill_bytes(&mut bytes);
    Base64UrlUnpadded::encode_string(&bytes)
}

/// Issues token pairs carrying a snapshot of compiled permissions, resolves
/// them back with expiry enforcement, and refreshes snapshots in place when
/// roles change under a live token.
#[derive(Clone)]
pub struct TokenManager {
    store: Arc<dyn TokenStore>,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenManager {
    pub fn new(store: Arc<dyn TokenStore>, access_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self {
            store,
            access_ttl,
            refresh_ttl,
        }
    }

    /// Generates a fresh access/refresh pair and persists the record.
    pub async fn issue(
        &self,
        user_id: &str,
        permissions: Vec<CompiledPermission>,
    ) -> Result<Token, AuthError> {
        let now = now_ns();
        let now_s = now_secs();
        let token = Token {
            internal_id: random_id(),
            user_id: user_id.to_string(),
            access_token: random_token(),
            refresh_token: random_token(),
            expires_at: now.saturating_add(self.access_ttl.as_nanos() as i64),
            refresh_expires_at: now.saturating_add(self.refresh_ttl.as_nanos() as i64),
            compiled_permissions: permissions,
            cr_time: now_s,
            ch_time: now_s,
        };
        self.store.store(&token).await?;
        Ok(token)
    }

    /// Resolves an access string. An expired record is deleted as a side
    /// effect and reported as `NotFound`, distinguishable from transport
    /// failure.
    pub async fn lookup_by_access(&self, access_token: &str) -> StoreResult<Token> {
        let token = self.store.get_by_access(access_token).await?;
        if now_ns() > token.expires_at {
            let _ = self.store.delete_by_id(&token.internal_id).await;
            return Err(StoreError::NotFound);
        }
        Ok(token)
    }

    /// Same as [`Self::lookup_by_access`] against the refresh expiry.
    pub async fn lookup_by_refresh(&self, refresh_token: &str) -> StoreResult<Token> {
        let token = self.store.get_by_refresh(refresh_token).await?;
        if now_ns() > token.refresh_expires_at {
            let _ = self.store.delete_by_id(&token.internal_id).await;
            return Err(StoreError::NotFound);
        }
        Ok(token)
    }

    /// Newest token record for a user, regardless of expiry.
    pub async fn find_by_user(&self, user_id: &str) -> StoreResult<Token> {
        self.store.get_by_user(user_id).await
    }

    /// Swaps the compiled-permission snapshot; strings and expiries stay.
    pub async fn update_permissions(
        &self,
        token: &Token,
        permissions: &[CompiledPermission],
    ) -> StoreResult<()> {
        self.store
            .update_permissions(&token.internal_id, permissions, now_secs())
            .await
    }

    pub async fn delete_by_id(&self, id: &str) -> StoreResult<u64> {
        self.store.delete_by_id(id).await
    }

    pub async fn delete_by_user(&self, user_id: &str) -> StoreResult<u64> {
        self.store.delete_by_user(user_id).await
    }

    /// Drops every record whose refresh expiry has passed.
    pub async fn purge_expired(&self) -> StoreResult<u64> {
        self.store.delete_expired(now_ns()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryDocumentStore, Stores};

    fn manager(access_ttl: Duration, refresh_ttl: Duration) -> TokenManager {
        let stores = Stores::new(Arc::new(MemoryDocumentStore::new()));
        TokenManager::new(stores.tokens, access_ttl, refresh_ttl)
    }

    #[tokio::test]
    async fn issued_strings_are_64_hex_chars() {
        let manager = manager(Duration::from_secs(900), Duration::from_secs(3600));
        let token = manager.issue("u1", Vec::new()).await.unwrap();
        assert_eq!(token.access_token.len(), 64);
        assert_eq!(token.refresh_token.len(), 64);
        assert!(token.access_token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(token.access_token, token.refresh_token);
        assert!(token.expires_at > now_ns());
        assert!(token.refresh_expires_at > token.expires_at);
    }

    #[tokio::test]
    async fn lookup_round_trip() {
        let manager = manager(Duration::from_secs(900), Duration::from_secs(3600));
        let token = manager.issue("u1", Vec::new()).await.unwrap();
        let found = manager.lookup_by_access(&token.access_token).await.unwrap();
        assert_eq!(found.internal_id, token.internal_id);
        let found = manager
            .lookup_by_refresh(&token.refresh_token)
            .await
            .unwrap();
        assert_eq!(found.internal_id, token.internal_id);
    }

    #[tokio::test]
    async fn expired_access_lookup_deletes_record() {
        let manager = manager(Duration::ZERO, Duration::from_secs(3600));
        let token = manager.issue("u1", Vec::new()).await.unwrap();
        let err = manager
            .lookup_by_access(&token.access_token)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
        // record is gone entirely, not just rejected
        let err = manager.find_by_user("u1").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
    }

    #[tokio::test]
    async fn snapshot_update_preserves_strings() {
        let manager = manager(Duration::from_secs(900), Duration::from_secs(3600));
        let token = manager.issue("u1", Vec::new()).await.unwrap();
        let permissions = vec![CompiledPermission {
            microservice: "storage".to_string(),
            method: "GET".to_string(),
            path: "/api/v1/*".to_string(),
            ..Default::default()
        }];
        manager.update_permissions(&token, &permissions).await.unwrap();

        let found = manager.lookup_by_access(&token.access_token).await.unwrap();
        assert_eq!(found.access_token, token.access_token);
        assert_eq!(found.refresh_token, token.refresh_token);
        assert_eq!(found.expires_at, token.expires_at);
        assert_eq!(found.compiled_permissions, permissions);
    }

    #[tokio::test]
    async fn purge_drops_refresh_expired_records() {
        let manager = manager(Duration::ZERO, Duration::ZERO);
        manager.issue("u1", Vec::new()).await.unwrap();
        let purged = manager.purge_expired().await.unwrap();
        assert_eq!(purged, 1);
    }
}
