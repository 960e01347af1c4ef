//! Login, refresh, logout and the verify decision call.

use std::sync::Arc;

use crate::errors::AuthError;
use crate::models::{
    AuthResponse, LoginRequest, TestPermissionsRequest, Token, TokenResponse, User,
    UserInfoResponse, VerifyRequest, VerifyResponse,
};
use crate::permissions::PermissionEngine;
use crate::store::{StoreResult, UserStore};
use crate::tokens::{now_ns, TokenManager};

pub fn hash_password(password: &str, cost: u32) -> Result<String, AuthError> {
    Ok(bcrypt::hash(password, cost)?)
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}

#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserStore>,
    tokens: TokenManager,
    engine: PermissionEngine,
}

impl AuthService {
    pub fn new(users: Arc<dyn UserStore>, tokens: TokenManager, engine: PermissionEngine) -> Self {
        Self {
            users,
            tokens,
            engine,
        }
    }

    /// Password login. Every credential failure collapses to
    /// `InvalidCredentials`: unknown user, inactive account, missing roles
    /// and bad password are indistinguishable to the caller. While a live
    /// token exists the same pair is returned; `renew` additionally
    /// refreshes its permission snapshot.
    pub async fn login(&self, req: &LoginRequest) -> Result<AuthResponse, AuthError> {
        let user = self
            .find_user(&req.user)
            .await
            .map_err(|_| AuthError::InvalidCredentials)?;

        if !user.is_active {
            return Err(AuthError::InvalidCredentials);
        }
        if !verify_password(&req.password, &user.password_hash) {
            return Err(AuthError::InvalidCredentials);
        }
        if user.roles.is_empty() && !user.is_super_user {
            return Err(AuthError::InvalidCredentials);
        }

        if let Ok(mut existing) = self.tokens.find_by_user(&user.internal_id).await {
            if existing.expires_at > now_ns() {
                if req.renew {
                    let permissions = self.engine.compile(&user).await?;
                    self.tokens
                        .update_permissions(&existing, &permissions)
                        .await?;
                    existing.compiled_permissions = permissions;
                }
                return Ok(auth_response(user.sanitized(), existing));
            }
        }

        let _ = self.tokens.delete_by_user(&user.internal_id).await;
        let permissions = self.engine.compile(&user).await?;
        let token = self.tokens.issue(&user.internal_id, permissions).await?;

        Ok(auth_response(user.sanitized(), token))
    }

    async fn find_user(&self, identifier: &str) -> StoreResult<User> {
        if identifier.contains('@') {
            self.users.get_by_email(identifier).await
        } else {
            self.users.get_by_username(identifier).await
        }
    }

    /// Rotates both token strings. The old record is invalidated; the new
    /// snapshot is compiled against the user's current roles.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, AuthError> {
        let token = self
            .tokens
            .lookup_by_refresh(refresh_token)
            .await
            .map_err(|_| AuthError::InvalidToken)?;

        let user = match self.users.get_by_id(&token.user_id).await {
            Ok(user) if user.is_active => user,
            _ => {
                let _ = self.tokens.delete_by_id(&token.internal_id).await;
                return Err(AuthError::InvalidToken);
            }
        };

        let permissions = self.engine.compile(&user).await?;
        let _ = self.tokens.delete_by_id(&token.internal_id).await;
        let new_token = self.tokens.issue(&user.internal_id, permissions).await?;

        Ok(token_response(&new_token))
    }

    /// Idempotent: a token that no longer resolves is not an error.
    pub async fn logout(&self, access_token: &str) -> Result<(), AuthError> {
        match self.tokens.lookup_by_access(access_token).await {
            Ok(token) => {
                self.tokens.delete_by_id(&token.internal_id).await?;
                Ok(())
            }
            Err(_) => Ok(()),
        }
    }

    pub async fn user_info(&self, access_token: &str) -> Result<UserInfoResponse, AuthError> {
        let token = self
            .tokens
            .lookup_by_access(access_token)
            .await
            .map_err(|_| AuthError::InvalidToken)?;
        let user = self
            .users
            .get_by_id(&token.user_id)
            .await
            .map_err(|_| AuthError::InvalidToken)?;
        Ok(UserInfoResponse {
            user: user.sanitized(),
            permissions: token.compiled_permissions,
        })
    }

    /// Resolves an access token to a live, active user. Used by the HTTP
    /// auth layer in front of the management endpoints.
    pub async fn authenticate(&self, access_token: &str) -> Result<User, AuthError> {
        let token = self
            .tokens
            .lookup_by_access(access_token)
            .await
            .map_err(|_| AuthError::InvalidToken)?;
        let user = self
            .users
            .get_by_id(&token.user_id)
            .await
            .map_err(|_| AuthError::InvalidToken)?;
        if !user.is_active {
            return Err(AuthError::InvalidToken);
        }
        Ok(user)
    }

    /// The authorization decision exposed to other services. Deny states are
    /// answers, not errors; only infrastructure failures raise.
    ///
    /// While the user base is empty every request is allowed, so the first
    /// user can be created without a pre-provisioned credential. The count
    /// check runs on every call, never cached.
    pub async fn verify(&self, req: &VerifyRequest) -> Result<VerifyResponse, AuthError> {
        if let Ok(0) = self.users.count().await {
            return Ok(VerifyResponse {
                allowed: true,
                user_id: "no-users".to_string(),
                modified_params: Some(req.request_params.clone()),
                reason: "No users in system - access granted".to_string(),
                ..Default::default()
            });
        }

        let token = match self.tokens.lookup_by_access(&req.token).await {
            Ok(token) => token,
            Err(_) => return Ok(deny("Invalid or expired token")),
        };

        let user = match self.users.get_by_id(&token.user_id).await {
            Ok(user) => user,
            Err(_) => return Ok(deny("User not found")),
        };

        if !user.is_active {
            return Ok(deny("User account is inactive"));
        }

        // Super-users bypass the engine; params are echoed without auto-fill.
        if user.is_super_user {
            return Ok(VerifyResponse {
                allowed: true,
                user_id: user.internal_id,
                modified_params: Some(req.request_params.clone()),
                ..Default::default()
            });
        }

        let mut decision = self.engine.evaluate(
            &token.compiled_permissions,
            &req.microservice,
            &req.method,
            &req.path,
            &req.request_params,
        );
        decision.user_id = user.internal_id;
        Ok(decision)
    }

    /// Preview evaluation against the user's live roles instead of a token
    /// snapshot.
    pub async fn test_permissions(
        &self,
        req: &TestPermissionsRequest,
    ) -> Result<VerifyResponse, AuthError> {
        let user = self
            .users
            .get_by_id(&req.user_id)
            .await
            .map_err(|_| AuthError::NotFound("user".to_string()))?;

        if user.is_super_user {
            return Ok(VerifyResponse {
                allowed: true,
                user_id: user.internal_id,
                modified_params: Some(req.test_params.clone()),
                ..Default::default()
            });
        }

        let permissions = self.engine.compile(&user).await?;
        let mut decision = self.engine.evaluate(
            &permissions,
            &req.microservice,
            &req.method,
            &req.path,
            &req.test_params,
        );
        decision.user_id = user.internal_id;
        Ok(decision)
    }
}

fn deny(reason: &str) -> VerifyResponse {
    VerifyResponse {
        allowed: false,
        reason: reason.to_string(),
        ..Default::default()
    }
}

fn token_response(token: &Token) -> TokenResponse {
    TokenResponse {
        access_token: token.access_token.clone(),
        refresh_token: token.refresh_token.clone(),
        expires_in: (token.expires_at - now_ns()) / 1_000_000_000,
    }
}

fn auth_response(user: User, token: Token) -> AuthResponse {
    AuthResponse {
        tokens: token_response(&token),
        permissions: token.compiled_permissions,
        user,
    }
}
