//! User CRUD and role assignment, with eager token-snapshot refresh on any
//! role-list change.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::warn;

use crate::auth::hash_password;
use crate::errors::AuthError;
use crate::models::{CreateUserRequest, User};
use crate::permissions::PermissionEngine;
use crate::store::{Document, UserFilter, UserStore};
use crate::tokens::{now_secs, random_id, TokenManager};

pub const MAX_ROLES_PER_USER: usize = 10;

#[derive(Clone)]
pub struct UserService {
    users: Arc<dyn UserStore>,
    tokens: TokenManager,
    engine: PermissionEngine,
    bcrypt_cost: u32,
}

impl UserService {
    pub fn new(
        users: Arc<dyn UserStore>,
        tokens: TokenManager,
        engine: PermissionEngine,
        bcrypt_cost: u32,
    ) -> Self {
        Self {
            users,
            tokens,
            engine,
            bcrypt_cost,
        }
    }

    /// The first user created in an empty base becomes the super-user; the
    /// flag is never grantable again through any code path.
    pub async fn create(&self, req: &CreateUserRequest) -> Result<User, AuthError> {
        if self.users.get_by_username(&req.username).await.is_ok() {
            return Err(AuthError::Conflict("username already exists".to_string()));
        }
        if self.users.get_by_email(&req.email).await.is_ok() {
            return Err(AuthError::Conflict("email already exists".to_string()));
        }

        let password_hash = hash_password(&req.password, self.bcrypt_cost)?;
        let user_count = self.users.count().await?;
        let now = now_secs();

        let user = User {
            internal_id: random_id(),
            username: req.username.clone(),
            email: req.email.clone(),
            password_hash,
            is_active: req.is_active.unwrap_or(true),
            is_super_user: user_count == 0,
            roles: Vec::new(),
            data: req.data.clone().unwrap_or_default(),
            cr_time: now,
            ch_time: now,
        };

        self.users.create(&user).await?;
        Ok(user.sanitized())
    }

    pub async fn get(&self, id: &str) -> Result<User, AuthError> {
        let user = self
            .users
            .get_by_id(id)
            .await
            .map_err(|_| AuthError::NotFound("user".to_string()))?;
        Ok(user.sanitized())
    }

    /// Listing hides both the password hash and the super-user flag.
    pub async fn list(&self, filter: &UserFilter) -> Result<(Vec<User>, u64), AuthError> {
        let filter = clamp(filter);
        let (users, total) = self.users.list(&filter).await?;
        let users = users
            .into_iter()
            .map(|user| {
                let mut user = user.sanitized();
                user.is_super_user = false;
                user
            })
            .collect();
        Ok((users, total))
    }

    /// Filter/data envelope update. Accepts plain maps (treated as `$set`)
    /// and operator maps. Super-user grants are stripped from either shape,
    /// passwords are transparently hashed, and a touched role list triggers
    /// snapshot refresh for every matched user.
    pub async fn update(&self, filter: &Document, data: &Document) -> Result<u64, AuthError> {
        let mut roles_updated = false;
        let operator_style = data.keys().any(|k| k.starts_with('$'));

        let mut update = Document::new();
        if operator_style {
            for (op, operand) in data {
                let mut operand = operand.clone();
                if let Value::Object(fields) = &mut operand {
                    self.scrub_fields(fields, &mut roles_updated)?;
                }
                update.insert(op.clone(), operand);
            }
        } else {
            let mut fields = data.clone();
            self.scrub_fields(&mut fields, &mut roles_updated)?;
            update.insert("$set".to_string(), Value::Object(fields));
        }
        touch(&mut update);

        let updated = self.users.update(filter, &update).await?;

        if roles_updated {
            self.refresh_snapshots(filter).await?;
        }

        Ok(updated)
    }

    fn scrub_fields(
        &self,
        fields: &mut Document,
        roles_updated: &mut bool,
    ) -> Result<(), AuthError> {
        fields.remove("is_super_user");
        if fields.contains_key("roles") {
            *roles_updated = true;
        }
        if let Some(Value::String(password)) = fields.get("password").cloned() {
            fields.insert(
                "password_hash".to_string(),
                Value::String(hash_password(&password, self.bcrypt_cost)?),
            );
            fields.remove("password");
        }
        Ok(())
    }

    /// Tokens of matched users go first so no credential outlives its user.
    pub async fn delete(&self, filter: &Document) -> Result<u64, AuthError> {
        let affected = self.users.find(filter).await?;
        for user in &affected {
            let _ = self.tokens.delete_by_user(&user.internal_id).await;
        }
        Ok(self.users.delete(filter).await?)
    }

    pub async fn assign_roles(&self, user_id: &str, role_ids: &[String]) -> Result<(), AuthError> {
        let user = self
            .users
            .get_by_id(user_id)
            .await
            .map_err(|_| AuthError::NotFound("user".to_string()))?;

        let mut roles = user.roles.clone();
        for role_id in role_ids {
            if !roles.contains(role_id) {
                roles.push(role_id.clone());
            }
        }
        if roles.len() > MAX_ROLES_PER_USER {
            return Err(AuthError::Validation(format!(
                "maximum {MAX_ROLES_PER_USER} roles per user exceeded"
            )));
        }

        self.set_roles(user_id, roles).await
    }

    pub async fn remove_roles(&self, user_id: &str, role_ids: &[String]) -> Result<(), AuthError> {
        let user = self
            .users
            .get_by_id(user_id)
            .await
            .map_err(|_| AuthError::NotFound("user".to_string()))?;

        let roles: Vec<String> = user
            .roles
            .into_iter()
            .filter(|role_id| !role_ids.contains(role_id))
            .collect();

        self.set_roles(user_id, roles).await
    }

    async fn set_roles(&self, user_id: &str, roles: Vec<String>) -> Result<(), AuthError> {
        let filter = id_filter(user_id);
        let mut update = Document::new();
        update.insert("$set".to_string(), json!({ "roles": roles }));
        touch(&mut update);
        self.users.update(&filter, &update).await?;
        self.refresh_snapshots(&filter).await
    }

    /// Recompiles the permission snapshot on the live token of every user
    /// matching `filter`. Best-effort: per-user failures are logged and
    /// skipped, a stale snapshot being preferable to a blocked role edit.
    pub async fn refresh_snapshots(&self, filter: &Document) -> Result<(), AuthError> {
        let users = self.users.find(filter).await?;
        for user in users {
            let token = match self.tokens.find_by_user(&user.internal_id).await {
                Ok(token) => token,
                Err(_) => continue,
            };
            let permissions = match self.engine.compile(&user).await {
                Ok(permissions) => permissions,
                Err(e) => {
                    warn!(user_id = %user.internal_id, error = %e, "permission recompile failed");
                    continue;
                }
            };
            if let Err(e) = self.tokens.update_permissions(&token, &permissions).await {
                warn!(user_id = %user.internal_id, error = %e, "token snapshot update failed");
            }
        }
        Ok(())
    }
}

fn clamp(filter: &UserFilter) -> UserFilter {
    let mut filter = filter.clone();
    filter.page = filter.page.max(1);
    if filter.limit < 1 {
        filter.limit = 20;
    }
    filter.limit = filter.limit.min(100);
    filter
}

pub(crate) fn id_filter(internal_id: &str) -> Document {
    let mut filter = Document::new();
    filter.insert(
        "internal_id".to_string(),
        Value::String(internal_id.to_string()),
    );
    filter
}

/// Folds a ch_time touch into the update's `$set`.
fn touch(update: &mut Document) {
    match update.get_mut("$set") {
        Some(Value::Object(fields)) => {
            fields.insert("ch_time".to_string(), json!(now_secs()));
        }
        _ => {
            update.insert("$set".to_string(), json!({ "ch_time": now_secs() }));
        }
    }
}
