//! Role CRUD with hierarchy validation and cascade on delete.

use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use crate::errors::AuthError;
use crate::models::{
    CreateRoleRequest, Role, RoleInfo, RolePermissionsResponse, User,
};
use crate::permissions::{PermissionEngine, MAX_ROLE_DEPTH};
use crate::store::{Document, RoleFilter, RoleStore, UserStore};
use crate::tokens::{now_secs, random_id};
use crate::users::{id_filter, UserService};

pub const MAX_PERMISSIONS_PER_ROLE: usize = 50;

#[derive(Clone)]
pub struct RoleService {
    roles: Arc<dyn RoleStore>,
    users: Arc<dyn UserStore>,
    engine: PermissionEngine,
    user_service: UserService,
}

impl RoleService {
    pub fn new(
        roles: Arc<dyn RoleStore>,
        users: Arc<dyn UserStore>,
        engine: PermissionEngine,
        user_service: UserService,
    ) -> Self {
        Self {
            roles,
            users,
            engine,
            user_service,
        }
    }

    pub async fn create(&self, req: &CreateRoleRequest) -> Result<Role, AuthError> {
        if self.roles.get_by_name(&req.name).await.is_ok() {
            return Err(AuthError::Conflict("role name already exists".to_string()));
        }
        if req.permissions.len() > MAX_PERMISSIONS_PER_ROLE {
            return Err(AuthError::Validation(format!(
                "maximum {MAX_PERMISSIONS_PER_ROLE} permissions per role exceeded"
            )));
        }

        let now = now_secs();
        let role = Role {
            internal_id: random_id(),
            name: req.name.clone(),
            is_active: req.is_active.unwrap_or(true),
            parent_roles: req.parent_roles.clone(),
            permissions: req.permissions.clone(),
            data: req.data.clone().unwrap_or_default(),
            cr_time: now,
            ch_time: now,
        };

        self.validate_hierarchy(&role.internal_id, &req.parent_roles)
            .await?;

        self.roles.create(&role).await?;
        Ok(role)
    }

    pub async fn get(&self, id: &str) -> Result<Role, AuthError> {
        self.roles
            .get_by_id(id)
            .await
            .map_err(|_| AuthError::NotFound("role".to_string()))
    }

    pub async fn get_by_name(&self, name: &str) -> Result<Role, AuthError> {
        self.roles
            .get_by_name(name)
            .await
            .map_err(|_| AuthError::NotFound("role".to_string()))
    }

    pub async fn list(&self, filter: &RoleFilter) -> Result<(Vec<Role>, u64), AuthError> {
        let mut filter = filter.clone();
        filter.page = filter.page.max(1);
        if filter.limit < 1 {
            filter.limit = 20;
        }
        filter.limit = filter.limit.min(100);
        Ok(self.roles.list(&filter).await?)
    }

    /// Edits to permissions or parents are validated eagerly, then every
    /// affected user's token snapshot is refreshed.
    pub async fn update(&self, filter: &Document, data: &Document) -> Result<u64, AuthError> {
        let affected = self.roles.find(filter).await?;

        if let Some(Value::Array(permissions)) = data.get("permissions") {
            if permissions.len() > MAX_PERMISSIONS_PER_ROLE {
                return Err(AuthError::Validation(format!(
                    "maximum {MAX_PERMISSIONS_PER_ROLE} permissions per role exceeded"
                )));
            }
        }

        if let Some(parents) = data.get("parent_roles") {
            let parents: Vec<String> =
                serde_json::from_value(parents.clone()).map_err(|_| {
                    AuthError::Validation("parent_roles must be a list of role ids".to_string())
                })?;
            for role in &affected {
                self.validate_hierarchy(&role.internal_id, &parents).await?;
            }
        }

        let mut update = Document::new();
        let mut fields = data.clone();
        fields.insert("ch_time".to_string(), Value::from(now_secs()));
        update.insert("$set".to_string(), Value::Object(fields));

        let updated = self.roles.update(filter, &update).await?;

        for role in &affected {
            self.refresh_role_holders(&role.internal_id).await;
        }

        Ok(updated)
    }

    /// Deleting a role strips it from every holder's role list and refreshes
    /// their snapshots before the role record goes away.
    pub async fn delete(&self, filter: &Document) -> Result<u64, AuthError> {
        let doomed = self.roles.find(filter).await?;

        for role in &doomed {
            let holders = match self.users.by_role(&role.internal_id).await {
                Ok(holders) => holders,
                Err(e) => {
                    warn!(role_id = %role.internal_id, error = %e, "role holder lookup failed");
                    continue;
                }
            };
            for user in holders {
                let roles: Vec<String> = user
                    .roles
                    .iter()
                    .filter(|id| *id != &role.internal_id)
                    .cloned()
                    .collect();
                let mut update = Document::new();
                update.insert(
                    "$set".to_string(),
                    serde_json::json!({ "roles": roles, "ch_time": now_secs() }),
                );
                if let Err(e) = self
                    .users
                    .update(&id_filter(&user.internal_id), &update)
                    .await
                {
                    warn!(user_id = %user.internal_id, error = %e, "role removal failed");
                    continue;
                }
                if let Err(e) = self
                    .user_service
                    .refresh_snapshots(&id_filter(&user.internal_id))
                    .await
                {
                    warn!(user_id = %user.internal_id, error = %e, "snapshot refresh failed");
                }
            }
        }

        Ok(self.roles.delete(filter).await?)
    }

    /// Compiled view of a single role: what a user holding exactly this role
    /// would be allowed, plus who currently holds it.
    pub async fn role_permissions(
        &self,
        role_id: &str,
    ) -> Result<RolePermissionsResponse, AuthError> {
        let role = self.get(role_id).await?;

        let users = self.users.by_role(role_id).await?;
        let user_ids = users.into_iter().map(|user| user.internal_id).collect();

        let probe = User {
            internal_id: "probe".to_string(),
            roles: vec![role_id.to_string()],
            ..Default::default()
        };
        let permissions = self.engine.compile(&probe).await?;

        Ok(RolePermissionsResponse {
            role: RoleInfo {
                internal_id: role.internal_id,
                name: role.name,
            },
            users: user_ids,
            permissions,
        })
    }

    /// Walks up the proposed parent chain rejecting self-reference, unknown
    /// or inactive parents, and chains deeper than the compile-time bound.
    /// Creation-time validation is strict where compilation is lenient. The
    /// role itself counts as depth 0 and its parents as depth 1, matching
    /// the engine's role walk, so a hierarchy accepted here never trips the
    /// depth bound when a holder's permissions are compiled.
    async fn validate_hierarchy(
        &self,
        role_id: &str,
        parent_roles: &[String],
    ) -> Result<(), AuthError> {
        let mut frontier: Vec<String> = parent_roles.to_vec();
        let mut depth = 1usize;

        while !frontier.is_empty() {
            if depth > MAX_ROLE_DEPTH {
                return Err(AuthError::Validation(format!(
                    "maximum role inheritance depth ({MAX_ROLE_DEPTH}) exceeded"
                )));
            }

            let mut next = Vec::new();
            for parent_id in &frontier {
                if parent_id == role_id {
                    return Err(AuthError::Validation(
                        "circular role dependency detected".to_string(),
                    ));
                }
                let parent = self.roles.get_by_id(parent_id).await.map_err(|_| {
                    AuthError::Validation(format!("parent role {parent_id} not found"))
                })?;
                if !parent.is_active {
                    return Err(AuthError::Validation(format!(
                        "parent role {parent_id} is inactive"
                    )));
                }
                next.extend(parent.parent_roles);
            }

            frontier = next;
            depth += 1;
        }

        Ok(())
    }

    async fn refresh_role_holders(&self, role_id: &str) {
        let mut filter = Document::new();
        filter.insert("roles".to_string(), Value::String(role_id.to_string()));
        if let Err(e) = self.user_service.refresh_snapshots(&filter).await {
            warn!(role_id = %role_id, error = %e, "snapshot refresh failed");
        }
    }
}
