use palisade::models::{
    CreateRoleRequest, CreateUserRequest, ParamRule, Permission, Role, User,
};
use serde_json::Value;

use super::TestEnv;

/// Builder for test users. The first user created in an empty base becomes
/// the super-user; tests that need ordinary users create a throwaway first.
pub struct UserBuilder {
    username: String,
    email: Option<String>,
    password: String,
    is_active: Option<bool>,
    roles: Vec<String>,
    data: serde_json::Map<String, Value>,
}

impl UserBuilder {
    pub fn new(username: &str) -> Self {
        Self {
            username: username.to_string(),
            email: None,
            password: "password123".to_string(),
            is_active: None,
            roles: Vec::new(),
            data: serde_json::Map::new(),
        }
    }

    pub fn with_password(mut self, password: &str) -> Self {
        self.password = password.to_string();
        self
    }

    pub fn with_email(mut self, email: &str) -> Self {
        self.email = Some(email.to_string());
        self
    }

    pub fn with_role(mut self, role_id: &str) -> Self {
        self.roles.push(role_id.to_string());
        self
    }

    pub fn with_data(mut self, key: &str, value: Value) -> Self {
        self.data.insert(key.to_string(), value);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.is_active = Some(false);
        self
    }

    pub async fn create(self, env: &TestEnv) -> User {
        let email = self
            .email
            .unwrap_or_else(|| format!("{}@example.com", self.username));
        let user = env
            .users
            .create(&CreateUserRequest {
                username: self.username,
                email,
                password: self.password,
                is_active: self.is_active,
                data: if self.data.is_empty() {
                    None
                } else {
                    Some(self.data)
                },
            })
            .await
            .expect("Failed to create test user");

        if !self.roles.is_empty() {
            env.users
                .assign_roles(&user.internal_id, &self.roles)
                .await
                .expect("Failed to assign roles");
        }

        env.users
            .get(&user.internal_id)
            .await
            .expect("Failed to reload test user")
    }
}

/// Builder for test roles, created through the role service so hierarchy
/// validation applies.
pub struct RoleBuilder {
    name: String,
    is_active: Option<bool>,
    parent_roles: Vec<String>,
    permissions: Vec<Permission>,
}

impl RoleBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            is_active: None,
            parent_roles: Vec::new(),
            permissions: Vec::new(),
        }
    }

    pub fn with_parent(mut self, role_id: &str) -> Self {
        self.parent_roles.push(role_id.to_string());
        self
    }

    pub fn with_permission(mut self, permission: Permission) -> Self {
        self.permissions.push(permission);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.is_active = Some(false);
        self
    }

    pub async fn create(self, env: &TestEnv) -> Role {
        env.roles
            .create(&CreateRoleRequest {
                name: self.name,
                is_active: self.is_active,
                parent_roles: self.parent_roles,
                permissions: self.permissions,
                data: None,
            })
            .await
            .expect("Failed to create test role")
    }
}

/// Permission rule fixture for the common storage-service shape.
pub fn storage_permission(method: &str, path: &str) -> Permission {
    Permission {
        microservice: "storage".to_string(),
        method: method.to_string(),
        path: path.to_string(),
        ..Default::default()
    }
}

pub fn required(param: &str, value: &str) -> ParamRule {
    ParamRule {
        param: param.to_string(),
        value: value.to_string(),
        ..Default::default()
    }
}

pub fn restricted_any(param: &str, values: &[&str]) -> ParamRule {
    ParamRule {
        param: param.to_string(),
        any_value: values.iter().map(|v| v.to_string()).collect(),
        ..Default::default()
    }
}
