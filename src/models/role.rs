use serde::{Deserialize, Serialize};

use crate::models::{CompiledPermission, Data, Permission};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Role {
    #[serde(default)]
    pub internal_id: String,
    pub name: String,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub parent_roles: Vec<String>,
    #[serde(default)]
    pub permissions: Vec<Permission>,
    #[serde(default)]
    pub data: Data,
    #[serde(default)]
    pub cr_time: i64,
    #[serde(default)]
    pub ch_time: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateRoleRequest {
    pub name: String,
    pub is_active: Option<bool>,
    #[serde(default)]
    pub parent_roles: Vec<String>,
    #[serde(default)]
    pub permissions: Vec<Permission>,
    #[serde(default)]
    pub data: Option<Data>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RolePermissionsResponse {
    pub role: RoleInfo,
    /// Ids of every user currently holding the role.
    pub users: Vec<String>,
    pub permissions: Vec<CompiledPermission>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoleInfo {
    pub internal_id: String,
    pub name: String,
}
