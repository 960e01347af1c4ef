use serde::{Deserialize, Serialize};

use crate::models::Data;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(default)]
    pub internal_id: String,
    pub username: String,
    pub email: String,
    /// Blanked before a user ever leaves the service.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub password_hash: String,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub is_super_user: bool,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub data: Data,
    #[serde(default)]
    pub cr_time: i64,
    #[serde(default)]
    pub ch_time: i64,
}

impl User {
    /// Copy safe to hand to callers: same record without the password hash.
    pub fn sanitized(&self) -> Self {
        let mut user = self.clone();
        user.password_hash = String::new();
        user
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub is_active: Option<bool>,
    #[serde(default)]
    pub data: Option<Data>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub user: String,
    pub password: String,
    #[serde(default)]
    pub renew: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}
