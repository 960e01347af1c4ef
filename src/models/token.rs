use serde::{Deserialize, Serialize};

use crate::models::{CompiledPermission, Data, User};

/// Persistent token record. Expiries are absolute nanoseconds since epoch;
/// the access/refresh strings are 32 random bytes rendered as 64 hex chars.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Token {
    #[serde(default)]
    pub internal_id: String,
    pub user_id: String,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: i64,
    pub refresh_expires_at: i64,
    #[serde(default)]
    pub compiled_permissions: Vec<CompiledPermission>,
    #[serde(default)]
    pub cr_time: i64,
    #[serde(default)]
    pub ch_time: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    /// Seconds until the access token expires.
    pub expires_in: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub user: User,
    pub tokens: TokenResponse,
    pub permissions: Vec<CompiledPermission>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyRequest {
    pub token: String,
    pub microservice: String,
    pub method: String,
    pub path: String,
    #[serde(default)]
    pub request_params: Data,
}

/// Authorization decision. `evaluate` never raises; every deny is expressed
/// here with a reason and, where applicable, the violated rule.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VerifyResponse {
    pub allowed: bool,
    #[serde(default)]
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_params: Option<Data>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,
    #[serde(
        default,
        rename = "violated_restriction",
        skip_serializing_if = "Option::is_none"
    )]
    pub violated_rule: Option<ViolatedRule>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViolatedRule {
    pub param: String,
    pub attempted_value: String,
    /// "required_params" or "restricted_params".
    pub rule_type: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TestPermissionsRequest {
    pub user_id: String,
    pub microservice: String,
    pub method: String,
    pub path: String,
    #[serde(default)]
    pub test_params: Data,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserInfoResponse {
    pub user: User,
    pub permissions: Vec<CompiledPermission>,
}
