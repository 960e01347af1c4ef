pub mod permission;
pub mod role;
pub mod token;
pub mod user;

pub use permission::{CompiledPermission, MatchShape, ParamRule, Permission, Rate};
pub use role::{CreateRoleRequest, Role, RoleInfo, RolePermissionsResponse};
pub use token::{
    AuthResponse, TestPermissionsRequest, Token, TokenResponse, UserInfoResponse, VerifyRequest,
    VerifyResponse, ViolatedRule,
};
pub use user::{CreateUserRequest, LoginRequest, RefreshTokenRequest, User};

/// Free-form JSON object used for user/role data maps and request parameters.
pub type Data = serde_json::Map<String, serde_json::Value>;
