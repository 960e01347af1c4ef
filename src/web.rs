//! HTTP surface. All routes live under /api/v1; management endpoints sit
//! behind an auth layer that resolves the caller's access token. Token
//! transport is `Authorization: Token <hex>` or `Bearer <hex>`.

use std::sync::Arc;

use axum::extract::{Query, Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use miette::IntoDiagnostic;
use serde::Deserialize;
use serde_json::json;

use crate::auth::AuthService;
use crate::errors::AuthError;
use crate::models::{
    CreateRoleRequest, CreateUserRequest, LoginRequest, RefreshTokenRequest,
    TestPermissionsRequest, VerifyRequest,
};
use crate::ratelimit::{self, RateLimitStore};
use crate::roles::RoleService;
use crate::settings::Settings;
use crate::store::{Document, RoleFilter, StoreError, UserFilter};
use crate::users::UserService;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub auth: AuthService,
    pub users: UserService,
    pub roles: RoleService,
    pub rate_limits: Arc<dyn RateLimitStore>,
}

pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    fn validation(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "validation_error", message)
    }

    fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(json!({ "error": self.code, "message": self.message })),
        )
            .into_response()
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match &err {
            AuthError::InvalidCredentials => {
                Self::new(StatusCode::UNAUTHORIZED, "invalid_credentials", err.to_string())
            }
            AuthError::InvalidToken => {
                Self::new(StatusCode::UNAUTHORIZED, "invalid_token", err.to_string())
            }
            AuthError::NotFound(_) | AuthError::Store(StoreError::NotFound) => {
                Self::new(StatusCode::NOT_FOUND, "not_found", err.to_string())
            }
            AuthError::Conflict(_) | AuthError::Store(StoreError::Conflict(_)) => {
                Self::new(StatusCode::CONFLICT, "conflict", err.to_string())
            }
            AuthError::Validation(_) => {
                Self::new(StatusCode::BAD_REQUEST, "validation_error", err.to_string())
            }
            _ => {
                tracing::error!(error = %err, "internal error");
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal",
                    "internal error",
                )
            }
        }
    }
}

fn extract_token(headers: &HeaderMap) -> Option<String> {
    let header = headers.get(axum::http::header::AUTHORIZATION)?.to_str().ok()?;
    if let Some(token) = header.strip_prefix("Token ") {
        return Some(token.to_string());
    }
    if let Some(token) = header.strip_prefix("Bearer ") {
        return Some(token.to_string());
    }
    None
}

async fn require_auth(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_token(request.headers())
        .ok_or_else(|| ApiError::unauthorized("Authorization token required"))?;
    state
        .auth
        .authenticate(&token)
        .await
        .map_err(|_| ApiError::unauthorized("Invalid or expired token"))?;
    Ok(next.run(request).await)
}

pub fn router(state: AppState) -> Router {
    let public = Router::new()
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh_token))
        .route("/auth/logout", post(logout))
        .route("/auth/verify", post(verify));

    let protected = Router::new()
        .route("/auth/me", get(me))
        .route(
            "/users",
            get(list_users)
                .post(create_user)
                .put(update_users)
                .delete(delete_users),
        )
        .route("/users/assign-roles", post(assign_roles))
        .route("/users/remove-roles", post(remove_roles))
        .route(
            "/roles",
            get(list_roles)
                .post(create_role)
                .put(update_roles)
                .delete(delete_roles),
        )
        .route(
            "/roles/permissions",
            get(role_permissions).post(test_permissions),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .nest("/api/v1", public.merge(protected))
        .with_state(state)
}

pub async fn serve(state: AppState) -> miette::Result<()> {
    let addr = state.settings.bind_addr();
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(&addr).await.into_diagnostic()?;
    tracing::info!(%addr, "palisade listening");
    axum::serve(listener, app).await.into_diagnostic()?;
    Ok(())
}

// Authentication

async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Response, ApiError> {
    if req.user.is_empty() || req.password.is_empty() {
        return Err(ApiError::validation("User and password are required"));
    }
    let response = state.auth.login(&req).await?;
    Ok(Json(response).into_response())
}

async fn refresh_token(
    State(state): State<AppState>,
    Json(req): Json<RefreshTokenRequest>,
) -> Result<Response, ApiError> {
    if req.refresh_token.is_empty() {
        return Err(ApiError::validation("Refresh token is required"));
    }
    let response = state.auth.refresh(&req.refresh_token).await?;
    Ok(Json(response).into_response())
}

async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Result<Response, ApiError> {
    let token = extract_token(&headers)
        .ok_or_else(|| ApiError::unauthorized("Authorization token required"))?;
    state.auth.logout(&token).await?;
    Ok(Json(json!({ "message": "Logged out successfully" })).into_response())
}

async fn me(State(state): State<AppState>, headers: HeaderMap) -> Result<Response, ApiError> {
    let token = extract_token(&headers)
        .ok_or_else(|| ApiError::unauthorized("Authorization token required"))?;
    let response = state.auth.user_info(&token).await?;
    Ok(Json(response).into_response())
}

async fn verify(
    State(state): State<AppState>,
    Json(req): Json<VerifyRequest>,
) -> Result<Response, ApiError> {
    if req.microservice.is_empty() || req.method.is_empty() || req.path.is_empty() {
        return Err(ApiError::validation(
            "Microservice, method, and path are required",
        ));
    }

    let decision = state.auth.verify(&req).await?;

    if !decision.allowed {
        tracing::warn!(
            microservice = %req.microservice,
            method = %req.method,
            path = %req.path,
            reason = %decision.reason,
            "verify denied"
        );
        return Ok((StatusCode::FORBIDDEN, Json(decision)).into_response());
    }

    if let Some(params) = &decision.modified_params {
        if !ratelimit::enforce(state.rate_limits.as_ref(), &decision.user_id, params).await {
            tracing::warn!(user_id = %decision.user_id, "rate limit exceeded");
            return Err(ApiError::new(
                StatusCode::TOO_MANY_REQUESTS,
                "rate_limited",
                "Rate limit exceeded",
            ));
        }
    }

    Ok(Json(decision).into_response())
}

async fn test_permissions(
    State(state): State<AppState>,
    Json(req): Json<TestPermissionsRequest>,
) -> Result<Response, ApiError> {
    if req.user_id.is_empty()
        || req.microservice.is_empty()
        || req.method.is_empty()
        || req.path.is_empty()
    {
        return Err(ApiError::validation(
            "UserID, microservice, method, and path are required",
        ));
    }
    let decision = state.auth.test_permissions(&req).await?;
    Ok(Json(decision).into_response())
}

// Users

#[derive(Debug, Deserialize)]
struct UserListParams {
    page: Option<u64>,
    limit: Option<u64>,
    search: Option<String>,
    role: Option<String>,
    active: Option<bool>,
    internal_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UpdateBody {
    filter: Document,
    data: Document,
}

#[derive(Debug, Deserialize)]
struct DeleteBody {
    filter: Document,
}

#[derive(Debug, Deserialize)]
struct UserIdParam {
    user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RoleIdsBody {
    role_ids: Vec<String>,
}

fn paginated(data: impl serde::Serialize, page: u64, limit: u64, total: u64) -> Response {
    let total_pages = total.div_ceil(limit.max(1));
    Json(json!({
        "data": data,
        "page": page,
        "limit": limit,
        "total": total,
        "total_pages": total_pages,
    }))
    .into_response()
}

fn clamp_page(page: Option<u64>, limit: Option<u64>) -> (u64, u64) {
    let page = page.unwrap_or(1).max(1);
    let limit = limit.unwrap_or(20).clamp(1, 100);
    (page, limit)
}

async fn list_users(
    State(state): State<AppState>,
    Query(params): Query<UserListParams>,
) -> Result<Response, ApiError> {
    if let Some(internal_id) = &params.internal_id {
        let user = state.users.get(internal_id).await?;
        return Ok(Json(vec![user]).into_response());
    }

    let (page, limit) = clamp_page(params.page, params.limit);
    let filter = UserFilter {
        page,
        limit,
        search: params.search,
        role: params.role,
        active: params.active,
    };
    let (users, total) = state.users.list(&filter).await?;
    Ok(paginated(users, page, limit, total))
}

async fn create_user(
    State(state): State<AppState>,
    Json(req): Json<CreateUserRequest>,
) -> Result<Response, ApiError> {
    if req.username.is_empty() || req.email.is_empty() || req.password.is_empty() {
        return Err(ApiError::validation(
            "Username, email, and password are required",
        ));
    }
    let user = state.users.create(&req).await?;
    Ok(Json(json!({ "data": user, "created": 1 })).into_response())
}

async fn update_users(
    State(state): State<AppState>,
    Json(req): Json<UpdateBody>,
) -> Result<Response, ApiError> {
    if req.filter.is_empty() {
        return Err(ApiError::validation("Filter is required"));
    }
    let updated = state.users.update(&req.filter, &req.data).await?;
    Ok(Json(json!({ "updated": updated })).into_response())
}

async fn delete_users(
    State(state): State<AppState>,
    Json(req): Json<DeleteBody>,
) -> Result<Response, ApiError> {
    if req.filter.is_empty() {
        return Err(ApiError::validation("Filter is required"));
    }
    let deleted = state.users.delete(&req.filter).await?;
    Ok(Json(json!({ "deleted": deleted })).into_response())
}

async fn assign_roles(
    State(state): State<AppState>,
    Query(params): Query<UserIdParam>,
    Json(req): Json<RoleIdsBody>,
) -> Result<Response, ApiError> {
    let user_id = params
        .user_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::validation("user_id is required"))?;
    state.users.assign_roles(&user_id, &req.role_ids).await?;
    Ok(Json(json!({ "message": "Roles assigned successfully" })).into_response())
}

async fn remove_roles(
    State(state): State<AppState>,
    Query(params): Query<UserIdParam>,
    Json(req): Json<RoleIdsBody>,
) -> Result<Response, ApiError> {
    let user_id = params
        .user_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::validation("user_id is required"))?;
    state.users.remove_roles(&user_id, &req.role_ids).await?;
    Ok(Json(json!({ "message": "Roles removed successfully" })).into_response())
}

// Roles

#[derive(Debug, Deserialize)]
struct RoleListParams {
    page: Option<u64>,
    limit: Option<u64>,
    search: Option<String>,
    active: Option<bool>,
    internal_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RoleIdParam {
    role_id: Option<String>,
}

async fn list_roles(
    State(state): State<AppState>,
    Query(params): Query<RoleListParams>,
) -> Result<Response, ApiError> {
    if let Some(internal_id) = &params.internal_id {
        let role = state.roles.get(internal_id).await?;
        return Ok(Json(vec![role]).into_response());
    }

    let (page, limit) = clamp_page(params.page, params.limit);
    let filter = RoleFilter {
        page,
        limit,
        search: params.search,
        active: params.active,
    };
    let (roles, total) = state.roles.list(&filter).await?;
    Ok(paginated(roles, page, limit, total))
}

async fn create_role(
    State(state): State<AppState>,
    Json(req): Json<CreateRoleRequest>,
) -> Result<Response, ApiError> {
    if req.name.is_empty() {
        return Err(ApiError::validation("Name is required"));
    }
    let role = state.roles.create(&req).await?;
    Ok(Json(json!({ "data": role, "created": 1 })).into_response())
}

async fn update_roles(
    State(state): State<AppState>,
    Json(req): Json<UpdateBody>,
) -> Result<Response, ApiError> {
    if req.filter.is_empty() {
        return Err(ApiError::validation("Filter is required"));
    }
    let updated = state.roles.update(&req.filter, &req.data).await?;
    Ok(Json(json!({ "updated": updated })).into_response())
}

async fn delete_roles(
    State(state): State<AppState>,
    Json(req): Json<DeleteBody>,
) -> Result<Response, ApiError> {
    if req.filter.is_empty() {
        return Err(ApiError::validation("Filter is required"));
    }
    let deleted = state.roles.delete(&req.filter).await?;
    Ok(Json(json!({ "deleted": deleted })).into_response())
}

async fn role_permissions(
    State(state): State<AppState>,
    Query(params): Query<RoleIdParam>,
) -> Result<Response, ApiError> {
    let role_id = params
        .role_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::validation("role_id is required"))?;
    let response = state.roles.role_permissions(&role_id).await?;
    Ok(Json(response).into_response())
}
