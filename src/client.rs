//! Outbound client for sibling services. A service embeds this to ask "may
//! the caller behind this token invoke me?" and to authenticate its own
//! outgoing calls with a cached service token.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::errors::AuthError;
use crate::models::{Data, VerifyResponse};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const SERVICE_TOKEN_TTL: Duration = Duration::from_secs(3600);

pub struct AuthClient {
    /// Name this service reports as the `microservice` of verify requests.
    microservice: String,
    base_url: String,
    http: reqwest::Client,
    cached: Mutex<Option<CachedToken>>,
}

struct CachedToken {
    token: String,
    expires_at: Instant,
}

#[derive(Serialize)]
struct VerifyBody<'a> {
    token: &'a str,
    microservice: &'a str,
    method: &'a str,
    path: &'a str,
    request_params: &'a Data,
}

#[derive(Deserialize)]
struct LoginReply {
    tokens: LoginTokens,
}

#[derive(Deserialize)]
struct LoginTokens {
    access_token: String,
}

impl AuthClient {
    pub fn new(microservice: &str, base_url: &str) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            microservice: microservice.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
            cached: Mutex::new(None),
        }
    }

    /// Asks the auth service for a decision on an incoming request. A
    /// non-success status is a deny at the transport and reported as an
    /// error; callers fail closed.
    pub async fn verify(
        &self,
        token: &str,
        method: &str,
        path: &str,
        request_params: &Data,
    ) -> Result<VerifyResponse, AuthError> {
        let body = VerifyBody {
            token,
            microservice: &self.microservice,
            method,
            path,
            request_params,
        };
        let response = self
            .http
            .post(format!("{}/api/v1/auth/verify", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| AuthError::Provider(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AuthError::Provider(format!(
                "authorization failed with status {}",
                response.status()
            )));
        }

        response
            .json::<VerifyResponse>()
            .await
            .map_err(|e| AuthError::Provider(e.to_string()))
    }

    /// Access token for this service's own outgoing calls, cached until
    /// shortly before the auth service would rotate it.
    pub async fn service_token(
        &self,
        username: &str,
        password: &str,
    ) -> Result<String, AuthError> {
        let mut cached = self.cached.lock().await;
        if let Some(entry) = cached.as_ref() {
            if entry.expires_at > Instant::now() {
                return Ok(entry.token.clone());
            }
        }

        let token = self.login(username, password).await?;
        *cached = Some(CachedToken {
            token: token.clone(),
            expires_at: Instant::now() + SERVICE_TOKEN_TTL,
        });
        Ok(token)
    }

    async fn login(&self, username: &str, password: &str) -> Result<String, AuthError> {
        let response = self
            .http
            .post(format!("{}/api/v1/auth/login", self.base_url))
            .json(&serde_json::json!({ "user": username, "password": password }))
            .send()
            .await
            .map_err(|e| AuthError::Provider(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AuthError::Provider(format!(
                "authentication failed with status {}",
                response.status()
            )));
        }

        let reply: LoginReply = response
            .json()
            .await
            .map_err(|e| AuthError::Provider(e.to_string()))?;
        if reply.tokens.access_token.is_empty() {
            return Err(AuthError::Provider("no access token in response".to_string()));
        }
        Ok(reply.tokens.access_token)
    }

    /// Header value for authenticated outgoing requests.
    pub fn authorization_header(token: &str) -> String {
        format!("Token {token}")
    }
}
