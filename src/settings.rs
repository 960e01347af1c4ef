use std::path::Path;
use std::time::Duration;

use miette::{miette, IntoDiagnostic, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    pub server: Server,
    pub database: Database,
    pub auth: Auth,
    pub auth_providers: AuthProviders,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Server {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Database {
    /// Either "sqlite" or "memory". The memory backend keeps all collections
    /// in process and is intended for development and tests.
    pub backend: String,
    /// SQLx connection string for the sqlite backend, e.g. sqlite://palisade.db?mode=rwc
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Auth {
    /// Access token lifetime, humantime syntax ("15m", "2h").
    pub access_token_ttl: String,
    /// Refresh token lifetime, humantime syntax ("720h").
    pub refresh_token_ttl: String,
    /// bcrypt cost factor for password hashing.
    pub bcrypt_cost: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthProviders {
    #[serde(rename = "sai-auth")]
    pub sai_auth: ProviderConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProviderConfig {
    pub params: ProviderParams,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderParams {
    /// Base URL sibling services use to reach this service's verify endpoint.
    pub auth_service_url: String,
}

impl Default for Server {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for Database {
    fn default() -> Self {
        Self {
            backend: "sqlite".to_string(),
            url: "sqlite://palisade.db?mode=rwc".to_string(),
        }
    }
}

impl Default for Auth {
    fn default() -> Self {
        Self {
            access_token_ttl: "15m".to_string(),
            refresh_token_ttl: "720h".to_string(),
            bcrypt_cost: 10,
        }
    }
}

impl Default for ProviderParams {
    fn default() -> Self {
        Self {
            auth_service_url: "http://localhost:8080".to_string(),
        }
    }
}

impl Settings {
    pub fn load(path: &str) -> Result<Self> {
        let mut builder = config::Config::builder()
            .set_default("server.host", Server::default().host)
            .into_diagnostic()?
            .set_default("server.port", Server::default().port)
            .into_diagnostic()?
            .set_default("database.backend", Database::default().backend)
            .into_diagnostic()?
            .set_default("database.url", Database::default().url)
            .into_diagnostic()?
            .set_default("auth.access_token_ttl", Auth::default().access_token_ttl)
            .into_diagnostic()?
            .set_default("auth.refresh_token_ttl", Auth::default().refresh_token_ttl)
            .into_diagnostic()?
            .set_default("auth.bcrypt_cost", Auth::default().bcrypt_cost)
            .into_diagnostic()?
            .set_default(
                "auth_providers.sai-auth.params.auth_service_url",
                ProviderParams::default().auth_service_url,
            )
            .into_diagnostic()?;

        // Optional file
        if Path::new(path).exists() {
            builder = builder.add_source(config::File::with_name(path));
        }

        // Environment overrides: PALISADE__SERVER__PORT=9090, etc.
        builder = builder.add_source(config::Environment::with_prefix("PALISADE").separator("__"));

        let cfg = builder.build().into_diagnostic()?;
        let s: Settings = cfg.try_deserialize().into_diagnostic()?;

        // Fail fast on malformed durations instead of at first token issue.
        s.access_token_ttl()?;
        s.refresh_token_ttl()?;

        Ok(s)
    }

    pub fn access_token_ttl(&self) -> Result<Duration> {
        humantime::parse_duration(&self.auth.access_token_ttl)
            .map_err(|e| miette!("invalid auth.access_token_ttl: {e}"))
    }

    pub fn refresh_token_ttl(&self) -> Result<Duration> {
        humantime::parse_duration(&self.auth.refresh_token_ttl)
            .map_err(|e| miette!("invalid auth.refresh_token_ttl: {e}"))
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_parse() {
        let s = Settings::default();
        assert_eq!(s.access_token_ttl().unwrap(), Duration::from_secs(15 * 60));
        assert_eq!(
            s.refresh_token_ttl().unwrap(),
            Duration::from_secs(720 * 3600)
        );
        assert_eq!(s.auth.bcrypt_cost, 10);
    }

    #[test]
    fn load_without_file_uses_defaults() {
        let s = Settings::load("does-not-exist.toml").unwrap();
        assert_eq!(s.server.port, 8080);
        assert_eq!(s.database.backend, "sqlite");
        assert_eq!(
            s.auth_providers.sai_auth.params.auth_service_url,
            "http://localhost:8080"
        );
    }
}
