use std::sync::Arc;

use clap::Parser;
use miette::{IntoDiagnostic, Result};
use palisade::*;
use tracing_subscriber::{fmt, EnvFilter};

use palisade::auth::AuthService;
use palisade::permissions::PermissionEngine;
use palisade::ratelimit::MemoryRateLimitStore;
use palisade::roles::RoleService;
use palisade::store::{DocumentStore, MemoryDocumentStore, SqliteDocumentStore, Stores};
use palisade::tokens::TokenManager;
use palisade::users::UserService;
use palisade::web::AppState;

#[derive(Parser, Debug)]
#[command(
    name = "palisade",
    version,
    about = "Authentication and authorization service"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // logging
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();

    // load settings
    let settings = settings::Settings::load(&cli.config)?;
    tracing::info!(?settings, "Loaded configuration");

    // init storage
    let docs: Arc<dyn DocumentStore> = match settings.database.backend.as_str() {
        "memory" => {
            tracing::warn!("memory store selected - state will not survive a restart");
            Arc::new(MemoryDocumentStore::new())
        }
        _ => Arc::new(
            SqliteDocumentStore::connect(&settings.database.url)
                .await
                .into_diagnostic()?,
        ),
    };
    let stores = Stores::new(docs);

    // wire services
    let tokens = TokenManager::new(
        stores.tokens.clone(),
        settings.access_token_ttl()?,
        settings.refresh_token_ttl()?,
    );
    let engine = PermissionEngine::new(stores.roles.clone());
    let auth = AuthService::new(stores.users.clone(), tokens.clone(), engine.clone());
    let users = UserService::new(
        stores.users.clone(),
        tokens.clone(),
        engine.clone(),
        settings.auth.bcrypt_cost,
    );
    let roles = RoleService::new(
        stores.roles.clone(),
        stores.users.clone(),
        engine,
        users.clone(),
    );

    // init and start background maintenance
    let _scheduler = jobs::init_scheduler(tokens).await.into_diagnostic()?;

    let state = AppState {
        settings: Arc::new(settings),
        auth,
        users,
        roles,
        rate_limits: Arc::new(MemoryRateLimitStore::new()),
    };

    web::serve(state).await
}
