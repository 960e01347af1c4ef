pub mod builders;

use std::sync::Arc;
use std::time::Duration;

use palisade::auth::AuthService;
use palisade::permissions::PermissionEngine;
use palisade::ratelimit::MemoryRateLimitStore;
use palisade::roles::RoleService;
use palisade::settings::Settings;
use palisade::store::{MemoryDocumentStore, Stores};
use palisade::tokens::TokenManager;
use palisade::users::UserService;
use palisade::web::AppState;

/// Lowest cost bcrypt accepts; keeps the suite fast.
pub const TEST_BCRYPT_COST: u32 = 4;

/// Fully wired service stack over the in-memory backend.
pub struct TestEnv {
    pub stores: Stores,
    pub tokens: TokenManager,
    pub engine: PermissionEngine,
    pub auth: AuthService,
    pub users: UserService,
    pub roles: RoleService,
}

pub fn test_env() -> TestEnv {
    test_env_with_ttls(Duration::from_secs(900), Duration::from_secs(3600))
}

pub fn test_env_with_ttls(access_ttl: Duration, refresh_ttl: Duration) -> TestEnv {
    let stores = Stores::new(Arc::new(MemoryDocumentStore::new()));
    let tokens = TokenManager::new(stores.tokens.clone(), access_ttl, refresh_ttl);
    let engine = PermissionEngine::new(stores.roles.clone());
    let auth = AuthService::new(stores.users.clone(), tokens.clone(), engine.clone());
    let users = UserService::new(
        stores.users.clone(),
        tokens.clone(),
        engine.clone(),
        TEST_BCRYPT_COST,
    );
    let roles = RoleService::new(
        stores.roles.clone(),
        stores.users.clone(),
        engine.clone(),
        users.clone(),
    );
    TestEnv {
        stores,
        tokens,
        engine,
        auth,
        users,
        roles,
    }
}

pub fn app_state(env: &TestEnv) -> AppState {
    AppState {
        settings: Arc::new(Settings::default()),
        auth: env.auth.clone(),
        users: env.users.clone(),
        roles: env.roles.clone(),
        rate_limits: Arc::new(MemoryRateLimitStore::new()),
    }
}
