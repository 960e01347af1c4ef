//! Rate-limit adapter. Rate rules are data attached to permissions; the
//! engine surfaces them in `modified_params["rates"]` and this adapter
//! enforces them against a store keyed by user and rule. The in-memory
//! fixed-window store suffices for one process; a shared backend slots in
//! behind the same trait.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::models::{Data, Rate};

#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Counts one hit; false means the rule's limit is exhausted for the
    /// current window.
    async fn check(&self, user_id: &str, rate: &Rate) -> bool;
}

#[derive(Default)]
pub struct MemoryRateLimitStore {
    windows: Mutex<HashMap<(String, i64, u64), Window>>,
}

struct Window {
    started_at: i64,
    count: i64,
}

impl MemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RateLimitStore for MemoryRateLimitStore {
    async fn check(&self, user_id: &str, rate: &Rate) -> bool {
        if rate.limit <= 0 || rate.window == 0 {
            return true;
        }
        let now = Utc::now().timestamp();
        let key = (user_id.to_string(), rate.limit, rate.window);

        let mut windows = match self.windows.lock() {
            Ok(windows) => windows,
            Err(poisoned) => poisoned.into_inner(),
        };
        let window = windows.entry(key).or_insert(Window {
            started_at: now,
            count: 0,
        });
        if now - window.started_at >= rate.window as i64 {
            window.started_at = now;
            window.count = 0;
        }
        window.count += 1;
        window.count <= rate.limit
    }
}

/// Rate rules surfaced by the engine in a decision's modified params.
pub fn rates_from_params(params: &Data) -> Vec<Rate> {
    params
        .get("rates")
        .and_then(|value| serde_json::from_value(value.clone()).ok())
        .unwrap_or_default()
}

/// Checks every surfaced rule; the first exhausted one loses.
pub async fn enforce(store: &dyn RateLimitStore, user_id: &str, params: &Data) -> bool {
    for rate in rates_from_params(params) {
        if !store.check(user_id, &rate).await {
            return false;
        }
    }
    true
}
