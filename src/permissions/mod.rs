//! Permission compilation and evaluation.
//!
//! Compilation walks the role inheritance DAG for a user, merges every
//! reachable active role's permission rules into one flattened list and
//! resolves user-context placeholders. Evaluation checks a concrete request
//! against a compiled list and never raises: every deny is a structured
//! decision with a reason.

pub mod compile;
pub mod evaluate;
pub mod placeholder;

use std::sync::Arc;

use crate::errors::AuthError;
use crate::models::{CompiledPermission, Data, User, VerifyResponse};
use crate::store::RoleStore;

/// Inheritance chains deeper than this are a configuration error.
pub const MAX_ROLE_DEPTH: usize = 5;

/// Stateless facade over the role store. Compilation is a pure function of
/// the user plus the store contents; evaluation is a pure function of its
/// arguments, so the engine holds no locks and no caches.
#[derive(Clone)]
pub struct PermissionEngine {
    roles: Arc<dyn RoleStore>,
}

impl PermissionEngine {
    pub fn new(roles: Arc<dyn RoleStore>) -> Self {
        Self { roles }
    }

    /// Effective permission set for `user` at this moment.
    pub async fn compile(&self, user: &User) -> Result<Vec<CompiledPermission>, AuthError> {
        compile::compile(self.roles.as_ref(), user).await
    }

    /// Decision for one request against an already-compiled list.
    pub fn evaluate(
        &self,
        permissions: &[CompiledPermission],
        microservice: &str,
        method: &str,
        path: &str,
        request_params: &Data,
    ) -> VerifyResponse {
        evaluate::evaluate(permissions, microservice, method, path, request_params)
    }
}
