//! Inheritance resolution and rule merging.

use std::collections::{HashMap, HashSet};

use crate::errors::AuthError;
use crate::models::{CompiledPermission, ParamRule, Permission, Role, User};
use crate::permissions::placeholder;
use crate::permissions::MAX_ROLE_DEPTH;
use crate::store::RoleStore;

/// Compiles the effective permission set for a user: one entry per distinct
/// `(microservice, method, path)` triple across the transitive active-role
/// closure, parents contributing before children.
pub async fn compile(
    store: &dyn RoleStore,
    user: &User,
) -> Result<Vec<CompiledPermission>, AuthError> {
    if user.roles.is_empty() {
        return Ok(Vec::new());
    }

    let roles = collect_roles(store, &user.roles).await?;

    let mut compiled: Vec<CompiledPermission> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for role in &roles {
        for permission in &role.permissions {
            let key = CompiledPermission::key_of(permission);
            match index.get(&key) {
                Some(&slot) => merge_into(&mut compiled[slot], permission, &role.internal_id, user),
                None => {
                    index.insert(key, compiled.len());
                    compiled.push(compile_permission(permission, &role.internal_id, user));
                }
            }
        }
    }

    Ok(compiled)
}

/// Breadth-first walk of the parent DAG. Each level is fetched as one batch;
/// ids missing from the store are skipped, inactive roles are dropped along
/// with any ancestor reachable only through them, and a level past
/// [`MAX_ROLE_DEPTH`] with roles still unseen is a hard error. The result
/// orders ancestors before descendants so the merge gives parents precedence.
async fn collect_roles(store: &dyn RoleStore, seed: &[String]) -> Result<Vec<Role>, AuthError> {
    let mut visited: HashSet<String> = HashSet::new();
    let mut levels: Vec<Vec<Role>> = Vec::new();

    let mut frontier: Vec<String> = Vec::new();
    for id in seed {
        if visited.insert(id.clone()) {
            frontier.push(id.clone());
        }
    }

    let mut depth = 0usize;
    while !frontier.is_empty() {
        if depth > MAX_ROLE_DEPTH {
            return Err(AuthError::MaxDepthExceeded);
        }

        let fetched = store.get_by_ids(&frontier).await?;
        let by_id: HashMap<&str, &Role> = fetched
            .iter()
            .map(|role| (role.internal_id.as_str(), role))
            .collect();

        let mut level: Vec<Role> = Vec::new();
        let mut next: Vec<String> = Vec::new();
        for id in &frontier {
            // A deleted parent must not break compilation.
            let Some(role) = by_id.get(id.as_str()) else {
                continue;
            };
            if !role.is_active {
                continue;
            }
            for parent in &role.parent_roles {
                if visited.insert(parent.clone()) {
                    next.push(parent.clone());
                }
            }
            level.push((*role).clone());
        }

        levels.push(level);
        frontier = next;
        depth += 1;
    }

    let mut ordered = Vec::new();
    for level in levels.into_iter().rev() {
        ordered.extend(level);
    }
    Ok(ordered)
}

fn compile_permission(permission: &Permission, role_id: &str, user: &User) -> CompiledPermission {
    CompiledPermission {
        microservice: permission.microservice.clone(),
        method: permission.method.clone(),
        path: permission.path.clone(),
        rates: permission.rates.clone(),
        required_params: permission
            .required_params
            .iter()
            .map(|rule| placeholder::resolve_rule(rule, user))
            .collect(),
        restricted_params: permission
            .restricted_params
            .iter()
            .map(|rule| placeholder::resolve_rule(rule, user))
            .collect(),
        inherited_from: vec![role_id.to_string()],
    }
}

fn merge_into(existing: &mut CompiledPermission, incoming: &Permission, role_id: &str, user: &User) {
    existing.inherited_from.push(role_id.to_string());
    existing.rates.extend(incoming.rates.iter().cloned());
    merge_rule_list(&mut existing.required_params, &incoming.required_params, user);
    merge_rule_list(
        &mut existing.restricted_params,
        &incoming.restricted_params,
        user,
    );
}

fn merge_rule_list(existing: &mut Vec<ParamRule>, incoming: &[ParamRule], user: &User) {
    for rule in incoming {
        let resolved = placeholder::resolve_rule(rule, user);
        match existing.iter_mut().find(|e| e.param == rule.param) {
            Some(current) => merge_rules(current, resolved),
            None => existing.push(resolved),
        }
    }
}

/// Merge algebra for two rules on the same parameter. An earlier concrete
/// scalar wins over a later one; "*" and empty are overwritable. Both set
/// shapes union.
fn merge_rules(existing: &mut ParamRule, incoming: ParamRule) {
    if !incoming.value.is_empty() && (existing.value.is_empty() || existing.value == "*") {
        existing.value = incoming.value;
    }
    union_into(&mut existing.any_value, incoming.any_value);
    union_into(&mut existing.all_values, incoming.all_values);
}

fn union_into(base: &mut Vec<String>, extra: Vec<String>) {
    for value in extra {
        if !base.contains(&value) {
            base.push(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Data, Rate};
    use crate::store::{MemoryDocumentStore, Stores};
    use serde_json::json;
    use std::sync::Arc;

    fn user_with_roles(roles: &[&str]) -> User {
        User {
            internal_id: "u7".to_string(),
            username: "ada".to_string(),
            email: "ada@example.com".to_string(),
            is_active: true,
            roles: roles.iter().map(|r| r.to_string()).collect(),
            ..Default::default()
        }
    }

    fn role(id: &str, parents: &[&str], permissions: Vec<Permission>) -> Role {
        Role {
            internal_id: id.to_string(),
            name: format!("role-{id}"),
            is_active: true,
            parent_roles: parents.iter().map(|p| p.to_string()).collect(),
            permissions,
            ..Default::default()
        }
    }

    fn perm(path: &str) -> Permission {
        Permission {
            microservice: "storage".to_string(),
            method: "GET".to_string(),
            path: path.to_string(),
            ..Default::default()
        }
    }

    async fn stores_with(roles: Vec<Role>) -> Stores {
        let stores = Stores::new(Arc::new(MemoryDocumentStore::new()));
        for role in &roles {
            stores.roles.create(role).await.unwrap();
        }
        stores
    }

    #[tokio::test]
    async fn zero_roles_compiles_empty() {
        let stores = stores_with(vec![]).await;
        let compiled = compile(stores.roles.as_ref(), &user_with_roles(&[]))
            .await
            .unwrap();
        assert!(compiled.is_empty());
    }

    #[tokio::test]
    async fn one_entry_per_distinct_triple() {
        let stores = stores_with(vec![
            role("a", &[], vec![perm("/docs"), perm("/files")]),
            role("b", &[], vec![perm("/docs")]),
        ])
        .await;
        let compiled = compile(stores.roles.as_ref(), &user_with_roles(&["a", "b"]))
            .await
            .unwrap();
        assert_eq!(compiled.len(), 2);
        let docs = compiled.iter().find(|p| p.path == "/docs").unwrap();
        assert_eq!(docs.inherited_from, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn cycle_terminates_with_each_role_once() {
        let stores = stores_with(vec![
            role("a", &["b"], vec![perm("/a")]),
            role("b", &["a"], vec![perm("/b")]),
        ])
        .await;
        let compiled = compile(stores.roles.as_ref(), &user_with_roles(&["a"]))
            .await
            .unwrap();
        assert_eq!(compiled.len(), 2);
        for permission in &compiled {
            assert_eq!(permission.inherited_from.len(), 1);
        }
    }

    #[tokio::test]
    async fn depth_beyond_limit_is_fatal() {
        // chain of 7: r0 <- r1 <- ... <- r6
        let mut roles = Vec::new();
        for i in 0..7 {
            let parents: Vec<String> = if i < 6 {
                vec![format!("r{}", i + 1)]
            } else {
                vec![]
            };
            let parents: Vec<&str> = parents.iter().map(|s| s.as_str()).collect();
            roles.push(role(&format!("r{i}"), &parents, vec![perm("/x")]));
        }
        let stores = stores_with(roles).await;
        let err = compile(stores.roles.as_ref(), &user_with_roles(&["r0"]))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::MaxDepthExceeded));
    }

    #[tokio::test]
    async fn depth_at_limit_is_fine() {
        let mut roles = Vec::new();
        for i in 0..6 {
            let parents: Vec<String> = if i < 5 {
                vec![format!("r{}", i + 1)]
            } else {
                vec![]
            };
            let parents: Vec<&str> = parents.iter().map(|s| s.as_str()).collect();
            roles.push(role(&format!("r{i}"), &parents, vec![perm(&format!("/p{i}"))]));
        }
        let stores = stores_with(roles).await;
        let compiled = compile(stores.roles.as_ref(), &user_with_roles(&["r0"]))
            .await
            .unwrap();
        assert_eq!(compiled.len(), 6);
    }

    #[tokio::test]
    async fn missing_parent_is_skipped() {
        let stores = stores_with(vec![role("a", &["ghost"], vec![perm("/a")])]).await;
        let compiled = compile(stores.roles.as_ref(), &user_with_roles(&["a"]))
            .await
            .unwrap();
        assert_eq!(compiled.len(), 1);
    }

    #[tokio::test]
    async fn inactive_role_prunes_its_exclusive_ancestors() {
        let mut inactive = role("mid", &["top"], vec![perm("/mid")]);
        inactive.is_active = false;
        let stores = stores_with(vec![
            role("leaf", &["mid"], vec![perm("/leaf")]),
            inactive,
            role("top", &[], vec![perm("/top")]),
        ])
        .await;
        let compiled = compile(stores.roles.as_ref(), &user_with_roles(&["leaf"]))
            .await
            .unwrap();
        let paths: Vec<&str> = compiled.iter().map(|p| p.path.as_str()).collect();
        assert_eq!(paths, vec!["/leaf"]);
    }

    #[tokio::test]
    async fn parent_scalar_wins_merge() {
        let mut child_perm = perm("/docs");
        child_perm.required_params.push(ParamRule {
            param: "owner_id".to_string(),
            value: "child".to_string(),
            ..Default::default()
        });
        let mut parent_perm = perm("/docs");
        parent_perm.required_params.push(ParamRule {
            param: "owner_id".to_string(),
            value: "parent".to_string(),
            ..Default::default()
        });
        let stores = stores_with(vec![
            role("child", &["parent"], vec![child_perm]),
            role("parent", &[], vec![parent_perm]),
        ])
        .await;
        let compiled = compile(stores.roles.as_ref(), &user_with_roles(&["child"]))
            .await
            .unwrap();
        assert_eq!(compiled.len(), 1);
        assert_eq!(compiled[0].required_params[0].value, "parent");
        assert_eq!(compiled[0].inherited_from, vec!["parent", "child"]);
    }

    #[tokio::test]
    async fn wildcard_scalar_is_overwritten() {
        let mut parent_perm = perm("/docs");
        parent_perm.required_params.push(ParamRule {
            param: "tag".to_string(),
            value: "*".to_string(),
            ..Default::default()
        });
        let mut child_perm = perm("/docs");
        child_perm.required_params.push(ParamRule {
            param: "tag".to_string(),
            value: "public".to_string(),
            ..Default::default()
        });
        let stores = stores_with(vec![
            role("child", &["parent"], vec![child_perm]),
            role("parent", &[], vec![parent_perm]),
        ])
        .await;
        let compiled = compile(stores.roles.as_ref(), &user_with_roles(&["child"]))
            .await
            .unwrap();
        assert_eq!(compiled[0].required_params[0].value, "public");
    }

    #[tokio::test]
    async fn set_shapes_union_and_rates_concatenate() {
        let mut first = perm("/docs");
        first.rates.push(Rate { limit: 10, window: 60 });
        first.restricted_params.push(ParamRule {
            param: "status".to_string(),
            any_value: vec!["deleted".to_string()],
            ..Default::default()
        });
        let mut second = perm("/docs");
        second.rates.push(Rate { limit: 100, window: 3600 });
        second.restricted_params.push(ParamRule {
            param: "status".to_string(),
            any_value: vec!["archived".to_string(), "deleted".to_string()],
            ..Default::default()
        });
        let stores = stores_with(vec![
            role("a", &[], vec![first]),
            role("b", &[], vec![second]),
        ])
        .await;
        let compiled = compile(stores.roles.as_ref(), &user_with_roles(&["a", "b"]))
            .await
            .unwrap();
        assert_eq!(compiled.len(), 1);
        assert_eq!(compiled[0].rates.len(), 2);
        assert_eq!(
            compiled[0].restricted_params[0].any_value,
            vec!["deleted", "archived"]
        );
    }

    #[tokio::test]
    async fn placeholders_resolve_against_user() {
        let mut permission = perm("/docs");
        permission.required_params.push(ParamRule {
            param: "owner_id".to_string(),
            value: "$.internal_id".to_string(),
            ..Default::default()
        });
        permission.required_params.push(ParamRule {
            param: "tenant".to_string(),
            any_value: vec!["$.data.tenants".to_string(), "shared".to_string()],
            ..Default::default()
        });
        let stores = stores_with(vec![role("a", &[], vec![permission])]).await;

        let mut user = user_with_roles(&["a"]);
        let mut data = Data::new();
        data.insert("tenants".to_string(), json!(["t1", "t2"]));
        user.data = data;

        let compiled = compile(stores.roles.as_ref(), &user).await.unwrap();
        let required = &compiled[0].required_params;
        assert_eq!(required[0].value, "u7");
        assert_eq!(required[1].any_value, vec!["t1", "t2", "shared"]);
    }
}
