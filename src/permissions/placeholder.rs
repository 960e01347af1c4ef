//! User-context placeholder substitution.
//!
//! Rules may reference the authenticated user through `$.internal_id` or
//! `$.data.<path>`. Substitution happens once, at compilation; an array (or
//! comma-joined scalar) resolved into a set position expands into multiple
//! entries. Unknown placeholder forms and missing paths resolve to empty.

use serde_json::Value;

use crate::models::{ParamRule, User};

pub fn resolve_rule(rule: &ParamRule, user: &User) -> ParamRule {
    let mut resolved = rule.clone();
    if resolved.value.starts_with("$.") {
        resolved.value = resolve(&resolved.value, user);
    }
    resolved.any_value = expand_values(&rule.any_value, user);
    resolved.all_values = expand_values(&rule.all_values, user);
    resolved
}

fn expand_values(values: &[String], user: &User) -> Vec<String> {
    let mut out = Vec::with_capacity(values.len());
    for value in values {
        if value.starts_with("$.") {
            let resolved = resolve(value, user);
            if resolved.contains(',') {
                out.extend(resolved.split(',').map(str::to_string));
            } else {
                out.push(resolved);
            }
        } else {
            out.push(value.clone());
        }
    }
    out
}

/// Resolves one `$.`-prefixed placeholder to its string form.
pub fn resolve(placeholder: &str, user: &User) -> String {
    let path = match placeholder.strip_prefix("$.") {
        Some(path) => path,
        None => return String::new(),
    };
    let parts: Vec<&str> = path.split('.').collect();

    if parts == ["internal_id"] {
        return user.internal_id.clone();
    }

    if parts.len() >= 2 && parts[0] == "data" {
        let mut current = &user.data;
        for (i, key) in parts[1..].iter().enumerate() {
            let Some(value) = current.get(*key) else {
                return String::new();
            };
            let last = i == parts.len() - 2;
            if last {
                return value_string(value);
            }
            match value {
                Value::Object(map) => current = map,
                _ => return String::new(),
            }
        }
    }

    String::new()
}

/// String form of a user-data value. Arrays join with commas so a set
/// position can expand them back into entries.
fn value_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(value_string)
            .collect::<Vec<_>>()
            .join(","),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Data;
    use serde_json::json;

    fn user() -> User {
        let mut data = Data::new();
        data.insert("team".to_string(), json!("platform"));
        data.insert("regions".to_string(), json!(["eu", "us"]));
        data.insert("joined".to_string(), json!("a,b"));
        data.insert("org".to_string(), json!({"unit": "infra"}));
        User {
            internal_id: "u7".to_string(),
            data,
            ..Default::default()
        }
    }

    #[test]
    fn internal_id_resolves() {
        assert_eq!(resolve("$.internal_id", &user()), "u7");
    }

    #[test]
    fn internal_id_with_trailing_path_is_empty() {
        assert_eq!(resolve("$.internal_id.x", &user()), "");
    }

    #[test]
    fn data_scalar_resolves() {
        assert_eq!(resolve("$.data.team", &user()), "platform");
    }

    #[test]
    fn data_nested_resolves() {
        assert_eq!(resolve("$.data.org.unit", &user()), "infra");
    }

    #[test]
    fn missing_key_resolves_empty() {
        assert_eq!(resolve("$.data.nope", &user()), "");
        assert_eq!(resolve("$.data.team.deeper", &user()), "");
        assert_eq!(resolve("$.something_else", &user()), "");
    }

    #[test]
    fn array_joins_with_commas() {
        assert_eq!(resolve("$.data.regions", &user()), "eu,us");
    }

    #[test]
    fn set_positions_expand_arrays_and_comma_scalars() {
        let rule = ParamRule {
            param: "region".to_string(),
            any_value: vec![
                "$.data.regions".to_string(),
                "apac".to_string(),
                "$.data.joined".to_string(),
            ],
            ..Default::default()
        };
        let resolved = resolve_rule(&rule, &user());
        assert_eq!(resolved.any_value, vec!["eu", "us", "apac", "a", "b"]);
    }

    #[test]
    fn scalar_value_resolves_in_place() {
        let rule = ParamRule {
            param: "owner".to_string(),
            value: "$.internal_id".to_string(),
            ..Default::default()
        };
        assert_eq!(resolve_rule(&rule, &user()).value, "u7");
    }
}
