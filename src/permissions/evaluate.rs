//! Request evaluation against a compiled permission list.

use serde_json::Value;

use crate::models::{CompiledPermission, Data, MatchShape, ParamRule, VerifyResponse, ViolatedRule};

/// Scans the compiled list in order; the first match wins and its parameter
/// rules decide the outcome. No permission matching the triple is a deny.
pub fn evaluate(
    permissions: &[CompiledPermission],
    microservice: &str,
    method: &str,
    path: &str,
    request_params: &Data,
) -> VerifyResponse {
    let matched = permissions.iter().find(|permission| {
        permission.microservice == microservice
            && permission.method == method
            && match_path(&permission.path, path)
    });

    let Some(matched) = matched else {
        return VerifyResponse {
            allowed: false,
            reason: format!("No permission found for {microservice} {method} {path}"),
            ..Default::default()
        };
    };

    // Restrictions first: a present parameter hitting a restriction denies
    // regardless of requirements.
    for restriction in &matched.restricted_params {
        if let Some(value) = request_params.get(&restriction.param) {
            if is_restricted(value, restriction) {
                return VerifyResponse {
                    allowed: false,
                    reason: format!(
                        "Access denied to {} '{}'",
                        restriction.param,
                        render(value)
                    ),
                    violated_rule: Some(ViolatedRule {
                        param: restriction.param.clone(),
                        attempted_value: render(value),
                        rule_type: "restricted_params".to_string(),
                    }),
                    ..Default::default()
                };
            }
        }
    }

    let mut modified = request_params.clone();
    for requirement in &matched.required_params {
        match request_params.get(&requirement.param) {
            Some(value) => {
                if !satisfies_requirement(value, requirement) {
                    return VerifyResponse {
                        allowed: false,
                        reason: format!(
                            "Parameter {} does not satisfy requirements",
                            requirement.param
                        ),
                        violated_rule: Some(ViolatedRule {
                            param: requirement.param.clone(),
                            attempted_value: render(value),
                            rule_type: "required_params".to_string(),
                        }),
                        ..Default::default()
                    };
                }
            }
            // Absent: a concrete scalar requirement is auto-filled; "*",
            // set-shaped and empty rules accept absence untouched.
            None => {
                if let MatchShape::Equal(value) = requirement.shape() {
                    modified.insert(
                        requirement.param.clone(),
                        Value::String(value.to_string()),
                    );
                }
            }
        }
    }

    // Surface rate rules for the rate-limit adapter; the engine does not
    // enforce them.
    if !matched.rates.is_empty() {
        if let Ok(rates) = serde_json::to_value(&matched.rates) {
            modified.insert("rates".to_string(), rates);
        }
    }

    VerifyResponse {
        allowed: true,
        modified_params: Some(modified),
        ..Default::default()
    }
}

/// Path patterns match exactly, or by prefix when ending in `/*` or `*`.
/// Wildcards never appear mid-path.
fn match_path(pattern: &str, path: &str) -> bool {
    if pattern == path {
        return true;
    }
    if let Some(prefix) = pattern.strip_suffix("/*") {
        return path.starts_with(prefix);
    }
    if let Some(prefix) = pattern.strip_suffix('*') {
        return path.starts_with(prefix);
    }
    false
}

fn is_restricted(value: &Value, restriction: &ParamRule) -> bool {
    match restriction.shape() {
        MatchShape::Unconstrained => false,
        // The star only short-circuits requirements; on the restriction side
        // it is an ordinary literal, so a request value of exactly "*" hits.
        MatchShape::Any => render(value) == "*",
        MatchShape::Equal(restricted) => render(value) == restricted,
        MatchShape::AnyOf(set) => {
            let rendered = render(value);
            set.iter().any(|entry| *entry == rendered)
        }
        MatchShape::AllOf(set) => value
            .as_array()
            .map(|items| items.iter().any(|item| set.contains(&render(item))))
            .unwrap_or(false),
    }
}

fn satisfies_requirement(value: &Value, requirement: &ParamRule) -> bool {
    match requirement.shape() {
        MatchShape::Any | MatchShape::Unconstrained => true,
        MatchShape::Equal(required) => render(value) == required,
        MatchShape::AnyOf(set) => {
            let rendered = render(value);
            set.iter().any(|entry| *entry == rendered)
        }
        MatchShape::AllOf(set) => value
            .as_array()
            .map(|items| {
                let rendered: Vec<String> = items.iter().map(render).collect();
                set.iter().all(|required| rendered.contains(required))
            })
            .unwrap_or(false),
    }
}

/// String form used for rule comparison: strings verbatim, everything else
/// via its JSON rendering.
fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
