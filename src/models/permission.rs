use serde::{Deserialize, Serialize};

/// A single parameter rule attached to a permission, either as a requirement
/// or a restriction. The wire format leaves all three match shapes optional;
/// [`ParamRule::shape`] gives the evaluation dispatch order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParamRule {
    pub param: String,
    /// Scalar value; "*" satisfies any requirement. May hold a `$.`
    /// placeholder until compiled.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub value: String,
    /// Membership set: the request value must equal one of these.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub any_value: Vec<String>,
    /// Containment set: every entry must appear in an array-valued request param.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub all_values: Vec<String>,
}

/// Which of the union-typed match shapes a rule dispatches on. A merged rule
/// may carry several populated fields at once; the order here is the contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchShape<'a> {
    /// `value == "*"`: always satisfied as a requirement. Restrictions give
    /// the star no special meaning and compare it literally.
    Any,
    /// Concrete scalar equality.
    Equal(&'a str),
    /// Any-of membership.
    AnyOf(&'a [String]),
    /// All-of containment (array-valued request params).
    AllOf(&'a [String]),
    /// No shape populated.
    Unconstrained,
}

impl ParamRule {
    pub fn shape(&self) -> MatchShape<'_> {
        if self.value == "*" {
            MatchShape::Any
        } else if !self.value.is_empty() {
            MatchShape::Equal(&self.value)
        } else if !self.any_value.is_empty() {
            MatchShape::AnyOf(&self.any_value)
        } else if !self.all_values.is_empty() {
            MatchShape::AllOf(&self.all_values)
        } else {
            MatchShape::Unconstrained
        }
    }
}

/// Rate limit rule carried on a permission. Enforcement lives in the
/// rate-limit adapter, not the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Rate {
    pub limit: i64,
    /// Window length in seconds.
    pub window: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Permission {
    pub microservice: String,
    pub method: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rates: Vec<Rate>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_params: Vec<ParamRule>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub restricted_params: Vec<ParamRule>,
}

/// Flattened permission after inheritance merge and placeholder resolution,
/// carrying the ids of every role that contributed to it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompiledPermission {
    pub microservice: String,
    pub method: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rates: Vec<Rate>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_params: Vec<ParamRule>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub restricted_params: Vec<ParamRule>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inherited_from: Vec<String>,
}

impl CompiledPermission {
    /// Grouping key for the inheritance merge.
    pub fn key_of(permission: &Permission) -> String {
        format!(
            "{}:{}:{}",
            permission.microservice, permission.method, permission.path
        )
    }
}
