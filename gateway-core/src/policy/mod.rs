//! Access policy engine.
//!
//! A policy is an ordered list of statements evaluated deny-overriding: the
//! request is allowed only when at least one ALLOW statement matches and no
//! DENY statement matches with its condition holding. Evaluation is stateless
//! and side-effect free, so the engine is shared freely across request tasks.
//!
//! The policy shape mirrors a resource policy on a private API: allow every
//! caller, then deny any request whose originating entry point is not the
//! sanctioned one. Requests with no provenance at all fall into the deny
//! branch as well.

use crate::boundary::EndpointId;
use serde::{Deserialize, Serialize};

/// Action name for invoking a gated API route.
pub const ACTION_INVOKE: &str = "invoke";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Effect {
    Allow,
    Deny,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Decision {
    Allow,
    Deny,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Principal {
    Any,
    Named(String),
}

impl Principal {
    fn matches(&self, caller: &str) -> bool {
        match self {
            Principal::Any => true,
            Principal::Named(name) => name == caller,
        }
    }
}

/// Condition predicates attachable to a statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    /// Holds when the request did not arrive through any of the listed entry
    /// points. Absent provenance counts as "not equal", which is what makes
    /// the engine fail closed.
    SourceEndpointNotEquals(Vec<EndpointId>),
}

impl Condition {
    fn holds(&self, ctx: &RequestContext) -> bool {
        match self {
            Condition::SourceEndpointNotEquals(sanctioned) => match &ctx.source_endpoint {
                Some(id) => !sanctioned.contains(id),
                None => true,
            },
        }
    }
}

/// Resource pattern with `*` wildcards. A `*` matches any run of characters,
/// path separators included, so `/*/*/*` covers every stage, method and path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourcePattern(String);

impl ResourcePattern {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self(pattern.into())
    }

    pub fn matches(&self, resource: &str) -> bool {
        wildcard_match(&self.0, resource)
    }
}

impl From<&str> for ResourcePattern {
    fn from(pattern: &str) -> Self {
        Self(pattern.to_string())
    }
}

// Two-pointer wildcard match with backtracking on the last `*`.
fn wildcard_match(pattern: &str, value: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let v: Vec<char> = value.chars().collect();
    let (mut pi, mut vi) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;

    while vi < v.len() {
        if pi < p.len() && (p[pi] == v[vi]) {
            pi += 1;
            vi += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, vi));
            pi += 1;
        } else if let Some((star_pi, star_vi)) = star {
            pi = star_pi + 1;
            vi = star_vi + 1;
            star = Some((star_pi, star_vi + 1));
        } else {
            return false;
        }
    }

    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Statement {
    pub effect: Effect,
    pub principals: Vec<Principal>,
    pub actions: Vec<String>,
    pub resources: Vec<ResourcePattern>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
}

impl Statement {
    pub fn allow(actions: Vec<String>, resources: Vec<ResourcePattern>) -> Self {
        Self {
            effect: Effect::Allow,
            principals: vec![Principal::Any],
            actions,
            resources,
            condition: None,
        }
    }

    pub fn deny(actions: Vec<String>, resources: Vec<ResourcePattern>) -> Self {
        Self {
            effect: Effect::Deny,
            principals: vec![Principal::Any],
            actions,
            resources,
            condition: None,
        }
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    fn matches(&self, ctx: &RequestContext) -> bool {
        self.principals.iter().any(|p| p.matches(&ctx.principal))
            && self.actions.iter().any(|a| a == &ctx.action)
            && self.resources.iter().any(|r| r.matches(&ctx.resource))
            && self.condition.as_ref().map_or(true, |c| c.holds(ctx))
    }
}

/// Everything the engine looks at for one request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub principal: String,
    pub action: String,
    pub resource: String,
    pub source_endpoint: Option<EndpointId>,
}

impl RequestContext {
    /// Context for invoking `method path` on stage `stage`, e.g.
    /// `/prod/GET/stock`, carrying the entry point the request arrived by.
    pub fn invoke(
        stage: &str,
        method: &str,
        path: &str,
        source_endpoint: Option<EndpointId>,
    ) -> Self {
        Self {
            principal: "anonymous".to_string(),
            action: ACTION_INVOKE.to_string(),
            resource: format!("/{stage}/{method}{path}"),
            source_endpoint,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessPolicy {
    pub statements: Vec<Statement>,
}

impl AccessPolicy {
    pub fn new(statements: Vec<Statement>) -> Self {
        Self { statements }
    }

    /// The canonical policy for a private API: allow any caller on any
    /// route, deny everything that did not enter through `endpoint`.
    pub fn private_api(endpoint: &EndpointId) -> Self {
        let actions = vec![ACTION_INVOKE.to_string()];
        let resources = vec![ResourcePattern::from("/*/*/*")];
        Self::new(vec![
            Statement::allow(actions.clone(), resources.clone()),
            Statement::deny(actions, resources).with_condition(
                Condition::SourceEndpointNotEquals(vec![endpoint.clone()]),
            ),
        ])
    }

    /// Deny-overriding evaluation over the statement list.
    pub fn evaluate(&self, ctx: &RequestContext) -> Decision {
        let mut allowed = false;
        for statement in &self.statements {
            if !statement.matches(ctx) {
                continue;
            }
            match statement.effect {
                Effect::Deny => return Decision::Deny,
                Effect::Allow => allowed = true,
            }
        }
        if allowed {
            Decision::Allow
        } else {
            Decision::Deny
        }
    }
}
