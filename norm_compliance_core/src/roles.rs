use std::collections::BTreeMap;

use serde::Serialize;

use crate::event::{Event, EventLog};
use crate::norm::NormSet;

// ---------------------------------------------------------------------
// Role applicability: which actors a role-scoped norm applies to.
// ---------------------------------------------------------------------

/// Event attribute that states an actor's role outright.
pub const ROLE_ATTRIBUTE: &str = "role";

/// How an actor id was matched to a role. Earlier variants are preferred.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleConfidence {
    Exact,
    Substring,
    SubstringReverse,
    Partial,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RoleMatch {
    pub role: String,
    pub confidence: RoleConfidence,
}

/// Lowercase and strip punctuation, keeping word characters and spaces.
fn normalize(s: &str) -> String {
    s.to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || c.is_whitespace())
        .collect::<String>()
        .trim()
        .to_string()
}

pub fn same_role(a: &str, b: &str) -> bool {
    normalize(a) == normalize(b)
}

/// Match one actor id against one role name.
pub fn role_match(actor: &str, role: &str) -> Option<RoleConfidence> {
    let actor = normalize(actor);
    let role = normalize(role);
    if role.is_empty() || actor.is_empty() {
        return None;
    }
    if actor == role {
        return Some(RoleConfidence::Exact);
    }
    if actor.contains(&role) {
        return Some(RoleConfidence::Substring);
    }
    if role.contains(&actor) {
        return Some(RoleConfidence::SubstringReverse);
    }
    if role.split_whitespace().any(|part| actor.contains(part)) {
        return Some(RoleConfidence::Partial);
    }
    None
}

/// Best role for `actor` among `roles`. Ties go to the first declared role.
pub fn infer_role(actor: &str, roles: &[&str]) -> Option<RoleMatch> {
    let mut best: Option<RoleMatch> = None;
    for role in roles {
        let Some(confidence) = role_match(actor, role) else {
            continue;
        };
        let better = match &best {
            None => true,
            Some(b) => confidence < b.confidence,
        };
        if better {
            best = Some(RoleMatch {
                role: role.to_string(),
                confidence,
            });
        }
    }
    best
}

/// Actor -> role lookup, built once per run over the actors seen in the log.
#[derive(Clone, Debug, Default)]
pub struct RoleDirectory {
    inferred: BTreeMap<String, Option<RoleMatch>>,
}

impl RoleDirectory {
    pub fn build(norms: &NormSet, log: &EventLog) -> Self {
        let roles = norms.roles();
        let mut inferred = BTreeMap::new();
        if roles.is_empty() {
            return Self { inferred };
        }
        for ev in log.events() {
            if !inferred.contains_key(&ev.actor) {
                inferred.insert(ev.actor.clone(), infer_role(&ev.actor, &roles));
            }
        }
        Self { inferred }
    }

    /// Role of the actor behind `event`: the event's `role` attribute if it has
    /// one, else the role inferred from the actor id.
    pub fn role_of<'a>(&'a self, event: &'a Event) -> Option<&'a str> {
        if let Some(role) = event.attr(ROLE_ATTRIBUTE).and_then(|v| v.as_str()) {
            return Some(role);
        }
        self.inferred
            .get(&event.actor)
            .and_then(|m| m.as_ref())
            .map(|m| m.role.as_str())
    }

    pub fn inferred(&self, actor: &str) -> Option<&RoleMatch> {
        self.inferred.get(actor).and_then(|m| m.as_ref())
    }
}
