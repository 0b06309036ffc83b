use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, NormSkip};
use crate::event::{Event, Millis};
use crate::matcher::{Bindings, Condition, Field, Reference};

/// Binding name that every instance carries: the trigger event's actor.
pub const ACTOR_BINDING: &str = "actor";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    Obligation,
    Prohibition,
    Permission,
}

impl Modality {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "obligation" => Some(Modality::Obligation),
            "prohibition" => Some(Modality::Prohibition),
            "permission" => Some(Modality::Permission),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Modality::Obligation => "obligation",
            Modality::Prohibition => "prohibition",
            Modality::Permission => "permission",
        }
    }
}

/// When a pending instance's window closes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Deadline {
    /// Fixed duration after the trigger time.
    AfterMs(Millis),
    /// First later event matching this condition under the instance bindings.
    Until(Condition),
}

/// A variable captured from the trigger event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BindSpec {
    pub name: String,
    pub field: Field,
}

/// Norm as decoded from the normalized norm stream, before validation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NormSpec {
    #[serde(default, alias = "norm_id")]
    pub id: String,
    #[serde(default, alias = "norm_type")]
    pub modality: Option<String>,
    #[serde(default)]
    pub trigger: Option<Condition>,
    #[serde(default)]
    pub target: Option<Condition>,
    #[serde(default)]
    pub deadline: Option<Deadline>,
    #[serde(default)]
    pub exceptions: Vec<Condition>,
    #[serde(default)]
    pub scope_end: Option<Condition>,
    #[serde(default)]
    pub bind: Vec<BindSpec>,
    #[serde(default)]
    pub role: Option<String>,
}

impl NormSpec {
    pub fn new(id: impl Into<String>, modality: Modality, trigger: Condition) -> Self {
        Self {
            id: id.into(),
            modality: Some(modality.as_str().to_string()),
            trigger: Some(trigger),
            ..Self::default()
        }
    }

    pub fn with_target(mut self, target: Condition) -> Self {
        self.target = Some(target);
        self
    }

    pub fn with_deadline(mut self, deadline: Deadline) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_exception(mut self, exception: Condition) -> Self {
        self.exceptions.push(exception);
        self
    }

    pub fn with_scope_end(mut self, scope_end: Condition) -> Self {
        self.scope_end = Some(scope_end);
        self
    }

    pub fn bind(mut self, name: impl Into<String>, field: Field) -> Self {
        self.bind.push(BindSpec {
            name: name.into(),
            field,
        });
        self
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }
}

/// Validated norm. Immutable once loaded.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Norm {
    pub id: String,
    pub modality: Modality,
    pub trigger: Condition,
    /// Always present for obligations and prohibitions.
    pub target: Option<Condition>,
    pub deadline: Option<Deadline>,
    pub exceptions: Vec<Condition>,
    pub scope_end: Option<Condition>,
    pub bind: Vec<BindSpec>,
    pub role: Option<String>,
    /// Position in the norm stream; primary report ordering key.
    pub declaration_index: usize,
}

impl Norm {
    /// Structural validation. Failure here is fatal for the whole run.
    pub fn from_spec(spec: NormSpec, declaration_index: usize) -> Result<Self, EngineError> {
        let id = spec.id.trim().to_string();
        if id.is_empty() {
            return Err(EngineError::malformed(
                format!("#{declaration_index}"),
                "norm id is empty",
            ));
        }

        let modality = match spec.modality.as_deref() {
            None => return Err(EngineError::malformed(id, "modality is missing")),
            Some(raw) => Modality::parse(raw)
                .ok_or_else(|| EngineError::malformed(id.clone(), format!("invalid modality `{raw}`")))?,
        };

        let trigger = spec
            .trigger
            .ok_or_else(|| EngineError::malformed(id.clone(), "trigger is missing"))?;

        match modality {
            Modality::Obligation | Modality::Prohibition if spec.target.is_none() => {
                return Err(EngineError::malformed(
                    id,
                    format!("{} requires a target", modality.as_str()),
                ));
            }
            _ => {}
        }

        if let Some(Deadline::AfterMs(ms)) = spec.deadline {
            if ms < 0 {
                return Err(EngineError::malformed(id, "deadline duration is negative"));
            }
        }

        let mut names = BTreeSet::new();
        for b in &spec.bind {
            if b.name.is_empty() || b.name == ACTOR_BINDING {
                return Err(EngineError::malformed(
                    id,
                    format!("binding name `{}` is reserved or empty", b.name),
                ));
            }
            if !names.insert(b.name.as_str()) {
                return Err(EngineError::malformed(
                    id,
                    format!("binding `{}` declared twice", b.name),
                ));
            }
        }

        Ok(Norm {
            id,
            modality,
            trigger,
            target: spec.target,
            deadline: spec.deadline,
            exceptions: spec.exceptions,
            scope_end: spec.scope_end,
            bind: spec.bind,
            role: spec.role.filter(|r| !r.trim().is_empty()),
            declaration_index,
        })
    }

    /// Check that every binding a clause reads is established by the trigger.
    ///
    /// The trigger itself runs with no bindings, so any reference there is unresolved.
    pub fn check_references(&self) -> Result<(), NormSkip> {
        if let Some(r) = self.trigger.references().first() {
            return Err(unresolved("trigger", r));
        }

        let mut clauses: Vec<(&str, &Condition)> = Vec::new();
        if let Some(target) = &self.target {
            clauses.push(("target", target));
        }
        if let Some(Deadline::Until(cond)) = &self.deadline {
            clauses.push(("deadline", cond));
        }
        for exception in &self.exceptions {
            clauses.push(("exception", exception));
        }
        if let Some(scope_end) = &self.scope_end {
            clauses.push(("scope_end", scope_end));
        }

        for (clause, cond) in clauses {
            for r in cond.references() {
                if let Reference::Binding(name) = r {
                    if !self.declares(name) {
                        return Err(unresolved(clause, &r));
                    }
                }
            }
        }
        Ok(())
    }

    fn declares(&self, name: &str) -> bool {
        name == ACTOR_BINDING || self.bind.iter().any(|b| b.name == name)
    }

    /// Bindings for an instance triggered by `event`; `None` when a declared field is absent.
    pub fn capture(&self, event: &Event) -> Option<Bindings> {
        let mut bindings =
            Bindings::anchored(event.timestamp).with(ACTOR_BINDING, event.actor.as_str());
        for b in &self.bind {
            let value = b.field.read(event)?.to_value();
            bindings.insert(b.name.clone(), value);
        }
        Some(bindings)
    }

    /// True when every declared binding field on `event` equals its bound value.
    ///
    /// An event lacking a declared field belongs to no case and never agrees.
    pub fn agrees(&self, event: &Event, bindings: &Bindings) -> bool {
        self.bind.iter().all(|b| match (b.field.read(event), bindings.get(&b.name)) {
            (Some(s), Some(bound)) => s.eq_value(bound),
            _ => false,
        })
    }

    /// Key identifying the case an instance or scope closure belongs to.
    ///
    /// Built from the declared bindings only, so a case closed by one actor is
    /// closed for all of them. Only meaningful for norms that declare bindings;
    /// unbound norms never record closed scopes.
    pub fn scope_key(&self, bindings: &Bindings) -> String {
        let mut key = String::new();
        for b in &self.bind {
            if !key.is_empty() {
                key.push('\u{1f}');
            }
            match bindings.get(&b.name) {
                Some(v) => key.push_str(&format!("{}={:?}", b.name, v)),
                None => key.push_str(&b.name),
            }
        }
        key
    }

    pub fn fixed_deadline(&self, trigger_ts: Millis) -> Option<Millis> {
        match self.deadline {
            Some(Deadline::AfterMs(ms)) => Some(trigger_ts.saturating_add(ms)),
            _ => None,
        }
    }
}

fn unresolved(clause: &str, r: &Reference<'_>) -> NormSkip {
    let binding = match r {
        Reference::Binding(name) => name.to_string(),
        Reference::TriggerTime => "trigger_time".to_string(),
    };
    NormSkip::UnresolvedReference {
        clause: clause.to_string(),
        binding,
    }
}

/// Loaded norms in declaration order.
#[derive(Clone, Debug, Default)]
pub struct NormSet {
    norms: Vec<Norm>,
}

impl NormSet {
    /// Validate every spec. The first malformed norm aborts the load.
    pub fn load(specs: Vec<NormSpec>) -> Result<Self, EngineError> {
        let mut norms: Vec<Norm> = Vec::with_capacity(specs.len());
        let mut seen = BTreeSet::new();
        for (idx, spec) in specs.into_iter().enumerate() {
            let norm = Norm::from_spec(spec, idx)?;
            if !seen.insert(norm.id.clone()) {
                return Err(EngineError::DuplicateNorm(norm.id));
            }
            norms.push(norm);
        }
        Ok(Self { norms })
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Norm> {
        self.norms.iter()
    }

    pub fn norms(&self) -> &[Norm] {
        &self.norms
    }

    pub fn len(&self) -> usize {
        self.norms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.norms.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Norm> {
        self.norms.iter().find(|n| n.id == id)
    }

    /// Declared roles, first-declared first, without repeats.
    pub fn roles(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for n in &self.norms {
            if let Some(role) = n.role.as_deref() {
                if !out.contains(&role) {
                    out.push(role);
                }
            }
        }
        out
    }
}
