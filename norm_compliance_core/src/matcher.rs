//! Condition trees over event attributes and the pure `matches` evaluator.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::event::{Event, Millis, Value};

/// Which part of an event a test reads. Any name other than `actor`/`action`
/// is an attribute key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Field {
    Actor,
    Action,
    Attribute(String),
}

impl Field {
    pub fn attr(key: impl Into<String>) -> Self {
        Field::Attribute(key.into())
    }

    /// Borrowed view of this field on `event`, `None` when the attribute is absent.
    pub fn read<'e>(&self, event: &'e Event) -> Option<Scalar<'e>> {
        match self {
            Field::Actor => Some(Scalar::Text(&event.actor)),
            Field::Action => Some(Scalar::Text(&event.action)),
            Field::Attribute(key) => event.attr(key).map(Scalar::Value),
        }
    }
}

impl From<String> for Field {
    fn from(s: String) -> Self {
        match s.as_str() {
            "actor" => Field::Actor,
            "action" => Field::Action,
            _ => Field::Attribute(s),
        }
    }
}

impl From<Field> for String {
    fn from(f: Field) -> Self {
        match f {
            Field::Actor => "actor".to_string(),
            Field::Action => "action".to_string(),
            Field::Attribute(key) => key,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Actor => f.write_str("actor"),
            Field::Action => f.write_str("action"),
            Field::Attribute(key) => f.write_str(key),
        }
    }
}

/// A field value read off an event without cloning it.
#[derive(Clone, Copy, Debug)]
pub enum Scalar<'a> {
    Text(&'a str),
    Value(&'a Value),
}

impl Scalar<'_> {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::Text(s) => Some(s),
            Scalar::Value(v) => v.as_str(),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Text(_) => None,
            Scalar::Value(v) => v.as_f64(),
        }
    }

    pub fn eq_value(&self, other: &Value) -> bool {
        match self {
            Scalar::Text(s) => other.as_str() == Some(*s),
            Scalar::Value(v) => v.loosely_eq(other),
        }
    }

    pub fn to_value(self) -> Value {
        match self {
            Scalar::Text(s) => Value::Str(s.to_string()),
            Scalar::Value(v) => v.clone(),
        }
    }
}

/// Regex compiled once, when the norm carrying it is decoded.
#[derive(Clone, Debug)]
pub struct Pattern(Regex);

impl Pattern {
    pub fn new(src: &str) -> Result<Self, regex::Error> {
        Regex::new(src).map(Pattern)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.0.is_match(text)
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Serialize for Pattern {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Pattern {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let src = String::deserialize(d)?;
        Pattern::new(&src).map_err(serde::de::Error::custom)
    }
}

/// Boolean expression over `{actor, action, attributes}` plus values bound at trigger time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Condition {
    Always,
    All {
        of: Vec<Condition>,
    },
    Any {
        of: Vec<Condition>,
    },
    Not {
        cond: Box<Condition>,
    },
    Eq {
        field: Field,
        value: Value,
    },
    In {
        field: Field,
        values: Vec<Value>,
    },
    /// Inclusive numeric bounds; a missing bound is open.
    Range {
        field: Field,
        #[serde(default)]
        min: Option<f64>,
        #[serde(default)]
        max: Option<f64>,
    },
    Matches {
        field: Field,
        pattern: Pattern,
    },
    /// Loose action-name match, see [`like`].
    Like {
        field: Field,
        text: String,
    },
    Exists {
        field: Field,
    },
    /// Field equals the value bound under `binding` when the instance was triggered.
    SameAs {
        field: Field,
        binding: String,
    },
    /// Event is at most `ms` after the trigger time.
    Within {
        ms: Millis,
    },
}

/// A binding a condition depends on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reference<'a> {
    Binding(&'a str),
    TriggerTime,
}

impl Condition {
    pub fn action(name: impl Into<String>) -> Self {
        Condition::Eq {
            field: Field::Action,
            value: Value::Str(name.into()),
        }
    }

    pub fn actor(name: impl Into<String>) -> Self {
        Condition::Eq {
            field: Field::Actor,
            value: Value::Str(name.into()),
        }
    }

    pub fn equals(field: Field, value: impl Into<Value>) -> Self {
        Condition::Eq {
            field,
            value: value.into(),
        }
    }

    pub fn all(of: Vec<Condition>) -> Self {
        Condition::All { of }
    }

    pub fn any(of: Vec<Condition>) -> Self {
        Condition::Any { of }
    }

    pub fn negate(cond: Condition) -> Self {
        Condition::Not {
            cond: Box::new(cond),
        }
    }

    pub fn same_as(field: Field, binding: impl Into<String>) -> Self {
        Condition::SameAs {
            field,
            binding: binding.into(),
        }
    }

    pub fn within(ms: Millis) -> Self {
        Condition::Within { ms }
    }

    /// Every binding this tree reads, in tree order.
    pub fn references(&self) -> Vec<Reference<'_>> {
        let mut out = Vec::new();
        self.collect_references(&mut out);
        out
    }

    fn collect_references<'a>(&'a self, out: &mut Vec<Reference<'a>>) {
        match self {
            Condition::All { of } | Condition::Any { of } => {
                for c in of {
                    c.collect_references(out);
                }
            }
            Condition::Not { cond } => cond.collect_references(out),
            Condition::SameAs { binding, .. } => out.push(Reference::Binding(binding)),
            Condition::Within { .. } => out.push(Reference::TriggerTime),
            Condition::Always
            | Condition::Eq { .. }
            | Condition::In { .. }
            | Condition::Range { .. }
            | Condition::Matches { .. }
            | Condition::Like { .. }
            | Condition::Exists { .. } => {}
        }
    }
}

/// Values captured from a triggering event, plus the trigger time that `within` measures from.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Bindings {
    values: BTreeMap<String, Value>,
    anchor: Option<Millis>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn anchored(at: Millis) -> Self {
        Self {
            values: BTreeMap::new(),
            anchor: Some(at),
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn anchor(&self) -> Option<Millis> {
        self.anchor
    }

    pub fn values(&self) -> &BTreeMap<String, Value> {
        &self.values
    }

    /// Same bound values, ignoring the anchor time.
    pub fn same_values(&self, other: &Bindings) -> bool {
        self.values == other.values
    }
}

/// Decide whether `event` satisfies `cond` under `bindings`.
///
/// Pure: the result depends only on the three arguments. A test on an absent
/// attribute, or on a binding that was never established, is a non-match.
pub fn matches(cond: &Condition, event: &Event, bindings: &Bindings) -> bool {
    match cond {
        Condition::Always => true,
        Condition::All { of } => of.iter().all(|c| matches(c, event, bindings)),
        Condition::Any { of } => of.iter().any(|c| matches(c, event, bindings)),
        Condition::Not { cond } => !matches(cond, event, bindings),
        Condition::Eq { field, value } => field.read(event).is_some_and(|s| s.eq_value(value)),
        Condition::In { field, values } => field
            .read(event)
            .is_some_and(|s| values.iter().any(|v| s.eq_value(v))),
        Condition::Range { field, min, max } => match field.read(event).and_then(|s| s.as_f64()) {
            Some(x) => min.map_or(true, |lo| x >= lo) && max.map_or(true, |hi| x <= hi),
            None => false,
        },
        Condition::Matches { field, pattern } => field
            .read(event)
            .and_then(|s| s.as_str().map(|t| pattern.is_match(t)))
            .unwrap_or(false),
        Condition::Like { field, text } => field
            .read(event)
            .and_then(|s| s.as_str().map(|t| like(t, text)))
            .unwrap_or(false),
        Condition::Exists { field } => field.read(event).is_some(),
        Condition::SameAs { field, binding } => match (field.read(event), bindings.get(binding)) {
            (Some(s), Some(bound)) => s.eq_value(bound),
            _ => false,
        },
        Condition::Within { ms } => bindings
            .anchor()
            .and_then(|t0| event.timestamp.checked_sub(t0))
            .is_some_and(|delta| delta >= 0 && delta <= *ms),
    }
}

fn normalize_words(s: &str) -> String {
    s.trim().to_lowercase().replace(['_', '-'], " ")
}

/// Loose match of an action name against an expected one.
///
/// Both sides are lowercased with `_`/`-` read as spaces. Matches on equality,
/// containment in either direction, or when at least half of the expected
/// words appear in the actual name.
pub fn like(actual: &str, expected: &str) -> bool {
    let actual = normalize_words(actual);
    let expected = normalize_words(expected);
    let want: BTreeSet<&str> = expected.split_whitespace().collect();
    if want.is_empty() {
        return false;
    }
    if actual == expected || actual.contains(expected.as_str()) {
        return true;
    }
    if !actual.trim().is_empty() && expected.contains(actual.as_str()) {
        return true;
    }
    let have: BTreeSet<&str> = actual.split_whitespace().collect();
    let overlap = want.intersection(&have).count();
    overlap * 2 >= want.len()
}
