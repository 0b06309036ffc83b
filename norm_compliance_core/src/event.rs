use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::cfg::TemporalMode;
use crate::error::{DropReason, DroppedEvent};

/// Event time in milliseconds. In sequence mode this is an event position instead.
pub type Millis = i64;

/// Scalar attribute value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Equality where `Int` and `Float` compare numerically.
    pub fn loosely_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }

    /// Convert a JSON scalar. Null, arrays and objects have no `Value` form.
    pub fn from_json(v: &serde_json::Value) -> Option<Value> {
        match v {
            serde_json::Value::Bool(b) => Some(Value::Bool(*b)),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(Value::Int)
                .or_else(|| n.as_f64().map(Value::Float)),
            serde_json::Value::String(s) => Some(Value::Str(s.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// One observed action. Immutable once it is in an `EventLog`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    /// Ingestion sequence number; breaks timestamp ties.
    pub seq: u64,
    pub timestamp: Millis,
    pub actor: String,
    pub action: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,
}

impl Event {
    pub fn new(
        id: impl Into<String>,
        seq: u64,
        timestamp: Millis,
        actor: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            seq,
            timestamp,
            actor: actor.into(),
            action: action.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn attr(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    #[inline]
    pub fn order_key(&self) -> (Millis, u64) {
        (self.timestamp, self.seq)
    }
}

/// Closed, time-ordered event log.
///
/// Built once (see `EventLog::load`), read-only afterwards. Events are sorted by
/// `(timestamp, seq)`; that order drives every tracker and the evidence index.
#[derive(Clone, Debug, Default)]
pub struct EventLog {
    pub(crate) events: Vec<Event>,
    pub(crate) temporal_mode: TemporalMode,
    pub(crate) dropped: Vec<DroppedEvent>,
}

impl EventLog {
    /// Wrap already-normalized events and sort them.
    ///
    /// Ids must be unique: an event whose id was already seen earlier in
    /// `events` is dropped with `DropReason::DuplicateId`, indexed by its
    /// position in the input.
    pub fn from_events(events: Vec<Event>) -> Self {
        let mut seen = BTreeSet::new();
        let mut kept = Vec::with_capacity(events.len());
        let mut dropped = Vec::new();
        for (index, event) in events.into_iter().enumerate() {
            if seen.contains(&event.id) {
                warn!("dropping event {index} ({}): duplicate id", event.id);
                dropped.push(DroppedEvent {
                    index,
                    id: Some(event.id),
                    reason: DropReason::DuplicateId,
                });
                continue;
            }
            seen.insert(event.id.clone());
            kept.push(event);
        }
        kept.sort_by_key(Event::order_key);
        Self {
            events: kept,
            temporal_mode: TemporalMode::Timestamp,
            dropped,
        }
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn last(&self) -> Option<&Event> {
        self.events.last()
    }

    /// Resolved temporal mode (`Timestamp` or `Sequence`).
    pub fn temporal_mode(&self) -> TemporalMode {
        self.temporal_mode
    }

    pub fn dropped(&self) -> &[DroppedEvent] {
        &self.dropped
    }
}
