//! Record adapter: map loosely-named log records onto `norm_compliance_core::RawEvent`.
//!
//! Policy-light on purpose:
//! - No IO
//! - No validation (the core loader drops unusable records and logs why)
//!
//! Products provide a `RecordNormalizer` (or use `BasicRecordNormalizer`) to
//! map whatever their log parser emits into the normalized event shape.

use std::collections::BTreeMap;

use norm_compliance_core::{RawEvent, RawTimestamp};
use serde_json::{Map, Value};

/// Trait: map one input record into the normalized event shape.
///
/// Exactly one `RawEvent` per record, so drop indices in the report line up
/// with positions in the input document.
pub trait RecordNormalizer {
    fn normalize(&self, record: &Value) -> RawEvent;
}

/// Field names accepted for each normalized slot, first match wins.
#[derive(Clone, Debug)]
pub struct FieldAliases {
    pub id: &'static [&'static str],
    pub actor: &'static [&'static str],
    pub action: &'static [&'static str],
    pub timestamp: &'static [&'static str],
    pub sequence: &'static [&'static str],
    /// Nested objects whose entries are merged into the attribute bag.
    pub nested: &'static [&'static str],
}

impl Default for FieldAliases {
    fn default() -> Self {
        Self {
            id: &["id", "entry_id", "event_id"],
            actor: &["actor", "agent_id", "agent"],
            action: &["action", "event", "activity"],
            timestamp: &["timestamp", "time", "datetime"],
            sequence: &["sequence", "seq"],
            nested: &["attributes", "metadata"],
        }
    }
}

impl FieldAliases {
    fn is_reserved(&self, key: &str) -> bool {
        [
            self.id,
            self.actor,
            self.action,
            self.timestamp,
            self.sequence,
            self.nested,
        ]
        .iter()
        .any(|names| names.iter().any(|n| *n == key))
    }
}

/// Normalizer driven by `FieldAliases`.
///
/// Every key that is not one of the aliases goes into the attribute bag as-is.
/// Non-scalar leftovers are passed through and discarded (with a warning) by
/// the core loader.
#[derive(Clone, Debug, Default)]
pub struct BasicRecordNormalizer {
    pub aliases: FieldAliases,
}

fn first<'r>(record: &'r Map<String, Value>, names: &[&str]) -> Option<&'r Value> {
    names
        .iter()
        .find_map(|n| record.get(*n).filter(|v| !v.is_null()))
}

/// Strings as-is, numbers and booleans in their JSON spelling.
fn text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn timestamp(v: &Value) -> Option<RawTimestamp> {
    match v {
        Value::Number(n) => Some(
            n.as_i64()
                .map_or_else(|| RawTimestamp::Text(n.to_string()), RawTimestamp::Millis),
        ),
        Value::String(s) => Some(RawTimestamp::Text(s.clone())),
        _ => None,
    }
}

fn sequence(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

impl RecordNormalizer for BasicRecordNormalizer {
    fn normalize(&self, record: &Value) -> RawEvent {
        let Some(obj) = record.as_object() else {
            return RawEvent::default();
        };
        let a = &self.aliases;

        let mut attributes: BTreeMap<String, Value> = obj
            .iter()
            .filter(|(k, _)| !a.is_reserved(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        // Nested bags fill in; top-level keys win on conflict.
        for name in a.nested {
            if let Some(Value::Object(inner)) = obj.get(*name) {
                for (k, v) in inner {
                    attributes.entry(k.clone()).or_insert_with(|| v.clone());
                }
            }
        }

        RawEvent {
            id: first(obj, a.id).and_then(text),
            timestamp: first(obj, a.timestamp).and_then(timestamp),
            sequence: first(obj, a.sequence).and_then(sequence),
            actor: first(obj, a.actor).and_then(text),
            action: first(obj, a.action).and_then(text),
            attributes,
        }
    }
}

/// Helper: normalize a batch of records in input order.
pub fn normalize_batch<N: RecordNormalizer>(normalizer: &N, records: &[Value]) -> Vec<RawEvent> {
    records.iter().map(|r| normalizer.normalize(r)).collect()
}
